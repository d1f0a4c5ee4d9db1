use crate::discovery::SourceSet;
use crate::error::Result;
use crate::io::{RasterIo, RasterMetadata};
use crate::pool::TaskPool;
use log::{info, warn};

/// Below this min/max side ratio the set is considered badly mismatched in size.
pub const SIZE_RATIO_WARNING_THRESHOLD: f64 = 0.5;

/// Extents of a set of rasters that differ enough to warrant a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeDisparity {
    pub min_width: usize,
    pub max_width: usize,
    pub min_height: usize,
    pub max_height: usize,
}

/// Probe every image of `sources`, returning metadata in source order.
pub fn probe_sources<R: RasterIo>(
    io: &R,
    pool: &TaskPool,
    sources: &SourceSet,
) -> Result<Vec<RasterMetadata>> {
    info!("Loading metadata of {} images", sources.len());
    pool.map_ordered(&sources.images, |path| io.probe(path))
}

/// Report whether the smallest raster side is less than half the largest.
///
/// Everything gets padded to the largest extent, so a mostly-empty canvas is
/// worth a warning but never an error.
pub fn check_size_disparity(metadata: &[RasterMetadata]) -> Option<SizeDisparity> {
    let min_width = metadata.iter().map(|m| m.width).min()?;
    let max_width = metadata.iter().map(|m| m.width).max()?;
    let min_height = metadata.iter().map(|m| m.height).min()?;
    let max_height = metadata.iter().map(|m| m.height).max()?;

    let width_ratio = min_width as f64 / max_width as f64;
    let height_ratio = min_height as f64 / max_height as f64;

    if width_ratio < SIZE_RATIO_WARNING_THRESHOLD || height_ratio < SIZE_RATIO_WARNING_THRESHOLD {
        warn!(
            "Some images are significantly smaller than others (widths {}..{}, heights {}..{}). \
             All images will be padded to the maximum mutual extent.",
            min_width, max_width, min_height, max_height
        );
        return Some(SizeDisparity {
            min_width,
            max_width,
            min_height,
            max_height,
        });
    }
    None
}
