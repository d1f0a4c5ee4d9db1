use crate::discovery::SourceSet;
use crate::error::{Result, StackError};
use crate::grid::pad_or_crop;
use crate::io::{RasterIo, RasterMetadata};
use crate::pool::TaskPool;
use crate::probe::{check_size_disparity, probe_sources, SizeDisparity};
use crate::stats::band_statistics;
use crate::store::{ensure_absent, StoreMetadata, StoreShape, StoreWriter};
use log::{debug, info};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// 1-based band indices to keep; `None` (or empty) keeps every band.
    pub bands: Option<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub struct PackSummary {
    pub shape: StoreShape,
    pub bands: Vec<usize>,
    pub size_disparity: Option<SizeDisparity>,
    pub img_means: Vec<f64>,
    pub img_stds: Vec<f64>,
}

/// Pad every image/label pair to a common canvas and stack them into a store at `dst`.
pub fn pack_images<R: RasterIo>(
    io: &R,
    pool: &TaskPool,
    sources: &SourceSet,
    dst: &Path,
    options: &PackOptions,
) -> Result<PackSummary> {
    ensure_absent(dst)?;
    if sources.is_empty() {
        return Err(StackError::EmptySourceSet);
    }

    let metadata = probe_sources(io, pool, sources)?;
    let size_disparity = check_size_disparity(&metadata);
    let bands = select_bands(&metadata, options.bands.as_deref())?;
    let (height, width) = canvas_size(&metadata);
    let identifiers = identifiers_from_paths(&sources.images);

    let shape = StoreShape {
        rows: sources.len(),
        bands: bands.len(),
        height,
        width,
    };
    info!(
        "Packing {} images with bands {:?} onto a {}x{} canvas",
        shape.rows, bands, width, height
    );

    let mut writer = StoreWriter::create(dst, shape)?;
    let (img_means, img_stds) = {
        let (mut img, mut lbl) = writer.arrays_mut()?;

        let jobs: Vec<_> = img
            .outer_iter_mut()
            .zip(lbl.outer_iter_mut())
            .zip(sources.images.iter().zip(&sources.labels))
            .collect();

        pool.try_for_each_unordered(jobs, |((mut img_row, mut lbl_row), (image, label))| {
            let data = io.read(image, Some(bands.as_slice()))?;
            img_row.assign(&pad_or_crop(data.view(), height, width));

            let data = io.read(label, Some(&[1][..]))?;
            lbl_row.assign(&pad_or_crop(data.view(), height, width));

            debug!("Packed {} with label {}", image.display(), label.display());
            Ok(())
        })?;

        // All rows are written at this point; statistics need the full stack
        info!("Computing band statistics");
        band_statistics(pool, img.view())?
    };

    let store_metadata = StoreMetadata {
        paths: identifiers,
        epsg: metadata.iter().map(|m| m.epsg).collect(),
        affine: metadata.iter().map(|m| m.geotransform).collect(),
        img_means: img_means.clone(),
        img_stds: img_stds.clone(),
    };
    writer.finish(&store_metadata)?;

    Ok(PackSummary {
        shape,
        bands,
        size_disparity,
        img_means,
        img_stds,
    })
}

/// Largest height and width across the set.
pub fn canvas_size(metadata: &[RasterMetadata]) -> (usize, usize) {
    let height = metadata.iter().map(|m| m.height).max().unwrap_or(0);
    let width = metadata.iter().map(|m| m.width).max().unwrap_or(0);
    (height, width)
}

/// Validate an explicit band request or fall back to `1..=max band count`.
pub fn select_bands(metadata: &[RasterMetadata], requested: Option<&[usize]>) -> Result<Vec<usize>> {
    let counts: BTreeSet<usize> = metadata.iter().map(|m| m.band_count).collect();
    let max_bands = counts.iter().next_back().copied().unwrap_or(0);

    match requested {
        Some(bands) if !bands.is_empty() => {
            if counts.len() > 1 {
                return Err(StackError::BandCountMismatch(counts.into_iter().collect()));
            }
            if bands.iter().any(|&b| b == 0 || b > max_bands) {
                return Err(StackError::InvalidBands {
                    requested: bands.to_vec(),
                    available: max_bands,
                });
            }
            Ok(bands.to_vec())
        }
        _ => {
            // Every item must provide every band of the default selection
            if counts.len() > 1 {
                return Err(StackError::BandCountMismatch(counts.into_iter().collect()));
            }
            Ok((1..=max_bands).collect())
        }
    }
}

/// File stems of `paths`, with `_1`, `_2`, ... appended to repeated stems.
pub fn identifiers_from_paths(paths: &[PathBuf]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();

    paths
        .iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut candidate = stem.clone();
            let mut suffix = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", stem, suffix);
                suffix += 1;
            }
            candidate
        })
        .collect()
}
