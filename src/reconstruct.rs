use crate::error::{Result, StackError};
use crate::io::{RasterIo, RasterProfile};
use crate::pool::TaskPool;
use crate::store::{ensure_absent, Store};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Which store rows to turn back into rasters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Index(usize),
    Indices(Vec<usize>),
}

impl Selection {
    /// `None` or an empty list selects everything.
    pub fn from_indices(indices: Option<Vec<usize>>) -> Self {
        match indices {
            None => Selection::All,
            Some(indices) if indices.is_empty() => Selection::All,
            Some(indices) if indices.len() == 1 => Selection::Index(indices[0]),
            Some(indices) => Selection::Indices(indices),
        }
    }

    pub fn resolve(&self, len: usize) -> Result<Vec<usize>> {
        let indices = match self {
            Selection::All => (0..len).collect(),
            Selection::Index(index) => vec![*index],
            Selection::Indices(indices) => {
                // Repeated indices would race on the same output files
                let mut indices = indices.clone();
                indices.sort_unstable();
                indices.dedup();
                indices
            }
        };
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(StackError::IndexOutOfRange { index, len });
        }
        Ok(indices)
    }
}

/// Write the selected rows of the store at `src` as GeoTIFFs into `dst_folder`.
///
/// Returns the image paths written, sorted.
pub fn reconstruct<R: RasterIo>(
    io: &R,
    pool: &TaskPool,
    src: &Path,
    dst_folder: &Path,
    selection: &Selection,
) -> Result<Vec<PathBuf>> {
    let store = Store::open(src)?;
    let indices = selection.resolve(store.len())?;
    fs::create_dir_all(dst_folder)?;

    info!(
        "Reconstructing {} of {} rows from {} into {}",
        indices.len(),
        store.len(),
        src.display(),
        dst_folder.display()
    );

    let mut written = pool.map_ordered(&indices, |&index| {
        reconstruct_row(io, &store, index, dst_folder)
    })?;
    written.sort();
    Ok(written)
}

/// Write row `index` as `{identifier}.tif` plus `{identifier}_label.tif`.
///
/// Both files are written under a `.partial` name and only renamed once both
/// succeeded, so a failed row leaves nothing behind.
pub fn reconstruct_row<R: RasterIo>(
    io: &R,
    store: &Store,
    index: usize,
    dst_folder: &Path,
) -> Result<PathBuf> {
    let row = store.row(index)?;
    let image_path = dst_folder.join(format!("{}.tif", row.identifier));
    let label_path = dst_folder.join(format!("{}_label.tif", row.identifier));
    ensure_absent(&image_path)?;
    ensure_absent(&label_path)?;

    let (bands, height, width) = row.image.dim();
    let profile = RasterProfile::geotiff(bands, height, width, row.epsg, row.geotransform);
    let label_profile = RasterProfile {
        band_count: 1,
        ..profile.clone()
    };

    let image_partial = partial_path(&image_path);
    let label_partial = partial_path(&label_path);

    let result = io
        .write(&image_partial, row.image, &profile)
        .and_then(|_| io.write(&label_partial, row.label, &label_profile))
        .and_then(|_| {
            fs::rename(&image_partial, &image_path)?;
            fs::rename(&label_partial, &label_path)?;
            Ok(())
        });

    if let Err(e) = result {
        for path in [&image_partial, &label_partial, &image_path] {
            let _ = fs::remove_file(path);
        }
        return Err(e);
    }

    debug!("Reconstructed row {} as {}", index, image_path.display());
    Ok(image_path)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}
