//! On-disk array store shared by packing, tiling and reconstruction.
//!
//! A store is a directory with one file per schema entry:
//!
//! | entry        | file            | dtype | shape        |
//! |--------------|-----------------|-------|--------------|
//! | `/img`       | `img.npy`       | u16   | `[N,C,H,W]`  |
//! | `/lbl`       | `lbl.npy`       | u16   | `[N,1,H,W]`  |
//! | `/path`      | `path.json`     | str   | `[N]`        |
//! | `/epsg`      | `epsg.npy`      | i32   | `[N]`        |
//! | `/affine`    | `affine.npy`    | f64   | `[N,6]`      |
//! | `/img_means` | `img_means.npy` | f64   | `[C]`        |
//! | `/img_stds`  | `img_stds.npy`  | f64   | `[C]`        |
//!
//! Writers assemble the directory in a hidden staging directory next to the
//! destination and rename it into place once complete, so a destination
//! either holds a full store or does not exist.

use crate::error::{Result, StackError};
use crate::geotransform::GeoTransform;
use log::{debug, info};
use memmap2::{Mmap, MmapMut};
use ndarray::{Array1, Array2, ArrayView3, ArrayView4, ArrayViewD, ArrayViewMut4, Axis, Ix4};
use ndarray_npy::{read_npy, write_npy, write_zeroed_npy, ViewMutNpyExt, ViewNpyExt};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const IMG_FILE: &str = "img.npy";
pub const LBL_FILE: &str = "lbl.npy";
pub const PATH_FILE: &str = "path.json";
pub const EPSG_FILE: &str = "epsg.npy";
pub const AFFINE_FILE: &str = "affine.npy";
pub const MEANS_FILE: &str = "img_means.npy";
pub const STDS_FILE: &str = "img_stds.npy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreShape {
    pub rows: usize,
    pub bands: usize,
    pub height: usize,
    pub width: usize,
}

/// Per-row metadata and store-level band statistics.
#[derive(Debug, Clone, Default)]
pub struct StoreMetadata {
    pub paths: Vec<String>,
    pub epsg: Vec<i32>,
    pub affine: Vec<GeoTransform>,
    pub img_means: Vec<f64>,
    pub img_stds: Vec<f64>,
}

/// Fail if anything already exists at `dst`.
pub fn ensure_absent(dst: &Path) -> Result<()> {
    if dst.exists() {
        return Err(StackError::DestinationExists(dst.to_path_buf()));
    }
    Ok(())
}

/// Store under construction.
///
/// Image and label arrays are memory-mapped so rows can be written
/// independently (and concurrently, for disjoint rows) without holding the
/// whole store in memory.
pub struct StoreWriter {
    dst: PathBuf,
    staging: tempfile::TempDir,
    shape: StoreShape,
    img: MmapMut,
    lbl: MmapMut,
}

impl StoreWriter {
    pub fn create(dst: &Path, shape: StoreShape) -> Result<Self> {
        ensure_absent(dst)?;

        let parent = match dst.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".geotiff-stack-")
            .tempdir_in(&parent)?;
        debug!(
            "Staging store for {} in {}",
            dst.display(),
            staging.path().display()
        );

        let img = create_mapped(
            &staging.path().join(IMG_FILE),
            Ix4(shape.rows, shape.bands, shape.height, shape.width),
        )?;
        let lbl = create_mapped(
            &staging.path().join(LBL_FILE),
            Ix4(shape.rows, 1, shape.height, shape.width),
        )?;

        Ok(Self {
            dst: dst.to_path_buf(),
            staging,
            shape,
            img,
            lbl,
        })
    }

    /// Writable `/img` and `/lbl` views.
    pub fn arrays_mut(&mut self) -> Result<(ArrayViewMut4<'_, u16>, ArrayViewMut4<'_, u16>)> {
        let img = ArrayViewMut4::<u16>::view_mut_npy(&mut self.img[..])?;
        let lbl = ArrayViewMut4::<u16>::view_mut_npy(&mut self.lbl[..])?;
        Ok((img, lbl))
    }

    /// Write the metadata entries and move the store to its destination.
    pub fn finish(self, metadata: &StoreMetadata) -> Result<()> {
        let shape = self.shape;
        for (name, len) in [
            ("path", metadata.paths.len()),
            ("epsg", metadata.epsg.len()),
            ("affine", metadata.affine.len()),
        ] {
            if len != shape.rows {
                return Err(StackError::MalformedStore(format!(
                    "/{} has {} entries for {} rows",
                    name, len, shape.rows
                )));
            }
        }
        if metadata.img_means.len() != shape.bands || metadata.img_stds.len() != shape.bands {
            return Err(StackError::MalformedStore(format!(
                "band statistics have {}/{} entries for {} bands",
                metadata.img_means.len(),
                metadata.img_stds.len(),
                shape.bands
            )));
        }

        let StoreWriter {
            dst,
            staging,
            img,
            lbl,
            ..
        } = self;
        img.flush()?;
        lbl.flush()?;
        drop(img);
        drop(lbl);

        let root = staging.path();
        write_paths(&root.join(PATH_FILE), &metadata.paths)?;
        write_npy(root.join(EPSG_FILE), &Array1::from(metadata.epsg.clone()))?;

        let flat: Vec<f64> = metadata.affine.iter().flat_map(|gt| gt.to_gdal()).collect();
        let affine = Array2::from_shape_vec((metadata.affine.len(), 6), flat)?;
        write_npy(root.join(AFFINE_FILE), &affine)?;

        write_npy(root.join(MEANS_FILE), &Array1::from(metadata.img_means.clone()))?;
        write_npy(root.join(STDS_FILE), &Array1::from(metadata.img_stds.clone()))?;

        ensure_absent(&dst)?;
        let staged = staging.keep();
        if let Err(e) = fs::rename(&staged, &dst) {
            let _ = fs::remove_dir_all(&staged);
            return Err(e.into());
        }

        info!(
            "Wrote store {} ({} rows, {} bands, {}x{})",
            dst.display(),
            shape.rows,
            shape.bands,
            shape.width,
            shape.height
        );
        Ok(())
    }
}

fn create_mapped(path: &Path, shape: Ix4) -> Result<MmapMut> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)?;
    write_zeroed_npy::<u16, _>(&file, shape)?;

    // SAFETY: the file lives in a private staging directory and is not resized while mapped
    let mmap = unsafe { MmapMut::map_mut(&file)? };
    Ok(mmap)
}

fn write_paths(path: &Path, paths: &[String]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, paths)?;
    writer.flush()?;
    Ok(())
}

/// One row of a store, borrowed from the mapped arrays.
#[derive(Debug)]
pub struct StoreRow<'a> {
    pub index: usize,
    pub image: ArrayView3<'a, u16>,
    pub label: ArrayView3<'a, u16>,
    pub identifier: &'a str,
    pub epsg: i32,
    pub geotransform: GeoTransform,
}

/// Read-only view of a complete store.
pub struct Store {
    shape: StoreShape,
    img: Mmap,
    lbl: Mmap,
    paths: Vec<String>,
    epsg: Vec<i32>,
    affine: Vec<GeoTransform>,
    img_means: Vec<f64>,
    img_stds: Vec<f64>,
}

impl Store {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(StackError::SourceNotFound(root.to_path_buf()));
        }

        let img = map_readonly(&root.join(IMG_FILE))?;
        let lbl = map_readonly(&root.join(LBL_FILE))?;

        let paths: Vec<String> =
            serde_json::from_reader(BufReader::new(File::open(root.join(PATH_FILE))?))?;
        let epsg: Array1<i32> = read_npy(root.join(EPSG_FILE))?;
        let affine: Array2<f64> = read_npy(root.join(AFFINE_FILE))?;
        let img_means: Array1<f64> = read_npy(root.join(MEANS_FILE))?;
        let img_stds: Array1<f64> = read_npy(root.join(STDS_FILE))?;

        if affine.ncols() != 6 {
            return Err(StackError::MalformedStore(format!(
                "/affine has {} columns, expected 6",
                affine.ncols()
            )));
        }
        let affine: Vec<GeoTransform> = affine
            .outer_iter()
            .map(|row| GeoTransform::from_gdal([row[0], row[1], row[2], row[3], row[4], row[5]]))
            .collect();

        let (rows, bands, height, width) = ArrayView4::<u16>::view_npy(&img[..])?.dim();
        let labels = promote_labels(ArrayViewD::<u16>::view_npy(&lbl[..])?)?;
        if labels.dim() != (rows, 1, height, width) {
            return Err(StackError::MalformedStore(format!(
                "/lbl has shape {:?}, expected {:?}",
                labels.dim(),
                (rows, 1, height, width)
            )));
        }

        for (name, len) in [
            ("path", paths.len()),
            ("epsg", epsg.len()),
            ("affine", affine.len()),
        ] {
            if len != rows {
                return Err(StackError::MalformedStore(format!(
                    "/{} has {} entries for {} rows",
                    name, len, rows
                )));
            }
        }
        if img_means.len() != bands || img_stds.len() != bands {
            return Err(StackError::MalformedStore(format!(
                "band statistics have {}/{} entries for {} bands",
                img_means.len(),
                img_stds.len(),
                bands
            )));
        }

        debug!(
            "Opened store {}: {} rows, {} bands, {}x{}",
            root.display(),
            rows,
            bands,
            width,
            height
        );

        Ok(Self {
            shape: StoreShape {
                rows,
                bands,
                height,
                width,
            },
            img,
            lbl,
            paths,
            epsg: epsg.to_vec(),
            affine,
            img_means: img_means.to_vec(),
            img_stds: img_stds.to_vec(),
        })
    }

    pub fn shape(&self) -> StoreShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.rows
    }

    pub fn is_empty(&self) -> bool {
        self.shape.rows == 0
    }

    pub fn images(&self) -> Result<ArrayView4<'_, u16>> {
        Ok(ArrayView4::<u16>::view_npy(&self.img[..])?)
    }

    /// `/lbl` as `[N,1,H,W]`, promoting a legacy `[N,H,W]` layout.
    pub fn labels(&self) -> Result<ArrayView4<'_, u16>> {
        promote_labels(ArrayViewD::<u16>::view_npy(&self.lbl[..])?)
    }

    pub fn identifiers(&self) -> &[String] {
        &self.paths
    }

    pub fn epsg(&self) -> &[i32] {
        &self.epsg
    }

    pub fn geotransforms(&self) -> &[GeoTransform] {
        &self.affine
    }

    pub fn img_means(&self) -> &[f64] {
        &self.img_means
    }

    pub fn img_stds(&self) -> &[f64] {
        &self.img_stds
    }

    pub fn row(&self, index: usize) -> Result<StoreRow<'_>> {
        if index >= self.len() {
            return Err(StackError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        Ok(StoreRow {
            index,
            image: self.images()?.index_axis_move(Axis(0), index),
            label: self.labels()?.index_axis_move(Axis(0), index),
            identifier: &self.paths[index],
            epsg: self.epsg[index],
            geotransform: self.affine[index],
        })
    }
}

fn map_readonly(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: stores are immutable once renamed into place
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

fn promote_labels(labels: ArrayViewD<'_, u16>) -> Result<ArrayView4<'_, u16>> {
    match labels.ndim() {
        3 => Ok(labels.insert_axis(Axis(1)).into_dimensionality::<Ix4>()?),
        4 if labels.len_of(Axis(1)) == 1 => Ok(labels.into_dimensionality::<Ix4>()?),
        _ => Err(StackError::MalformedStore(format!(
            "/lbl has shape {:?}, expected [N,1,H,W] or [N,H,W]",
            labels.shape()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    fn metadata(rows: usize, bands: usize) -> StoreMetadata {
        StoreMetadata {
            paths: (0..rows).map(|i| format!("img_{}", i)).collect(),
            epsg: vec![32601; rows],
            affine: (0..rows)
                .map(|i| GeoTransform::from_gdal([i as f64, 10.0, 0.0, 0.0, 0.0, -10.0]))
                .collect(),
            img_means: vec![1.5; bands],
            img_stds: vec![0.5; bands],
        }
    }

    #[test]
    fn test_write_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("store");
        let shape = StoreShape {
            rows: 3,
            bands: 2,
            height: 4,
            width: 5,
        };

        let mut writer = StoreWriter::create(&dst, shape).unwrap();
        {
            let (mut img, mut lbl) = writer.arrays_mut().unwrap();
            img.index_axis_mut(Axis(0), 1).fill(7);
            lbl.index_axis_mut(Axis(0), 2).fill(3);
        }
        assert!(!dst.exists());
        writer.finish(&metadata(3, 2)).unwrap();

        let store = Store::open(&dst).unwrap();
        assert_eq!(store.shape(), shape);
        assert_eq!(store.identifiers()[2], "img_2");
        assert_eq!(store.img_means(), &[1.5, 1.5]);

        let row = store.row(1).unwrap();
        assert!(row.image.iter().all(|&v| v == 7));
        assert!(row.label.iter().all(|&v| v == 0));
        assert_eq!(row.label.dim(), (1, 4, 5));
        assert_eq!(row.geotransform.origin_x, 1.0);

        let row = store.row(2).unwrap();
        assert!(row.label.iter().all(|&v| v == 3));

        assert!(matches!(
            store.row(3),
            Err(StackError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_create_refuses_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let shape = StoreShape {
            rows: 1,
            bands: 1,
            height: 1,
            width: 1,
        };
        assert!(matches!(
            StoreWriter::create(dir.path(), shape),
            Err(StackError::DestinationExists(_))
        ));
    }

    #[test]
    fn test_failed_finish_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("store");
        let shape = StoreShape {
            rows: 2,
            bands: 1,
            height: 2,
            width: 2,
        };

        let writer = StoreWriter::create(&dst, shape).unwrap();
        let result = writer.finish(&metadata(1, 1));
        assert!(matches!(result, Err(StackError::MalformedStore(_))));
        assert!(!dst.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_legacy_label_layout_is_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("legacy");
        fs::create_dir(&root).unwrap();

        let img = Array4::<u16>::ones((2, 3, 4, 4));
        let lbl = Array3::<u16>::from_elem((2, 4, 4), 2);
        write_npy(root.join(IMG_FILE), &img).unwrap();
        write_npy(root.join(LBL_FILE), &lbl).unwrap();
        write_paths(&root.join(PATH_FILE), &["a".to_string(), "b".to_string()]).unwrap();
        write_npy(root.join(EPSG_FILE), &Array1::from(vec![4326, 4326])).unwrap();
        write_npy(root.join(AFFINE_FILE), &Array2::<f64>::zeros((2, 6))).unwrap();
        write_npy(root.join(MEANS_FILE), &Array1::from(vec![1.0, 1.0, 1.0])).unwrap();
        write_npy(root.join(STDS_FILE), &Array1::from(vec![0.0, 0.0, 0.0])).unwrap();

        let store = Store::open(&root).unwrap();
        assert_eq!(store.labels().unwrap().dim(), (2, 1, 4, 4));
        assert!(store.row(1).unwrap().label.iter().all(|&v| v == 2));
    }

    #[test]
    fn test_open_rejects_misaligned_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("broken");
        fs::create_dir(&root).unwrap();

        write_npy(root.join(IMG_FILE), &Array4::<u16>::zeros((2, 1, 2, 2))).unwrap();
        write_npy(root.join(LBL_FILE), &Array4::<u16>::zeros((2, 1, 2, 2))).unwrap();
        write_paths(&root.join(PATH_FILE), &["only_one".to_string()]).unwrap();
        write_npy(root.join(EPSG_FILE), &Array1::from(vec![4326, 4326])).unwrap();
        write_npy(root.join(AFFINE_FILE), &Array2::<f64>::zeros((2, 6))).unwrap();
        write_npy(root.join(MEANS_FILE), &Array1::from(vec![0.0])).unwrap();
        write_npy(root.join(STDS_FILE), &Array1::from(vec![0.0])).unwrap();

        assert!(matches!(
            Store::open(&root),
            Err(StackError::MalformedStore(_))
        ));
    }

    #[test]
    fn test_open_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Store::open(&dir.path().join("missing")),
            Err(StackError::SourceNotFound(_))
        ));
    }
}
