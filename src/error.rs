use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Failed to read npy array: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("Failed to write npy array: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    #[error("Failed to map npy array: {0}")]
    NpyView(#[from] ndarray_npy::ViewNpyError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] glob::GlobError),

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Source path does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("Destination already exists: {0}. Please (re)move it or use another destination")]
    DestinationExists(PathBuf),

    #[error("No images matching the pattern were found below {0}")]
    NoImagesFound(PathBuf),

    #[error("No source images were given")]
    EmptySourceSet,

    #[error("Number of images ({images}) differs from number of labels ({labels})")]
    CountMismatch { images: usize, labels: usize },

    #[error("Number of bands differs across images: {0:?}")]
    BandCountMismatch(Vec<usize>),

    #[error("Band selection {requested:?} is invalid for rasters with {available} bands (bands are indexed from 1)")]
    InvalidBands {
        requested: Vec<usize>,
        available: usize,
    },

    #[error("Invalid tiling parameters: {0}")]
    InvalidTiling(String),

    #[error("Input raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Raster array has shape {actual:?}, expected {expected:?}")]
    ArrayShapeMismatch {
        actual: (usize, usize, usize),
        expected: (usize, usize, usize),
    },

    #[error("CRS error: {0}")]
    CrsError(String),

    #[error("Index {index} is out of range for a store with {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Store is malformed: {0}")]
    MalformedStore(String),

    #[error(
        "Tiled arrays are misaligned: expected {expected} rows, got images={images}, labels={labels}, \
         paths={paths}, epsg={epsg}, affine={affine}"
    )]
    Consistency {
        expected: usize,
        images: usize,
        labels: usize,
        paths: usize,
        epsg: usize,
        affine: usize,
    },
}

/// Coarse classification of [`StackError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input detected before any heavy work.
    Validation,
    /// Parallel metadata arrays disagree with the array data.
    Consistency,
    /// Missing sources, destination collisions and failing readers/writers.
    Io,
}

impl StackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StackError::CountMismatch { .. }
            | StackError::BandCountMismatch(_)
            | StackError::InvalidBands { .. }
            | StackError::InvalidTiling(_)
            | StackError::InvalidDimensions(..)
            | StackError::EmptySourceSet
            | StackError::IndexOutOfRange { .. }
            | StackError::Pattern(_) => ErrorKind::Validation,
            StackError::Consistency { .. } | StackError::ArrayShapeMismatch { .. } => {
                ErrorKind::Consistency
            }
            _ => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
