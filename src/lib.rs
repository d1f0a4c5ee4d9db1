// Library exports for testing and reuse

pub mod cli;
pub mod crs;
pub mod discovery;
pub mod error;
pub mod geotransform;
pub mod grid;
pub mod io;
pub mod pack;
pub mod pool;
pub mod probe;
pub mod reconstruct;
pub mod stats;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use discovery::{discover_sources, SourceSet};
pub use error::{ErrorKind, Result, StackError};
pub use geotransform::GeoTransform;
pub use grid::{TileGrid, TileWindow};
pub use io::{GdalIo, RasterIo, RasterMetadata, RasterProfile};
pub use pack::{pack_images, PackOptions, PackSummary};
pub use pool::TaskPool;
pub use probe::{check_size_disparity, probe_sources, SizeDisparity};
pub use reconstruct::{reconstruct, Selection};
pub use store::{Store, StoreShape};
pub use tile::{tile_store, TileOptions, TileSummary};
