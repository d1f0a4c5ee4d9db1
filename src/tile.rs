use crate::error::{Result, StackError};
use crate::geotransform::GeoTransform;
use crate::grid::{extract_tile, TileGrid, TileWindow};
use crate::pool::TaskPool;
use crate::store::{ensure_absent, Store, StoreMetadata, StoreShape, StoreWriter};
use log::{debug, info};
use ndarray::Axis;
use std::path::Path;

/// Output rows written per task unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileOptions {
    pub tile_size: usize,
    /// Distance between neighbouring tile origins, in pixels.
    pub overlap: usize,
    /// Canvas every stored item is padded or cropped to before tiling.
    pub target_size: usize,
    /// Output rows per write unit. Larger chunks mean fewer, bigger writes.
    pub chunk_size: usize,
}

impl TileOptions {
    pub fn new(tile_size: usize, overlap: usize, target_size: usize) -> Self {
        Self {
            tile_size,
            overlap,
            target_size,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn grid(&self) -> Result<TileGrid> {
        if self.chunk_size == 0 {
            return Err(StackError::InvalidTiling(
                "chunk_size must be positive".to_string(),
            ));
        }
        TileGrid::new(self.target_size, self.tile_size, self.overlap)
    }
}

#[derive(Debug, Clone)]
pub struct TileSummary {
    pub source_rows: usize,
    pub tiles_per_item: usize,
    pub shape: StoreShape,
}

/// Cut every row of the store at `src` into overlapping tiles, written to a new store at `dst`.
pub fn tile_store(
    pool: &TaskPool,
    src: &Path,
    dst: &Path,
    options: &TileOptions,
) -> Result<TileSummary> {
    let grid = options.grid()?;
    ensure_absent(dst)?;

    let source = Store::open(src)?;
    let n_items = source.len();
    let windows: Vec<TileWindow> = grid.iter().collect();
    let rows = n_items * windows.len();

    info!(
        "Tiling {} items into {} tiles each ({}x{} tiles, overlap {}, canvas {})",
        n_items, grid.n_tiles, options.tile_size, options.tile_size, options.overlap, options.target_size
    );

    let metadata = StoreMetadata {
        paths: tile_identifiers(source.identifiers(), &grid),
        epsg: tile_epsgs(source.epsg(), grid.n_tiles),
        affine: tile_geotransforms(source.geotransforms(), &windows),
        img_means: source.img_means().to_vec(),
        img_stds: source.img_stds().to_vec(),
    };

    let shape = StoreShape {
        rows,
        bands: source.shape().bands,
        height: grid.tile_size(),
        width: grid.tile_size(),
    };
    let mut writer = StoreWriter::create(dst, shape)?;
    {
        let images = source.images()?;
        let labels = source.labels()?;
        let (mut img, mut lbl) = writer.arrays_mut()?;
        // Checked against the mapped arrays before any row is written
        check_alignment(
            n_items * grid.n_tiles,
            img.len_of(Axis(0)),
            lbl.len_of(Axis(0)),
            &metadata,
        )?;

        let chunk_size = options.chunk_size;
        let chunks: Vec<_> = img
            .axis_chunks_iter_mut(Axis(0), chunk_size)
            .zip(lbl.axis_chunks_iter_mut(Axis(0), chunk_size))
            .enumerate()
            .collect();

        pool.try_for_each_unordered(chunks, |(chunk_idx, (mut img_chunk, mut lbl_chunk))| {
            let start = chunk_idx * chunk_size;
            for (offset, (mut img_row, mut lbl_row)) in img_chunk
                .outer_iter_mut()
                .zip(lbl_chunk.outer_iter_mut())
                .enumerate()
            {
                let row = start + offset;
                let item = row / grid.n_tiles;
                let window = windows[row % grid.n_tiles];

                img_row.assign(&extract_tile(images.index_axis(Axis(0), item), &grid, window));
                lbl_row.assign(&extract_tile(labels.index_axis(Axis(0), item), &grid, window));
            }
            debug!("Wrote tile chunk {} (rows from {})", chunk_idx, start);
            Ok(())
        })?;
    }
    writer.finish(&metadata)?;

    Ok(TileSummary {
        source_rows: n_items,
        tiles_per_item: grid.n_tiles,
        shape,
    })
}

/// `{parent}_{tile_index}` for every tile of every parent, indices zero-padded.
pub fn tile_identifiers(parents: &[String], grid: &TileGrid) -> Vec<String> {
    let width = grid.index_width();
    parents
        .iter()
        .flat_map(|parent| {
            (0..grid.n_tiles).map(move |i| format!("{}_{:0width$}", parent, i, width = width))
        })
        .collect()
}

pub fn tile_epsgs(parents: &[i32], n_tiles: usize) -> Vec<i32> {
    parents
        .iter()
        .flat_map(|&epsg| std::iter::repeat(epsg).take(n_tiles))
        .collect()
}

/// Parent transforms with their origin moved to each tile's upper-left pixel.
pub fn tile_geotransforms(parents: &[GeoTransform], windows: &[TileWindow]) -> Vec<GeoTransform> {
    parents
        .iter()
        .flat_map(|parent| {
            windows
                .iter()
                .map(move |w| parent.translated(w.row_off, w.col_off))
        })
        .collect()
}

/// Every parallel array of a tiled store must have exactly `expected` rows.
pub fn check_alignment(
    expected: usize,
    images: usize,
    labels: usize,
    metadata: &StoreMetadata,
) -> Result<()> {
    let lengths = [
        images,
        labels,
        metadata.paths.len(),
        metadata.epsg.len(),
        metadata.affine.len(),
    ];
    if lengths.iter().any(|&len| len != expected) {
        return Err(StackError::Consistency {
            expected,
            images,
            labels,
            paths: metadata.paths.len(),
            epsg: metadata.epsg.len(),
            affine: metadata.affine.len(),
        });
    }
    Ok(())
}
