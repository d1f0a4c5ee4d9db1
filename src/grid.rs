use crate::error::{Result, StackError};
use log::debug;
use ndarray::{s, Array3, ArrayView3};

/// Position of one tile inside the padded canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileWindow {
    pub index: usize,
    pub row_off: usize,
    pub col_off: usize,
}

/// Square grid of overlapping tiles over a `target_size` canvas.
///
/// Tile `i` lives at grid cell `(i / n_side, i % n_side)`, i.e. row-major with
/// rows as the outer loop. Every metadata array derived from a tiled store
/// relies on this ordering.
#[derive(Debug, Clone)]
pub struct TileGrid {
    target_size: usize,
    tile_size: usize,
    overlap: usize,
    pub n_side: usize,
    pub n_tiles: usize,
}

impl TileGrid {
    pub fn new(target_size: usize, tile_size: usize, overlap: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(StackError::InvalidTiling(
                "tile_size must be positive".to_string(),
            ));
        }
        if overlap == 0 {
            return Err(StackError::InvalidTiling(
                "overlap must be positive".to_string(),
            ));
        }
        if tile_size > target_size {
            return Err(StackError::InvalidTiling(format!(
                "tile_size ({}) exceeds target_size ({})",
                tile_size, target_size
            )));
        }

        let n_side = (target_size - tile_size) / overlap + 1;
        let n_tiles = n_side * n_side;

        debug!(
            "TileGrid: target={}, tile={}, overlap={} → {}x{} tiles ({} total)",
            target_size, tile_size, overlap, n_side, n_side, n_tiles
        );

        Ok(Self {
            target_size,
            tile_size,
            overlap,
            n_side,
            n_tiles,
        })
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Digits needed to print every tile index with the same width.
    pub fn index_width(&self) -> usize {
        self.n_tiles.to_string().len()
    }

    pub fn window(&self, index: usize) -> TileWindow {
        let grid_row = index / self.n_side;
        let grid_col = index % self.n_side;

        TileWindow {
            index,
            row_off: grid_row * self.overlap,
            col_off: grid_col * self.overlap,
        }
    }

    pub fn iter(&self) -> TileIter<'_> {
        TileIter::new(self)
    }
}

pub struct TileIter<'a> {
    grid: &'a TileGrid,
    current_idx: usize,
}

impl<'a> TileIter<'a> {
    fn new(grid: &'a TileGrid) -> Self {
        Self {
            grid,
            current_idx: 0,
        }
    }
}

impl<'a> Iterator for TileIter<'a> {
    type Item = TileWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx < self.grid.n_tiles {
            let window = self.grid.window(self.current_idx);
            self.current_idx += 1;
            Some(window)
        } else {
            None
        }
    }
}

/// Zero-pad (bottom/right) or crop `data` to exactly `height` x `width`.
///
/// The upper-left pixel stays anchored, so the geotransform remains valid.
pub fn pad_or_crop(data: ArrayView3<'_, u16>, height: usize, width: usize) -> Array3<u16> {
    let (bands, src_height, src_width) = data.dim();
    let copy_height = src_height.min(height);
    let copy_width = src_width.min(width);

    let mut canvas = Array3::<u16>::zeros((bands, height, width));
    canvas
        .slice_mut(s![.., ..copy_height, ..copy_width])
        .assign(&data.slice(s![.., ..copy_height, ..copy_width]));
    canvas
}

/// Owned tile of `parent` after it has been padded or cropped to the canvas.
///
/// Equivalent to slicing `pad_or_crop(parent, target, target)` at `window`,
/// without materialising the canvas.
pub fn extract_tile(
    parent: ArrayView3<'_, u16>,
    grid: &TileGrid,
    window: TileWindow,
) -> Array3<u16> {
    let (bands, src_height, src_width) = parent.dim();
    let tile_size = grid.tile_size();
    let mut tile = Array3::<u16>::zeros((bands, tile_size, tile_size));

    let row_limit = src_height.min(grid.target_size());
    let col_limit = src_width.min(grid.target_size());
    let row_end = (window.row_off + tile_size).min(row_limit);
    let col_end = (window.col_off + tile_size).min(col_limit);

    if window.row_off < row_end && window.col_off < col_end {
        let rows = row_end - window.row_off;
        let cols = col_end - window.col_off;
        tile.slice_mut(s![.., ..rows, ..cols]).assign(&parent.slice(s![
            ..,
            window.row_off..row_end,
            window.col_off..col_end
        ]));
    }
    tile
}
