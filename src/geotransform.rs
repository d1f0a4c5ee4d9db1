/// Affine mapping from pixel (row, col) to map coordinates, stored in GDAL order.
///
/// ```text
/// x = origin_x + col * pixel_width  + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// The scale and rotation terms belong to the raster lineage and are never
/// changed when deriving the transform of a sub-window; only the origin moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            row_rotation: gt[2],
            origin_y: gt[3],
            col_rotation: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the upper-left corner of pixel (row, col).
    pub fn pixel_to_geo(&self, row: f64, col: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Transform of a window whose upper-left pixel is (row_off, col_off) in this raster.
    pub fn translated(&self, row_off: usize, col_off: usize) -> Self {
        let (origin_x, origin_y) = self.pixel_to_geo(row_off as f64, col_off as f64);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn north_up() -> GeoTransform {
        GeoTransform::from_gdal([500_000.0, 10.0, 0.0, 4_000_000.0, 0.0, -10.0])
    }

    #[test]
    fn test_gdal_order_preserved() {
        let gt = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let transform = GeoTransform::from_gdal(gt);
        assert_eq!(transform.origin_x, 1.0);
        assert_eq!(transform.row_rotation, 3.0);
        assert_eq!(transform.col_rotation, 5.0);
        assert_eq!(transform.to_gdal(), gt);
    }

    #[test]
    fn test_pixel_to_geo_north_up() {
        let (x, y) = north_up().pixel_to_geo(128.0, 256.0);
        assert!((x - 502_560.0).abs() < 1e-9);
        assert!((y - 3_998_720.0).abs() < 1e-9);
    }

    #[test]
    fn test_translated_keeps_scale_terms() {
        let parent = GeoTransform::from_gdal([100.0, 0.5, 0.1, 200.0, 0.2, -0.5]);
        let tile = parent.translated(4, 8);

        assert!((tile.origin_x - (100.0 + 8.0 * 0.5 + 4.0 * 0.1)).abs() < 1e-12);
        assert!((tile.origin_y - (200.0 + 8.0 * 0.2 - 4.0 * 0.5)).abs() < 1e-12);
        assert_eq!(tile.pixel_width, parent.pixel_width);
        assert_eq!(tile.row_rotation, parent.row_rotation);
        assert_eq!(tile.col_rotation, parent.col_rotation);
        assert_eq!(tile.pixel_height, parent.pixel_height);
    }

    #[test]
    fn test_translated_zero_is_identity() {
        assert_eq!(north_up().translated(0, 0), north_up());
    }
}
