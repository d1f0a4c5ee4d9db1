use crate::crs::{epsg_from_dataset, spatial_ref_from_epsg};
use crate::error::{Result, StackError};
use crate::geotransform::GeoTransform;
use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager};
use log::debug;
use ndarray::{Array3, ArrayView3, Axis};
use std::path::Path;

/// Geometry and referencing of a raster, read without touching pixel data.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub epsg: i32,
    pub geotransform: GeoTransform,
}

/// Everything a writer needs besides the pixels.
#[derive(Debug, Clone)]
pub struct RasterProfile {
    pub driver: String,
    pub band_count: usize,
    pub height: usize,
    pub width: usize,
    pub epsg: i32,
    pub geotransform: GeoTransform,
    pub nodata: Option<f64>,
    pub compression: Option<String>,
}

impl RasterProfile {
    /// GeoTIFF profile used for reconstructed rasters: u16, nodata 0, LZW.
    pub fn geotiff(
        band_count: usize,
        height: usize,
        width: usize,
        epsg: i32,
        geotransform: GeoTransform,
    ) -> Self {
        Self {
            driver: "GTiff".to_string(),
            band_count,
            height,
            width,
            epsg,
            geotransform,
            nodata: Some(0.0),
            compression: Some("LZW".to_string()),
        }
    }

    fn creation_options(&self) -> Vec<String> {
        match &self.compression {
            Some(compression) => vec![format!("COMPRESS={}", compression)],
            None => Vec::new(),
        }
    }
}

/// Reader/writer of georeferenced rasters.
///
/// Arrays are always `[bands, height, width]`; band indices are 1-based.
pub trait RasterIo: Sync {
    fn probe(&self, path: &Path) -> Result<RasterMetadata>;

    /// Read the given bands, or all bands when `bands` is `None`.
    fn read(&self, path: &Path, bands: Option<&[usize]>) -> Result<Array3<u16>>;

    fn write(&self, path: &Path, data: ArrayView3<'_, u16>, profile: &RasterProfile) -> Result<()>;
}

/// [`RasterIo`] backed by GDAL.
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalIo;

impl RasterIo for GdalIo {
    fn probe(&self, path: &Path) -> Result<RasterMetadata> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();

        if width == 0 || height == 0 {
            return Err(StackError::InvalidDimensions(width, height));
        }

        let metadata = RasterMetadata {
            width,
            height,
            band_count: dataset.raster_count() as usize,
            epsg: epsg_from_dataset(&dataset)?,
            geotransform: GeoTransform::from_gdal(dataset.geo_transform()?),
        };

        debug!(
            "Probed {}: {}x{}, {} bands, EPSG:{}",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.band_count,
            metadata.epsg
        );
        Ok(metadata)
    }

    fn read(&self, path: &Path, bands: Option<&[usize]>) -> Result<Array3<u16>> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;

        let selected: Vec<usize> = match bands {
            Some(bands) => bands.to_vec(),
            None => (1..=band_count).collect(),
        };
        if selected.iter().any(|&b| b == 0 || b > band_count) {
            return Err(StackError::InvalidBands {
                requested: selected,
                available: band_count,
            });
        }

        let mut data_vec: Vec<u16> = Vec::with_capacity(selected.len() * width * height);
        for &band_index in &selected {
            let rasterband = dataset.rasterband(band_index)?;
            let buffer =
                rasterband.read_as::<u16>((0, 0), (width, height), (width, height), None)?;
            data_vec.extend(buffer.into_iter());
        }

        Ok(Array3::from_shape_vec(
            (selected.len(), height, width),
            data_vec,
        )?)
    }

    fn write(&self, path: &Path, data: ArrayView3<'_, u16>, profile: &RasterProfile) -> Result<()> {
        let expected = (profile.band_count, profile.height, profile.width);
        if data.dim() != expected {
            return Err(StackError::ArrayShapeMismatch {
                actual: data.dim(),
                expected,
            });
        }

        let driver = DriverManager::get_driver_by_name(&profile.driver)?;
        let options = profile.creation_options();

        let mut dataset = if options.is_empty() {
            driver.create_with_band_type::<u16, _>(
                path,
                profile.width,
                profile.height,
                profile.band_count,
            )?
        } else {
            let mut gdal_options = CslStringList::new();
            for opt in options {
                gdal_options.add_string(&opt)?;
            }

            driver.create_with_band_type_with_options::<u16, _>(
                path,
                profile.width,
                profile.height,
                profile.band_count,
                &gdal_options,
            )?
        };

        dataset.set_geo_transform(&profile.geotransform.to_gdal())?;
        dataset.set_spatial_ref(&spatial_ref_from_epsg(profile.epsg)?)?;

        for (i, band_data) in data.axis_iter(Axis(0)).enumerate() {
            let mut raster_band = dataset.rasterband(i + 1)?;

            // GDAL expects row-major order, which is the logical iteration order
            let values: Vec<u16> = band_data.iter().copied().collect();
            let mut buffer = Buffer::new((profile.width, profile.height), values);
            raster_band.write((0, 0), (profile.width, profile.height), &mut buffer)?;
            raster_band.set_no_data_value(profile.nodata)?;
        }

        debug!(
            "Wrote {} ({} bands, {}x{})",
            path.display(),
            profile.band_count,
            profile.width,
            profile.height
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn profile(bands: usize, height: usize, width: usize) -> RasterProfile {
        RasterProfile::geotiff(
            bands,
            height,
            width,
            32601,
            GeoTransform::from_gdal([0.0, 10.0, 0.0, 0.0, 0.0, -10.0]),
        )
    }

    #[test]
    fn test_geotiff_profile_options() {
        let opts = profile(1, 1, 1).creation_options();
        assert_eq!(opts, vec!["COMPRESS=LZW".to_string()]);
    }

    #[test]
    fn test_no_compression_no_options() {
        let mut p = profile(1, 1, 1);
        p.compression = None;
        assert!(p.creation_options().is_empty());
    }

    #[test]
    fn test_write_read_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raster.tif");
        let data = Array3::from_shape_fn((3, 5, 7), |(b, r, c)| (b * 100 + r * 10 + c) as u16);

        GdalIo.write(&path, data.view(), &profile(3, 5, 7)).unwrap();

        let metadata = GdalIo.probe(&path).unwrap();
        assert_eq!(metadata.width, 7);
        assert_eq!(metadata.height, 5);
        assert_eq!(metadata.band_count, 3);
        assert_eq!(metadata.epsg, 32601);
        assert_eq!(
            metadata.geotransform.to_gdal(),
            [0.0, 10.0, 0.0, 0.0, 0.0, -10.0]
        );

        assert_eq!(GdalIo.read(&path, None).unwrap(), data);

        let subset = GdalIo.read(&path, Some(&[3, 1][..])).unwrap();
        assert_eq!(subset.index_axis(Axis(0), 0), data.index_axis(Axis(0), 2));
        assert_eq!(subset.index_axis(Axis(0), 1), data.index_axis(Axis(0), 0));
    }

    #[test]
    fn test_read_band_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raster.tif");
        let data = Array3::<u16>::zeros((2, 4, 4));
        GdalIo.write(&path, data.view(), &profile(2, 4, 4)).unwrap();

        assert!(matches!(
            GdalIo.read(&path, Some(&[3][..])),
            Err(StackError::InvalidBands { available: 2, .. })
        ));
        assert!(matches!(
            GdalIo.read(&path, Some(&[0][..])),
            Err(StackError::InvalidBands { .. })
        ));
    }

    #[test]
    fn test_write_rejects_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raster.tif");
        let data = Array3::<u16>::zeros((2, 4, 4));

        assert!(matches!(
            GdalIo.write(&path, data.view(), &profile(1, 4, 4)),
            Err(StackError::ArrayShapeMismatch { .. })
        ));
        assert!(!path.exists());
    }
}
