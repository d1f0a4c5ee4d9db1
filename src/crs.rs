use crate::error::{Result, StackError};
use gdal::spatial_ref::SpatialRef;
use gdal::Dataset;
use log::{debug, warn};

/// Resolve the EPSG code of a dataset's spatial reference.
///
/// Falls back to GDAL's authority identification when the CRS carries no
/// explicit EPSG authority node (common for WKT written by older tools).
pub fn epsg_from_dataset(dataset: &Dataset) -> Result<i32> {
    let mut spatial_ref = dataset
        .spatial_ref()
        .map_err(|e| StackError::CrsError(format!("dataset has no spatial reference: {}", e)))?;

    if let Ok(code) = spatial_ref.auth_code() {
        return Ok(code);
    }

    debug!("No EPSG authority code on spatial reference, trying auto identification");
    match spatial_ref.auto_identify_epsg() {
        Ok(()) => spatial_ref
            .auth_code()
            .map_err(|e| StackError::CrsError(format!("EPSG code could not be identified: {}", e))),
        Err(e) => {
            warn!("EPSG auto identification failed: {}", e);
            Err(StackError::CrsError(format!(
                "EPSG code could not be identified: {}",
                e
            )))
        }
    }
}

/// Build a spatial reference from an EPSG code.
pub fn spatial_ref_from_epsg(epsg: i32) -> Result<SpatialRef> {
    let code = u32::try_from(epsg)
        .map_err(|_| StackError::CrsError(format!("invalid EPSG code: {}", epsg)))?;
    SpatialRef::from_epsg(code)
        .map_err(|e| StackError::CrsError(format!("unknown EPSG code {}: {}", epsg, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_epsg_rejected() {
        assert!(matches!(
            spatial_ref_from_epsg(-1),
            Err(StackError::CrsError(_))
        ));
    }

    #[test]
    fn test_epsg_roundtrip() {
        let spatial_ref = spatial_ref_from_epsg(32601).unwrap();
        assert_eq!(spatial_ref.auth_code().unwrap(), 32601);
    }
}
