//! Raster access seam
//!
//! Reading, creating and writing raster files is delegated to an implementation
//! of [`RasterIo`]. The GDAL backend is used by the command-line tool, the
//! in-memory backend by tests and by callers that already hold their data.

use crate::types::{GeoReference, PixelWindow, RasterInfo, SarResult};
use ndarray::Array2;
use std::path::Path;

/// Raster file operations needed by the change detection pipeline
pub trait RasterIo: Send + Sync {
    /// Size, band count and georeferencing of a raster
    fn info(&self, path: &Path) -> SarResult<RasterInfo>;

    /// Read one band (1-based) over a pixel window
    fn read_band(&self, path: &Path, band: usize, window: PixelWindow) -> SarResult<Array2<f64>>;

    /// Create a byte raster with one band per array
    fn write_byte_raster(
        &self,
        path: &Path,
        bands: &[Array2<u8>],
        georef: &GeoReference,
    ) -> SarResult<()>;

    /// Create a floating point raster with one band per array
    fn write_float_raster(
        &self,
        path: &Path,
        bands: &[Array2<f64>],
        georef: &GeoReference,
    ) -> SarResult<()>;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
