//! Raster access, matrix reading, co-registration and output writing

pub mod raster;
pub mod memory;
#[cfg(feature = "gdal")]
pub mod gdal_raster;
pub mod matrix_reader;
pub mod coregistration;
pub mod output;

pub use raster::RasterIo;
pub use memory::{MemoryRaster, StoredRaster};
#[cfg(feature = "gdal")]
pub use gdal_raster::GdalRaster;
pub use matrix_reader::MatrixReader;
pub use coregistration::{coregister_series, CoRegistration, WindowSubsetRegistrar};
pub use output::{ChangeMapPaths, ChangeMapWriter, CollisionPolicy};
