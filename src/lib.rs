//! sarseq: Sequential omnibus change detection for polarimetric SAR
//!
//! Given k co-registered polarimetric images (covariance or coherency matrix
//! bands), every window of consecutive images is tested for change with the
//! omnibus likelihood-ratio test of Conradsen et al. (2016). The resulting
//! p-values are scanned sequentially into change maps: most recent change,
//! first change, change frequency and per-interval bitemporal changes.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    GeoReference, GeoTransform, MatrixDimension, PixelWindow, RasterInfo, SarError, SarResult,
    SpatialExtent,
};

pub use io::{
    ChangeMapWriter, CoRegistration, CollisionPolicy, MatrixReader, MemoryRaster, RasterIo,
    StoredRaster, WindowSubsetRegistrar,
};

#[cfg(feature = "gdal")]
pub use io::GdalRaster;

pub use core::{
    ArchiveBacking, BatchExecutor, ChangeMapBuilder, ChangeMaps, DetectorParams,
    ExecutionStrategy, ImageSeries, PValueArchive, SequentialChangeDetector, WindowOrchestrator,
    WindowTask,
};
