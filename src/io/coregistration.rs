//! Spatial subsetting and co-registration of a series
//!
//! Registration proper is an external concern behind [`CoRegistration`].
//! [`WindowSubsetRegistrar`] covers the common case of images already
//! resampled to the reference grid, where aligning reduces to cutting the
//! same pixel window from every image.

use crate::core::executor::BatchExecutor;
use crate::io::output::with_suffix;
use crate::io::raster::RasterIo;
use crate::types::{GeoReference, PixelWindow, SarError, SarResult};
use std::path::{Path, PathBuf};

/// Subset and registration operations on raster files
pub trait CoRegistration: Send + Sync {
    /// Cut `window` out of `file`, returning the path of the subset
    fn subset(&self, file: &Path, window: PixelWindow) -> SarResult<PathBuf>;

    /// Align `target` to the `window` subset of `reference`, returning the aligned path
    fn register(&self, reference: &Path, target: &Path, window: PixelWindow) -> SarResult<PathBuf>;
}

/// Registrar for images sharing the reference pixel grid
pub struct WindowSubsetRegistrar<'a> {
    io: &'a dyn RasterIo,
}

impl<'a> WindowSubsetRegistrar<'a> {
    pub fn new(io: &'a dyn RasterIo) -> Self {
        Self { io }
    }
}

impl CoRegistration for WindowSubsetRegistrar<'_> {
    fn subset(&self, file: &Path, window: PixelWindow) -> SarResult<PathBuf> {
        let info = self.io.info(file)?;
        if !window.fits_within(info.extent) {
            return Err(SarError::CoRegistration(format!(
                "Window {:?} exceeds {} ({}x{} pixels)",
                window,
                file.display(),
                info.extent.cols,
                info.extent.rows
            )));
        }

        let bands = (1..=info.bands)
            .map(|band| self.io.read_band(file, band, window))
            .collect::<SarResult<Vec<_>>>()?;

        let georef = GeoReference {
            geo_transform: info.georef.geo_transform.map(|gt| gt.shifted(&window)),
            projection: info.georef.projection,
        };

        let output = with_suffix(file, "_sub");
        self.io.write_float_raster(&output, &bands, &georef)?;
        log::info!("Subset of {} written to {}", file.display(), output.display());
        Ok(output)
    }

    fn register(&self, reference: &Path, target: &Path, window: PixelWindow) -> SarResult<PathBuf> {
        let reference_info = self.io.info(reference)?;
        let target_info = self.io.info(target)?;

        if target_info.extent != reference_info.extent {
            return Err(SarError::CoRegistration(format!(
                "{} is not on the reference grid ({}x{} vs {}x{} pixels)",
                target.display(),
                target_info.extent.cols,
                target_info.extent.rows,
                reference_info.extent.cols,
                reference_info.extent.rows
            )));
        }

        self.subset(target, window)
    }
}

/// Subset the reference and register every other image against it
///
/// Registrations are independent and run as one batch on `executor`.
pub fn coregister_series(
    registrar: &dyn CoRegistration,
    executor: &BatchExecutor,
    files: &[PathBuf],
    window: PixelWindow,
) -> SarResult<Vec<PathBuf>> {
    let (reference, targets) = files
        .split_first()
        .ok_or_else(|| SarError::Usage("No images to co-register".to_string()))?;

    let start = std::time::Instant::now();
    let reference_subset = registrar.subset(reference, window)?;
    let registered = executor.map_with_fallback("co-registration", targets, |target| {
        registrar.register(reference, target, window)
    })?;
    log::info!("Elapsed time for co-registration: {:.2?}", start.elapsed());

    Ok(std::iter::once(reference_subset).chain(registered).collect())
}
