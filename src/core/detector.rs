use crate::core::archive::{ArchiveBacking, PValueArchive};
use crate::core::change_maps::{ChangeMapBuilder, ChangeMaps};
use crate::core::executor::{BatchExecutor, ExecutionStrategy};
use crate::core::schedule::{window_pairs, WindowOrchestrator};
use crate::core::series::ImageSeries;
use crate::io::coregistration::{coregister_series, CoRegistration, WindowSubsetRegistrar};
use crate::io::output::{ChangeMapPaths, ChangeMapWriter, CollisionPolicy};
use crate::io::raster::RasterIo;
use crate::types::{PixelWindow, SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// Change detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Significance level below which a change is declared
    pub significance: f64,
    /// Equivalent number of looks of the input images
    pub enl: f64,
    /// Smooth p-value maps with a 3x3 median before thresholding
    pub median_filter: bool,
    pub execution: ExecutionStrategy,
    pub archive_backing: ArchiveBacking,
    /// Directory for the memory-mapped archive (system temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
    pub collision_policy: CollisionPolicy,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            significance: 0.01,
            enl: 1.0,
            median_filter: false,
            execution: ExecutionStrategy::default(),
            archive_backing: ArchiveBacking::default(),
            scratch_dir: None,
            collision_policy: CollisionPolicy::default(),
        }
    }
}

impl DetectorParams {
    pub fn with_enl(enl: f64) -> Self {
        Self {
            enl,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SarResult<()> {
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(SarError::Usage(format!(
                "Significance must lie in (0, 1), got {}",
                self.significance
            )));
        }
        if !(self.enl.is_finite() && self.enl > 0.0) {
            return Err(SarError::Usage(format!(
                "Equivalent number of looks must be positive, got {}",
                self.enl
            )));
        }
        if let ExecutionStrategy::Parallel { threads: Some(0) } = self.execution {
            return Err(SarError::Usage("Worker pool needs at least one thread".to_string()));
        }
        Ok(())
    }
}

/// Result of a complete run
#[derive(Debug)]
pub struct DetectionOutput {
    pub series: ImageSeries,
    pub maps: ChangeMaps,
    pub paths: ChangeMapPaths,
}

/// Sequential omnibus change detection over an image series
pub struct SequentialChangeDetector<'a> {
    io: &'a dyn RasterIo,
    params: DetectorParams,
    executor: BatchExecutor,
}

impl<'a> SequentialChangeDetector<'a> {
    pub fn new(io: &'a dyn RasterIo, params: DetectorParams) -> SarResult<Self> {
        params.validate()?;
        let executor = BatchExecutor::new(params.execution, params.median_filter);
        Ok(Self {
            io,
            params,
            executor,
        })
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// P-values of every window of the series
    pub fn compute_archive(&self, series: &ImageSeries) -> SarResult<PValueArchive> {
        let start = Instant::now();
        log::info!(
            "Pre-calculating {} test statistics and p-values",
            window_pairs(series.len()).len()
        );

        let mut archive = PValueArchive::new(
            series.len(),
            series.extent(),
            self.params.archive_backing,
            self.params.scratch_dir.as_deref(),
        )?;
        WindowOrchestrator::new(series, self.params.enl).fill(&self.executor, self.io, &mut archive)?;

        log::info!("Elapsed time for p-value calculation: {:.2?}", start.elapsed());
        Ok(archive)
    }

    /// Change maps of a loaded series
    pub fn detect(&self, series: &ImageSeries) -> SarResult<ChangeMaps> {
        let archive = self.compute_archive(series)?;
        ChangeMapBuilder::new(self.params.significance).build(&archive)
    }

    /// Full run: optional co-registration, detection and writing of the maps
    ///
    /// With a `window`, the reference is cut to it and the other images are
    /// registered by `registrar` (a [`WindowSubsetRegistrar`] when `None`).
    /// Outputs are named after `out_name` in the directory of the first input.
    pub fn run(
        &self,
        files: &[PathBuf],
        window: Option<PixelWindow>,
        registrar: Option<&dyn CoRegistration>,
        out_name: &str,
    ) -> SarResult<DetectionOutput> {
        let start = Instant::now();
        let reference = files
            .first()
            .ok_or_else(|| SarError::Usage("No input images given".to_string()))?;

        // The reference must be readable before anything else happens
        self.io.info(reference)?;

        let files = match window {
            Some(window) => {
                let default_registrar = WindowSubsetRegistrar::new(self.io);
                let registrar = registrar.unwrap_or(&default_registrar);
                log::info!("Co-registering {} images to window {:?}", files.len(), window);
                coregister_series(registrar, &self.executor, files, window)?
            }
            None => files.to_vec(),
        };

        let series = ImageSeries::load(self.io, files.as_slice())?;

        log::info!("===============================================");
        log::info!("     Multi-temporal SAR Change Detection");
        log::info!("===============================================");
        log::info!("{}", chrono::Local::now().format("%a %b %e %H:%M:%S %Y"));
        log::info!("First (reference) filename:  {}", series.reference().display());
        log::info!("Number of images: {}", series.len());
        log::info!("Matrix layout: {}", series.dimension());
        log::info!("Equivalent number of looks: {}", self.params.enl);
        log::info!("Significance level: {}", self.params.significance);
        if self.params.median_filter {
            log::info!("Median filtering p-values before thresholding");
        }

        let maps = self.detect(&series)?;

        let base = ChangeMapWriter::output_base(reference, out_name);
        let writer = ChangeMapWriter::new(self.io, self.params.collision_policy);
        let paths = writer.write(&maps, &base, series.georef())?;

        log::info!("Total elapsed time: {:.2?}", start.elapsed());
        Ok(DetectionOutput {
            series,
            maps,
            paths,
        })
    }
}
