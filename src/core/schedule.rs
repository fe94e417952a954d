//! Triangular window schedule
//!
//! For k images, every baseline ell in 0..=k-2 is tested against every end
//! j in ell..=k-2, i.e. the window of images ell..=j+1. All tasks with the
//! same baseline form one batch.

use crate::core::archive::PValueArchive;
use crate::core::executor::BatchExecutor;
use crate::core::omnibus::WindowTask;
use crate::core::series::ImageSeries;
use crate::io::raster::RasterIo;
use crate::types::{SarError, SarResult};

/// All (ell, j) pairs tested for a series of `image_count` images
pub fn window_pairs(image_count: usize) -> Vec<(usize, usize)> {
    let intervals = image_count.saturating_sub(1);
    (0..intervals)
        .flat_map(|ell| (ell..intervals).map(move |j| (ell, j)))
        .collect()
}

/// Builds window tasks for a series and fills the p-value archive
pub struct WindowOrchestrator<'a> {
    series: &'a ImageSeries,
    enl: f64,
}

impl<'a> WindowOrchestrator<'a> {
    pub fn new(series: &'a ImageSeries, enl: f64) -> Self {
        Self { series, enl }
    }

    /// Task for window (ell, j)
    pub fn task(&self, ell: usize, j: usize) -> SarResult<WindowTask> {
        let intervals = self.series.len() - 1;
        if ell > j || j >= intervals {
            return Err(SarError::Processing(format!(
                "Window ({}, {}) outside the schedule of {} intervals",
                ell, j, intervals
            )));
        }

        Ok(WindowTask {
            ell,
            j,
            files: self.series.files()[ell..=j + 1].to_vec(),
            enl: self.enl,
            dimension: self.series.dimension(),
            extent: self.series.extent(),
        })
    }

    /// All tasks sharing baseline `ell`, in ascending j
    pub fn batch(&self, ell: usize) -> SarResult<Vec<WindowTask>> {
        let intervals = self.series.len() - 1;
        (ell..intervals).map(|j| self.task(ell, j)).collect()
    }

    /// Compute every window and store its p-values in `archive`
    pub fn fill(
        &self,
        executor: &BatchExecutor,
        io: &dyn RasterIo,
        archive: &mut PValueArchive,
    ) -> SarResult<()> {
        let intervals = self.series.len() - 1;
        if archive.intervals() != intervals || archive.extent() != self.series.extent() {
            return Err(SarError::Processing(format!(
                "Archive sized for {} intervals of {:?} cannot hold series of {} images of {:?}",
                archive.intervals(),
                archive.extent(),
                self.series.len(),
                self.series.extent()
            )));
        }

        for ell in 0..intervals {
            let tasks = self.batch(ell)?;
            log::info!("Computing p-values for baseline {} of {} ({} windows)", ell + 1, intervals, tasks.len());

            let p_values = executor.run_batch(&tasks, io)?;
            for (task, map) in tasks.iter().zip(p_values.iter()) {
                archive.store(task.ell, task.j, map)?;
            }
        }

        Ok(())
    }
}
