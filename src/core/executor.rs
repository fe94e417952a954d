//! Batch execution of independent tasks
//!
//! A batch either runs on the worker pool or, when the pool is unavailable or
//! anything in the parallel run fails, is recomputed sequentially from
//! scratch. The decision is taken once per batch; results of a failed
//! parallel run are discarded.

use crate::core::median::MedianFilter;
use crate::core::omnibus::{window_p_values, WindowTask};
use crate::io::raster::RasterIo;
use crate::types::{SarError, SarResult};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;

/// How batches are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    /// Worker pool with the given number of threads (all cores when `None`)
    Parallel { threads: Option<usize> },
    /// In-process, one task after another
    Sequential,
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        ExecutionStrategy::Parallel { threads: None }
    }
}

/// Runs batches of window tasks, optionally smoothing every p-value map
pub struct BatchExecutor {
    strategy: ExecutionStrategy,
    pool: Option<rayon::ThreadPool>,
    smoother: Option<MedianFilter>,
}

impl BatchExecutor {
    pub fn new(strategy: ExecutionStrategy, median_filter: bool) -> Self {
        let (strategy, pool) = match strategy {
            ExecutionStrategy::Parallel { threads } if cfg!(feature = "parallel") => {
                match build_pool(threads) {
                    Ok(pool) => {
                        log::info!("Worker pool ready with {} threads", pool.current_num_threads());
                        (strategy, Some(pool))
                    }
                    Err(e) => {
                        log::warn!("{}", e);
                        (strategy, None)
                    }
                }
            }
            ExecutionStrategy::Parallel { .. } => {
                log::warn!("Built without the parallel feature, running sequentially");
                (ExecutionStrategy::Sequential, None)
            }
            ExecutionStrategy::Sequential => (strategy, None),
        };

        Self {
            strategy,
            pool,
            smoother: median_filter.then(MedianFilter::p_value_smoother),
        }
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    pub fn smooths(&self) -> bool {
        self.smoother.is_some()
    }

    /// P-value maps for every task of a batch, in task order
    pub fn run_batch(&self, tasks: &[WindowTask], io: &dyn RasterIo) -> SarResult<Vec<Array2<f64>>> {
        let label = match tasks.first() {
            Some(task) => format!("batch ell={}", task.ell),
            None => return Ok(Vec::new()),
        };

        self.map_with_fallback(&label, tasks, |task| {
            let p_values = window_p_values(task, io)?;
            Ok(match &self.smoother {
                Some(filter) => filter.apply(&p_values),
                None => p_values,
            })
        })
    }

    /// Apply `f` to every item, on the pool if possible, else sequentially
    pub fn map_with_fallback<T, R, F>(&self, label: &str, items: &[T], f: F) -> SarResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> SarResult<R> + Sync,
    {
        if let ExecutionStrategy::Parallel { .. } = self.strategy {
            match self.run_parallel(items, &f) {
                Ok(results) => return Ok(results),
                Err(e) => {
                    log::warn!("{}: {}, recomputing sequentially", label, e);
                }
            }
        }

        items.iter().map(&f).collect()
    }

    fn run_parallel<T, R, F>(&self, items: &[T], f: &F) -> SarResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> SarResult<R> + Sync,
    {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| SarError::ParallelExecution("worker pool unavailable".to_string()))?;

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            pool.install(|| items.par_iter().map(f).collect::<SarResult<Vec<R>>>())
        }));

        match outcome {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(e)) => Err(SarError::ParallelExecution(e.to_string())),
            Err(_) => Err(SarError::ParallelExecution("a worker panicked".to_string())),
        }
    }
}

fn build_pool(threads: Option<usize>) -> SarResult<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = threads {
        builder = builder.num_threads(threads);
    }
    builder
        .build()
        .map_err(|e| SarError::ParallelExecution(format!("Failed to build worker pool: {}", e)))
}
