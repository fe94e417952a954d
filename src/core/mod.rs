//! Change detection modules

pub mod matrix;
pub mod omnibus;
pub mod series;
pub mod archive;
pub mod schedule;
pub mod executor;
pub mod median;
pub mod change_maps;
pub mod detector;

// Re-export main types
pub use matrix::{PixelMatrix, WindowSum, WindowDeterminants};
pub use omnibus::{window_p_values, BoxCorrection, PValueDistribution, WindowTask};
pub use series::ImageSeries;
pub use archive::{ArchiveBacking, PValueArchive};
pub use schedule::{window_pairs, WindowOrchestrator};
pub use executor::{BatchExecutor, ExecutionStrategy};
pub use median::MedianFilter;
pub use change_maps::{ChangeMapBuilder, ChangeMaps};
pub use detector::{DetectionOutput, DetectorParams, SequentialChangeDetector};
