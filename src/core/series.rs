use crate::io::raster::RasterIo;
use crate::types::{GeoReference, MatrixDimension, SarError, SarResult, SpatialExtent};
use std::path::{Path, PathBuf};

/// Ordered acquisitions sharing extent and matrix layout
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSeries {
    files: Vec<PathBuf>,
    dimension: MatrixDimension,
    extent: SpatialExtent,
    georef: GeoReference,
}

impl ImageSeries {
    /// Read metadata of every image and check that the series is consistent
    ///
    /// The first image is the reference: its extent and band count fix those of
    /// the series and its georeferencing is carried to the outputs.
    pub fn load<P: AsRef<Path>>(io: &dyn RasterIo, files: &[P]) -> SarResult<Self> {
        if files.len() < 2 {
            return Err(SarError::Usage(format!(
                "At least two images are needed for change detection, got {}",
                files.len()
            )));
        }

        let files: Vec<PathBuf> = files.iter().map(|f| f.as_ref().to_path_buf()).collect();
        let reference = io.info(&files[0])?;
        let dimension = MatrixDimension::from_band_count(reference.bands)?;

        for file in &files[1..] {
            let info = io.info(file)?;
            if info.extent != reference.extent {
                return Err(SarError::InvalidFormat(format!(
                    "{} is {}x{} pixels, reference is {}x{}",
                    file.display(),
                    info.extent.cols,
                    info.extent.rows,
                    reference.extent.cols,
                    reference.extent.rows
                )));
            }
            if info.bands != reference.bands {
                return Err(SarError::InvalidFormat(format!(
                    "{} has {} bands, reference has {}",
                    file.display(),
                    info.bands,
                    reference.bands
                )));
            }
        }

        log::debug!(
            "Loaded series of {} {} images, {}x{} pixels",
            files.len(),
            dimension,
            reference.extent.cols,
            reference.extent.rows
        );

        Ok(Self {
            files,
            dimension,
            extent: reference.extent,
            georef: reference.georef,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn reference(&self) -> &Path {
        &self.files[0]
    }

    pub fn dimension(&self) -> MatrixDimension {
        self.dimension
    }

    pub fn extent(&self) -> SpatialExtent {
        self.extent
    }

    pub fn georef(&self) -> &GeoReference {
        &self.georef
    }
}
