//! Polarimetric matrix reader
//!
//! Band layout of the multiband input rasters:
//!
//! | bands | layout                                                          |
//! |-------|-----------------------------------------------------------------|
//! | 9     | T11, T12re, T12im, T13re, T13im, T22, T23re, T23im, T33         |
//! | 4     | C11, C12re, C12im, C22                                          |
//! | 3     | T11, T22, T33                                                   |
//! | 2     | C11, C22                                                        |
//! | 1     | C11                                                             |

use crate::core::matrix::{ComplexPlane, PixelMatrix, RealPlane};
use crate::io::raster::RasterIo;
use crate::types::{MatrixDimension, SarResult, SpatialExtent};
use ndarray::Zip;
use num_complex::Complex64;
use std::path::Path;

/// Reads the matrix elements of one image
pub struct MatrixReader<'a> {
    io: &'a dyn RasterIo,
    dimension: MatrixDimension,
    extent: SpatialExtent,
}

impl<'a> MatrixReader<'a> {
    pub fn new(io: &'a dyn RasterIo, dimension: MatrixDimension, extent: SpatialExtent) -> Self {
        Self {
            io,
            dimension,
            extent,
        }
    }

    /// Read all matrix elements of the image at `path`
    pub fn read(&self, path: &Path) -> SarResult<PixelMatrix> {
        log::debug!("Reading {} matrix from {}", self.dimension, path.display());

        let matrix = match self.dimension {
            MatrixDimension::Scalar => PixelMatrix::Scalar {
                k: self.real(path, 1)?,
            },
            MatrixDimension::DiagonalPair => PixelMatrix::DiagonalPair {
                k: self.real(path, 1)?,
                xsi: self.real(path, 2)?,
            },
            MatrixDimension::DiagonalTriple => PixelMatrix::DiagonalTriple {
                k: self.real(path, 1)?,
                xsi: self.real(path, 2)?,
                zeta: self.real(path, 3)?,
            },
            MatrixDimension::DualFull => PixelMatrix::DualFull {
                k: self.real(path, 1)?,
                a: self.complex(path, 2)?,
                xsi: self.real(path, 4)?,
            },
            MatrixDimension::QuadFull => PixelMatrix::QuadFull {
                k: self.real(path, 1)?,
                a: self.complex(path, 2)?,
                rho: self.complex(path, 4)?,
                xsi: self.real(path, 6)?,
                b: self.complex(path, 7)?,
                zeta: self.real(path, 9)?,
            },
        };

        Ok(matrix)
    }

    fn real(&self, path: &Path, band: usize) -> SarResult<RealPlane> {
        self.io.read_band(path, band, self.extent.full_window())
    }

    /// Pair band `re_band` with the imaginary part in the following band
    fn complex(&self, path: &Path, re_band: usize) -> SarResult<ComplexPlane> {
        let re = self.real(path, re_band)?;
        let im = self.real(path, re_band + 1)?;
        Ok(Zip::from(&re)
            .and(&im)
            .map_collect(|&re, &im| Complex64::new(re, im)))
    }
}
