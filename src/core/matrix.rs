//! Per-pixel polarimetric matrices and their running window sums
//!
//! A Hermitian matrix of order p is stored as one real plane per diagonal
//! entry and one complex plane per distinct off-diagonal pair. Element names
//! follow the coherency matrix convention
//!
//! ```text
//!     | k      a      rho  |
//! T = | a*     xsi    b    |
//!     | rho*   b*     zeta |
//! ```

use crate::types::{MatrixDimension, SarError, SarResult, SpatialExtent};
use ndarray::{Array2, Zip};
use num_complex::Complex64;

/// Real-valued element plane (rows x cols)
pub type RealPlane = Array2<f64>;

/// Complex-valued element plane (rows x cols)
pub type ComplexPlane = Array2<Complex64>;

/// Matrix elements of one image, one plane per element
#[derive(Debug, Clone, PartialEq)]
pub enum PixelMatrix {
    Scalar {
        k: RealPlane,
    },
    DiagonalPair {
        k: RealPlane,
        xsi: RealPlane,
    },
    DiagonalTriple {
        k: RealPlane,
        xsi: RealPlane,
        zeta: RealPlane,
    },
    DualFull {
        k: RealPlane,
        a: ComplexPlane,
        xsi: RealPlane,
    },
    QuadFull {
        k: RealPlane,
        a: ComplexPlane,
        rho: ComplexPlane,
        xsi: RealPlane,
        b: ComplexPlane,
        zeta: RealPlane,
    },
}

impl PixelMatrix {
    pub fn dimension(&self) -> MatrixDimension {
        match self {
            Self::Scalar { .. } => MatrixDimension::Scalar,
            Self::DiagonalPair { .. } => MatrixDimension::DiagonalPair,
            Self::DiagonalTriple { .. } => MatrixDimension::DiagonalTriple,
            Self::DualFull { .. } => MatrixDimension::DualFull,
            Self::QuadFull { .. } => MatrixDimension::QuadFull,
        }
    }

    pub fn extent(&self) -> SpatialExtent {
        let k = match self {
            Self::Scalar { k }
            | Self::DiagonalPair { k, .. }
            | Self::DiagonalTriple { k, .. }
            | Self::DualFull { k, .. }
            | Self::QuadFull { k, .. } => k,
        };
        let (rows, cols) = k.dim();
        SpatialExtent::new(cols, rows)
    }

    /// Multiply every element by the equivalent number of looks
    pub fn scaled(&self, enl: f64) -> Self {
        let re = |x: &RealPlane| x.mapv(|v| v * enl);
        let cx = |x: &ComplexPlane| x.mapv(|v| v * enl);
        match self {
            Self::Scalar { k } => Self::Scalar { k: re(k) },
            Self::DiagonalPair { k, xsi } => Self::DiagonalPair { k: re(k), xsi: re(xsi) },
            Self::DiagonalTriple { k, xsi, zeta } => Self::DiagonalTriple {
                k: re(k),
                xsi: re(xsi),
                zeta: re(zeta),
            },
            Self::DualFull { k, a, xsi } => Self::DualFull {
                k: re(k),
                a: cx(a),
                xsi: re(xsi),
            },
            Self::QuadFull { k, a, rho, xsi, b, zeta } => Self::QuadFull {
                k: re(k),
                a: cx(a),
                rho: cx(rho),
                xsi: re(xsi),
                b: cx(b),
                zeta: re(zeta),
            },
        }
    }

    /// Element-wise sum of two matrices of the same layout and extent
    pub fn add(&self, other: &Self) -> SarResult<Self> {
        if self.extent() != other.extent() {
            return Err(SarError::Processing(format!(
                "Cannot sum matrices of extent {:?} and {:?}",
                self.extent(),
                other.extent()
            )));
        }

        let summed = match (self, other) {
            (Self::Scalar { k }, Self::Scalar { k: k2 }) => Self::Scalar { k: k + k2 },
            (Self::DiagonalPair { k, xsi }, Self::DiagonalPair { k: k2, xsi: xsi2 }) => {
                Self::DiagonalPair {
                    k: k + k2,
                    xsi: xsi + xsi2,
                }
            }
            (
                Self::DiagonalTriple { k, xsi, zeta },
                Self::DiagonalTriple { k: k2, xsi: xsi2, zeta: zeta2 },
            ) => Self::DiagonalTriple {
                k: k + k2,
                xsi: xsi + xsi2,
                zeta: zeta + zeta2,
            },
            (Self::DualFull { k, a, xsi }, Self::DualFull { k: k2, a: a2, xsi: xsi2 }) => {
                Self::DualFull {
                    k: k + k2,
                    a: a + a2,
                    xsi: xsi + xsi2,
                }
            }
            (
                Self::QuadFull { k, a, rho, xsi, b, zeta },
                Self::QuadFull {
                    k: k2,
                    a: a2,
                    rho: rho2,
                    xsi: xsi2,
                    b: b2,
                    zeta: zeta2,
                },
            ) => Self::QuadFull {
                k: k + k2,
                a: a + a2,
                rho: rho + rho2,
                xsi: xsi + xsi2,
                b: b + b2,
                zeta: zeta + zeta2,
            },
            _ => {
                return Err(SarError::Processing(format!(
                    "Cannot sum a {} matrix with a {} matrix",
                    self.dimension(),
                    other.dimension()
                )))
            }
        };
        Ok(summed)
    }

    /// Per-pixel determinant
    ///
    /// Diagonal-only layouts reduce to the product of the diagonal entries.
    pub fn determinant(&self) -> RealPlane {
        match self {
            Self::Scalar { k } => k.clone(),
            Self::DiagonalPair { k, xsi } => k * xsi,
            Self::DiagonalTriple { k, xsi, zeta } => {
                Zip::from(k).and(xsi).and(zeta).map_collect(|&k, &xsi, &zeta| k * xsi * zeta)
            }
            Self::DualFull { k, a, xsi } => {
                Zip::from(k).and(a).and(xsi).map_collect(|&k, &a, &xsi| det2_hermitian(k, a, xsi))
            }
            Self::QuadFull { k, a, rho, xsi, b, zeta } => {
                Array2::from_shape_fn(k.dim(), |idx| {
                    det3_hermitian(k[idx], a[idx], rho[idx], xsi[idx], b[idx], zeta[idx])
                })
            }
        }
    }
}

/// Determinant of the 2x2 Hermitian matrix [[k, a], [a*, xsi]]
#[inline]
pub fn det2_hermitian(k: f64, a: Complex64, xsi: f64) -> f64 {
    k * xsi - a.norm_sqr()
}

/// Determinant of the 3x3 Hermitian matrix [[k, a, rho], [a*, xsi, b], [rho*, b*, zeta]]
#[inline]
pub fn det3_hermitian(
    k: f64,
    a: Complex64,
    rho: Complex64,
    xsi: f64,
    b: Complex64,
    zeta: f64,
) -> f64 {
    k * xsi * zeta + 2.0 * (a * b * rho.conj()).re
        - xsi * rho.norm_sqr()
        - k * b.norm_sqr()
        - zeta * a.norm_sqr()
}

/// Running sum of scaled matrices over a contiguous window of images
///
/// Built by folding one image at a time; the sum before the most recent image
/// is kept so that the "all but last" determinant needs no subtraction.
#[derive(Debug, Clone)]
pub struct WindowSum {
    total: PixelMatrix,
    previous: Option<PixelMatrix>,
    last: PixelMatrix,
    count: usize,
}

/// The three determinants entering the likelihood ratio of a window
#[derive(Debug, Clone)]
pub struct WindowDeterminants {
    /// Determinant of the sum over the whole window
    pub sum_full: RealPlane,
    /// Determinant of the sum over all images except the last
    pub sum_minus_last: RealPlane,
    /// Determinant of the last image alone
    pub last: RealPlane,
}

impl WindowSum {
    /// Start a window with its first (already scaled) image
    pub fn start(first: PixelMatrix) -> Self {
        Self {
            total: first.clone(),
            previous: None,
            last: first,
            count: 1,
        }
    }

    /// Add the next (already scaled) image of the window
    pub fn push(self, next: PixelMatrix) -> SarResult<Self> {
        let total = self.total.add(&next)?;
        Ok(Self {
            total,
            previous: Some(self.total),
            last: next,
            count: self.count + 1,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn dimension(&self) -> MatrixDimension {
        self.total.dimension()
    }

    pub fn total(&self) -> &PixelMatrix {
        &self.total
    }

    /// Raw (unclamped) determinants; requires at least two images
    pub fn determinants(&self) -> SarResult<WindowDeterminants> {
        let previous = self.previous.as_ref().ok_or_else(|| {
            SarError::Processing("A change window needs at least two images".to_string())
        })?;

        Ok(WindowDeterminants {
            sum_full: self.total.determinant(),
            sum_minus_last: previous.determinant(),
            last: self.last.determinant(),
        })
    }
}
