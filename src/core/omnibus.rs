//! Sequential omnibus likelihood-ratio test for a window of images
//!
//! For a window of j images with scaled matrix sums, the test of "no change
//! at the last image given no change before it" has log-likelihood ratio
//!
//! ```text
//! ln R_j = n ( p (j ln j - (j-1) ln(j-1)) + (j-1) ln|S_{j-1}| + ln|X_j| - j ln|S_j| )
//! ```
//!
//! and -2 rho_j ln R_j is distributed as a two-term chi-square mixture
//! (Conradsen et al. 2016, IEEE TGRS 54(5)).

use crate::core::matrix::{RealPlane, WindowDeterminants, WindowSum};
use crate::io::matrix_reader::MatrixReader;
use crate::io::raster::RasterIo;
use crate::types::{MatrixDimension, SarError, SarResult, SpatialExtent};
use ndarray::Zip;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::path::PathBuf;

/// Smallest determinant allowed into a logarithm
pub const DETERMINANT_FLOOR: f64 = f64::MIN_POSITIVE;

/// One independent test: the images of window [ell..=j+1] of the series
#[derive(Debug, Clone, PartialEq)]
pub struct WindowTask {
    /// Index of the first image (the baseline)
    pub ell: usize,
    /// Index of the change interval tested, the window ends at image j + 1
    pub j: usize,
    pub files: Vec<PathBuf>,
    /// Equivalent number of looks
    pub enl: f64,
    pub dimension: MatrixDimension,
    pub extent: SpatialExtent,
}

impl WindowTask {
    /// Number of images in the window
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Distribution-shape correction for the chi-square approximation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxCorrection {
    pub rho: f64,
    pub omega2: f64,
    /// Degrees of freedom of the leading chi-square term
    pub dof: f64,
}

impl BoxCorrection {
    /// Correction for a window of `window_len` images
    ///
    /// Diagonal-only layouts are an approximation without off-diagonal terms:
    /// no correction is applied and the degrees of freedom equal the band count.
    pub fn new(dimension: MatrixDimension, window_len: usize, enl: f64) -> Self {
        if dimension.is_approximate() {
            return Self {
                rho: 1.0,
                omega2: 0.0,
                dof: dimension.band_count() as f64,
            };
        }

        let p = dimension.order() as f64;
        let p2 = p * p;
        let j = window_len as f64;
        let n = enl;

        let rho = 1.0 - (2.0 * p2 - 1.0) * (1.0 + 1.0 / (j * (j - 1.0))) / (6.0 * p * n);
        let omega2 = -(p2 / 4.0) * (1.0 - 1.0 / rho).powi(2)
            + (1.0 / (24.0 * n * n)) * p2 * (p2 - 1.0)
                * (1.0 + (2.0 * j - 1.0) / (j * (j - 1.0)).powi(2))
                / rho.powi(2);

        Self { rho, omega2, dof: p2 }
    }
}

/// Replace degenerate determinants by a small positive value
///
/// NaN becomes zero and infinities become the largest finite values before
/// anything at or below [`DETERMINANT_FLOOR`] is raised to it.
#[inline]
pub fn clamp_determinant(det: f64) -> f64 {
    let det = if det.is_nan() {
        0.0
    } else if det == f64::INFINITY {
        f64::MAX
    } else {
        det
    };
    if det <= DETERMINANT_FLOOR {
        DETERMINANT_FLOOR
    } else {
        det
    }
}

/// x ln x with the limit 0 at x = 0
#[inline]
fn x_ln_x(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x * x.ln()
    }
}

/// Per-pixel ln R_j from the window determinants
pub fn log_likelihood_ratio(
    dets: &WindowDeterminants,
    window_len: usize,
    order: usize,
    enl: f64,
) -> RealPlane {
    let j = window_len as f64;
    let p = order as f64;
    let constant = p * (x_ln_x(j) - x_ln_x(j - 1.0));

    Zip::from(&dets.sum_full)
        .and(&dets.sum_minus_last)
        .and(&dets.last)
        .map_collect(|&full, &minus_last, &last| {
            let ln_full = clamp_determinant(full).ln();
            let ln_minus_last = clamp_determinant(minus_last).ln();
            let ln_last = clamp_determinant(last).ln();
            enl * (constant + (j - 1.0) * ln_minus_last + ln_last - j * ln_full)
        })
}

/// Chi-square mixture used to turn the test statistic into p-values
#[derive(Debug, Clone)]
pub struct PValueDistribution {
    correction: BoxCorrection,
    leading: ChiSquared,
    trailing: ChiSquared,
}

impl PValueDistribution {
    pub fn new(correction: BoxCorrection) -> SarResult<Self> {
        let chi2 = |dof: f64| {
            ChiSquared::new(dof).map_err(|e| {
                SarError::Processing(format!("Invalid chi-square degrees of freedom {}: {}", dof, e))
            })
        };
        Ok(Self {
            leading: chi2(correction.dof)?,
            trailing: chi2(correction.dof + 4.0)?,
            correction,
        })
    }

    /// Test statistic Z = -2 rho ln R
    pub fn statistic(&self, ln_r: f64) -> f64 {
        -2.0 * self.correction.rho * ln_r
    }

    /// Probability of a statistic at least as large as `z` under no change
    pub fn p_value(&self, z: f64) -> f64 {
        let omega2 = self.correction.omega2;
        let cdf = (1.0 - omega2) * self.leading.cdf(z) + omega2 * self.trailing.cdf(z);
        (1.0 - cdf).clamp(0.0, 1.0)
    }
}

/// P-values of a window whose scaled matrix sum has been accumulated
pub fn p_values_from_sum(window: &WindowSum, enl: f64) -> SarResult<RealPlane> {
    let dimension = window.dimension();
    let dets = window.determinants()?;
    let ln_r = log_likelihood_ratio(&dets, window.len(), dimension.order(), enl);
    let distribution = PValueDistribution::new(BoxCorrection::new(dimension, window.len(), enl))?;

    Ok(ln_r.mapv(|v| distribution.p_value(distribution.statistic(v))))
}

/// Read, scale and accumulate the images of a window, then test it
pub fn window_p_values(task: &WindowTask, io: &dyn RasterIo) -> SarResult<RealPlane> {
    if task.len() < 2 {
        return Err(SarError::Processing(format!(
            "Window ({}, {}) has {} image(s), at least two are required",
            task.ell,
            task.j,
            task.len()
        )));
    }
    log::debug!("Testing window ell={} j={} ({} images)", task.ell, task.j, task.len());

    let reader = MatrixReader::new(io, task.dimension, task.extent);
    let (first, rest) = task
        .files
        .split_first()
        .ok_or_else(|| SarError::Processing("Empty window".to_string()))?;

    let start = WindowSum::start(reader.read(first)?.scaled(task.enl));
    let window = rest.iter().try_fold(start, |window, path| {
        window.push(reader.read(path)?.scaled(task.enl))
    })?;

    p_values_from_sum(&window, task.enl)
}
