use crate::types::{SarError, SarResult};
use ndarray::Array2;

/// Square median filter with mirrored image borders
///
/// Used as an optional smoothing step on p-value maps before thresholding.
/// This is a heuristic: neighboring p-values are not independent, so the
/// smoothed values no longer follow the test distribution exactly.
#[derive(Debug, Clone, Copy)]
pub struct MedianFilter {
    window_size: usize,
}

impl MedianFilter {
    /// Create a filter with an odd window size
    pub fn new(window_size: usize) -> SarResult<Self> {
        if window_size == 0 || window_size % 2 == 0 {
            return Err(SarError::Processing(format!(
                "Median window size must be odd, got {}",
                window_size
            )));
        }
        Ok(Self { window_size })
    }

    /// The 3x3 filter applied to p-value maps
    pub fn p_value_smoother() -> Self {
        Self { window_size: 3 }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Apply the filter, returning a new image of the same shape
    pub fn apply(&self, image: &Array2<f64>) -> Array2<f64> {
        let (height, width) = image.dim();
        let half_window = (self.window_size / 2) as isize;
        let mut window_values = Vec::with_capacity(self.window_size * self.window_size);

        let mut filtered = Array2::zeros((height, width));
        for i in 0..height {
            for j in 0..width {
                window_values.clear();
                for di in -half_window..=half_window {
                    let ii = mirror(i as isize + di, height);
                    for dj in -half_window..=half_window {
                        let jj = mirror(j as isize + dj, width);
                        window_values.push(image[[ii, jj]]);
                    }
                }

                let mid = window_values.len() / 2;
                let (_, median, _) = window_values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
                filtered[[i, j]] = *median;
            }
        }

        filtered
    }
}

/// Reflect an out-of-range index back into 0..len, repeating the edge sample
fn mirror(index: isize, len: usize) -> usize {
    let len = len as isize;
    let mut index = index;
    while index < 0 || index >= len {
        if index < 0 {
            index = -index - 1;
        } else {
            index = 2 * len - index - 1;
        }
    }
    index as usize
}
