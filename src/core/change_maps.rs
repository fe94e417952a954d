//! Change maps from the p-value archive
//!
//! Pixels are scanned sequentially: starting from baseline ell = 0, a pixel
//! whose window (ell, j) is significant registers a change at image j + 1
//! and moves its baseline there. Later tests for that pixel only count while
//! ell equals its current baseline. The scan order (ell ascending, then j
//! ascending) therefore matters.

use crate::core::archive::PValueArchive;
use crate::types::{SarError, SarResult, SpatialExtent};
use ndarray::{Array2, Array3, Axis, Zip};

/// Outputs of the sequential change scan
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMaps {
    /// Image index of the most recent change (0 = none)
    pub cmap: Array2<u8>,
    /// Image index of the first change (0 = none)
    pub smap: Array2<u8>,
    /// Number of changes
    pub fmap: Array2<u8>,
    /// Change indicator per interval, shape (k-1, rows, cols)
    pub bmap: Array3<bool>,
}

impl ChangeMaps {
    fn empty(intervals: usize, extent: SpatialExtent) -> Self {
        let shape = extent.shape();
        Self {
            cmap: Array2::zeros(shape),
            smap: Array2::zeros(shape),
            fmap: Array2::zeros(shape),
            bmap: Array3::from_elem((intervals, shape.0, shape.1), false),
        }
    }

    pub fn intervals(&self) -> usize {
        self.bmap.len_of(Axis(0))
    }

    /// Bitemporal map as byte bands, 255 where a change was detected
    pub fn bitemporal_bands(&self) -> Vec<Array2<u8>> {
        self.bmap
            .axis_iter(Axis(0))
            .map(|band| band.mapv(|changed| if changed { 255 } else { 0 }))
            .collect()
    }

    /// Number of pixels with at least one change
    pub fn changed_pixels(&self) -> usize {
        self.fmap.iter().filter(|&&count| count > 0).count()
    }
}

/// Thresholds the archive and runs the sequential scan
#[derive(Debug, Clone, Copy)]
pub struct ChangeMapBuilder {
    significance: f64,
}

impl ChangeMapBuilder {
    pub fn new(significance: f64) -> Self {
        Self { significance }
    }

    pub fn build(&self, archive: &PValueArchive) -> SarResult<ChangeMaps> {
        let intervals = archive.intervals();
        if intervals > u8::MAX as usize {
            return Err(SarError::Processing(format!(
                "Byte change maps hold at most {} intervals, series has {}",
                u8::MAX,
                intervals
            )));
        }

        let mut maps = ChangeMaps::empty(intervals, archive.extent());
        let significance = self.significance;

        for ell in 0..intervals {
            for j in ell..intervals {
                let p_values = archive.load(ell, j)?;
                let change_index = (j + 1) as u8;
                let baseline = ell as u8;

                Zip::from(&p_values)
                    .and(&mut maps.cmap)
                    .and(&mut maps.smap)
                    .and(&mut maps.fmap)
                    .and(maps.bmap.index_axis_mut(Axis(0), j))
                    .for_each(|&p, cmap, smap, fmap, bmap| {
                        let significant = p <= significance;
                        let first_ever = significant && *cmap == 0;
                        if significant && *cmap == baseline {
                            *fmap += 1;
                            *cmap = change_index;
                            *bmap = true;
                        }
                        if first_ever {
                            *smap = change_index;
                        }
                    });
            }
        }

        log::info!(
            "Change maps: {} of {} pixels changed at significance {}",
            maps.changed_pixels(),
            archive.extent().pixel_count(),
            significance
        );
        Ok(maps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::archive::ArchiveBacking;

    fn archive_from(image_count: usize, p_values: &[((usize, usize), Array2<f64>)]) -> PValueArchive {
        let (rows, cols) = p_values[0].1.dim();
        let mut archive = PValueArchive::new(
            image_count,
            SpatialExtent::new(cols, rows),
            ArchiveBacking::Heap,
            None,
        )
        .unwrap();
        for ((ell, j), map) in p_values {
            archive.store(*ell, *j, map).unwrap();
        }
        archive
    }

    fn uniform(p: f64) -> Array2<f64> {
        Array2::from_elem((2, 3), p)
    }

    #[test]
    fn test_single_change_then_stable() {
        // k = 3: change at image 1, nothing after
        let archive = archive_from(
            3,
            &[((0, 0), uniform(0.001)), ((0, 1), uniform(0.5)), ((1, 1), uniform(0.5))],
        );
        let maps = ChangeMapBuilder::new(0.01).build(&archive).unwrap();

        assert!(maps.cmap.iter().all(|&v| v == 1));
        assert!(maps.smap.iter().all(|&v| v == 1));
        assert!(maps.fmap.iter().all(|&v| v == 1));
        assert!(maps.bmap.index_axis(Axis(0), 0).iter().all(|&b| b));
        assert!(maps.bmap.index_axis(Axis(0), 1).iter().all(|&b| !b));
    }

    #[test]
    fn test_changes_follow_moving_baseline() {
        // k = 4: changes at images 1 and 3
        let archive = archive_from(
            4,
            &[
                ((0, 0), uniform(0.001)),
                ((0, 1), uniform(0.2)),
                ((0, 2), uniform(0.001)),
                ((1, 1), uniform(0.6)),
                ((1, 2), uniform(0.004)),
                ((2, 2), uniform(0.9)),
            ],
        );
        let maps = ChangeMapBuilder::new(0.01).build(&archive).unwrap();

        // (0,2) is significant but the pixel already moved to baseline 1
        assert!(maps.cmap.iter().all(|&v| v == 3));
        assert!(maps.smap.iter().all(|&v| v == 1));
        assert!(maps.fmap.iter().all(|&v| v == 2));
        let bands = maps.bitemporal_bands();
        assert_eq!(bands.len(), 3);
        assert!(bands[0].iter().all(|&v| v == 255));
        assert!(bands[1].iter().all(|&v| v == 0));
        assert!(bands[2].iter().all(|&v| v == 255));
    }

    #[test]
    fn test_first_change_recorded_under_later_baseline() {
        // Never changed relative to baseline 0, significant relative to baseline 1:
        // only the first-change map is updated because the pixel never left baseline 0
        let archive = archive_from(
            3,
            &[((0, 0), uniform(0.5)), ((0, 1), uniform(0.5)), ((1, 1), uniform(0.001))],
        );
        let maps = ChangeMapBuilder::new(0.01).build(&archive).unwrap();

        assert!(maps.cmap.iter().all(|&v| v == 0));
        assert!(maps.fmap.iter().all(|&v| v == 0));
        assert!(maps.smap.iter().all(|&v| v == 2));
        assert_eq!(maps.changed_pixels(), 0);
    }

    #[test]
    fn test_no_change_leaves_maps_empty() {
        let archive = archive_from(
            3,
            &[((0, 0), uniform(1.0)), ((0, 1), uniform(1.0)), ((1, 1), uniform(1.0))],
        );
        let maps = ChangeMapBuilder::new(0.01).build(&archive).unwrap();
        assert!(maps.cmap.iter().all(|&v| v == 0));
        assert!(maps.smap.iter().all(|&v| v == 0));
        assert!(maps.fmap.iter().all(|&v| v == 0));
        assert!(maps.bmap.iter().all(|&b| !b));
        assert_eq!(maps.intervals(), 2);
    }

    #[test]
    fn test_threshold_is_inclusive_and_per_pixel() {
        let mut first = uniform(0.5);
        first[[0, 0]] = 0.01;
        first[[1, 2]] = f64::NAN;
        let archive = archive_from(2, &[((0, 0), first)]);
        let maps = ChangeMapBuilder::new(0.01).build(&archive).unwrap();

        assert_eq!(maps.cmap[[0, 0]], 1);
        assert_eq!(maps.cmap[[0, 1]], 0);
        assert_eq!(maps.cmap[[1, 2]], 0);
        assert_eq!(maps.changed_pixels(), 1);
    }

    #[test]
    fn test_incomplete_archive_fails() {
        let archive = archive_from(3, &[((0, 0), uniform(0.5))]);
        assert!(ChangeMapBuilder::new(0.01).build(&archive).is_err());
    }
}
