//! Triangular store of p-value maps
//!
//! Slot (ell, j) holds the p-values of the window starting at image ell and
//! ending at image j + 1, for 0 <= ell <= j <= k - 2. The store is sized
//! (k-1) x (k-1) x rows x cols f64 values and is normally backed by a
//! memory-mapped scratch file so that long series of large rasters do not have
//! to fit in RAM.

use crate::types::{SarError, SarResult, SpatialExtent};
use memmap2::{MmapMut, MmapOptions};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

const VALUE_SIZE: usize = std::mem::size_of::<f64>();

/// Where the archive keeps its values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArchiveBacking {
    /// Ordinary heap allocation
    Heap,
    /// Anonymous scratch file mapped into memory
    #[default]
    MemoryMapped,
}

enum Storage {
    Heap(Vec<u8>),
    Mapped { map: MmapMut, _file: File },
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Heap(buffer) => buffer.as_slice(),
            Storage::Mapped { map, .. } => &map[..],
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Heap(buffer) => buffer.as_mut_slice(),
            Storage::Mapped { map, .. } => &mut map[..],
        }
    }
}

/// P-values of every tested window, indexed by (ell, j)
pub struct PValueArchive {
    storage: Storage,
    intervals: usize,
    extent: SpatialExtent,
    written: Vec<bool>,
}

impl PValueArchive {
    /// Allocate an archive for a series of `image_count` images
    pub fn new(
        image_count: usize,
        extent: SpatialExtent,
        backing: ArchiveBacking,
        scratch_dir: Option<&Path>,
    ) -> SarResult<Self> {
        if image_count < 2 {
            return Err(SarError::Processing(format!(
                "A p-value archive needs at least two images, got {}",
                image_count
            )));
        }
        if extent.pixel_count() == 0 {
            return Err(SarError::Processing("Cannot archive an empty raster".to_string()));
        }

        let intervals = image_count - 1;
        let byte_len = intervals * intervals * extent.pixel_count() * VALUE_SIZE;
        log::debug!(
            "Allocating {:?} p-value archive: {} slots, {:.1} MB",
            backing,
            intervals * intervals,
            byte_len as f64 / (1024.0 * 1024.0)
        );

        let storage = match backing {
            ArchiveBacking::Heap => Storage::Heap(vec![0u8; byte_len]),
            ArchiveBacking::MemoryMapped => {
                let file = match scratch_dir {
                    Some(dir) => tempfile::tempfile_in(dir)?,
                    None => tempfile::tempfile()?,
                };
                file.set_len(byte_len as u64)?;
                // The scratch file is private to this archive and never resized
                let map = unsafe { MmapOptions::new().len(byte_len).map_mut(&file)? };
                Storage::Mapped { map, _file: file }
            }
        };

        Ok(Self {
            storage,
            intervals,
            extent,
            written: vec![false; intervals * intervals],
        })
    }

    /// Number of change intervals, k - 1
    pub fn intervals(&self) -> usize {
        self.intervals
    }

    pub fn extent(&self) -> SpatialExtent {
        self.extent
    }

    pub fn is_written(&self, ell: usize, j: usize) -> bool {
        self.slot(ell, j).map(|slot| self.written[slot]).unwrap_or(false)
    }

    /// True once every slot with ell <= j has been stored
    pub fn is_complete(&self) -> bool {
        (0..self.intervals).all(|ell| (ell..self.intervals).all(|j| self.is_written(ell, j)))
    }

    fn slot(&self, ell: usize, j: usize) -> SarResult<usize> {
        if ell > j || j >= self.intervals {
            return Err(SarError::Processing(format!(
                "No p-value slot ({}, {}) for {} intervals",
                ell, j, self.intervals
            )));
        }
        Ok(ell * self.intervals + j)
    }

    fn byte_range(&self, slot: usize) -> std::ops::Range<usize> {
        let slot_len = self.extent.pixel_count() * VALUE_SIZE;
        slot * slot_len..(slot + 1) * slot_len
    }

    /// Store the p-value map of window (ell, j)
    pub fn store(&mut self, ell: usize, j: usize, p_values: &Array2<f64>) -> SarResult<()> {
        let slot = self.slot(ell, j)?;
        if p_values.dim() != self.extent.shape() {
            return Err(SarError::Processing(format!(
                "P-value map of shape {:?} does not match archive shape {:?}",
                p_values.dim(),
                self.extent.shape()
            )));
        }

        let range = self.byte_range(slot);
        let bytes = &mut self.storage.bytes_mut()[range];
        for (chunk, value) in bytes.chunks_exact_mut(VALUE_SIZE).zip(p_values.iter()) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        self.written[slot] = true;
        Ok(())
    }

    /// P-value map of window (ell, j); the slot must have been stored
    pub fn load(&self, ell: usize, j: usize) -> SarResult<Array2<f64>> {
        let slot = self.slot(ell, j)?;
        if !self.written[slot] {
            return Err(SarError::Processing(format!(
                "P-value slot ({}, {}) was never computed",
                ell, j
            )));
        }

        let values: Vec<f64> = self.storage.bytes()[self.byte_range(slot)]
            .chunks_exact(VALUE_SIZE)
            .map(|chunk| {
                let mut raw = [0u8; VALUE_SIZE];
                raw.copy_from_slice(chunk);
                f64::from_ne_bytes(raw)
            })
            .collect();

        Array2::from_shape_vec(self.extent.shape(), values)
            .map_err(|e| SarError::Processing(format!("Failed to reshape p-values: {}", e)))
    }
}

impl std::fmt::Debug for PValueArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PValueArchive")
            .field("intervals", &self.intervals)
            .field("extent", &self.extent)
            .field("written", &self.written.iter().filter(|w| **w).count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: f64) -> Array2<f64> {
        Array2::from_shape_fn((3, 4), |(r, c)| value + (r * 4 + c) as f64 * 1e-3)
    }

    #[test]
    fn test_store_and_load_mapped() {
        let mut archive =
            PValueArchive::new(4, SpatialExtent::new(4, 3), ArchiveBacking::MemoryMapped, None)
                .unwrap();
        assert_eq!(archive.intervals(), 3);

        archive.store(0, 2, &map(0.25)).unwrap();
        archive.store(1, 1, &map(0.5)).unwrap();

        assert_eq!(archive.load(0, 2).unwrap(), map(0.25));
        assert_eq!(archive.load(1, 1).unwrap(), map(0.5));
        assert!(archive.is_written(0, 2));
        assert!(!archive.is_written(0, 0));
        assert!(!archive.is_complete());
    }

    #[test]
    fn test_lower_triangle_is_rejected() {
        let mut archive =
            PValueArchive::new(3, SpatialExtent::new(4, 3), ArchiveBacking::Heap, None).unwrap();
        assert!(archive.store(1, 0, &map(0.1)).is_err());
        assert!(archive.load(1, 0).is_err());
        assert!(archive.store(0, 2, &map(0.1)).is_err());
        assert!(!archive.is_written(1, 0));
    }

    #[test]
    fn test_unwritten_slot_cannot_be_read() {
        let archive =
            PValueArchive::new(3, SpatialExtent::new(4, 3), ArchiveBacking::Heap, None).unwrap();
        assert!(archive.load(0, 0).is_err());
    }

    #[test]
    fn test_complete_after_all_upper_slots() {
        let mut archive =
            PValueArchive::new(3, SpatialExtent::new(4, 3), ArchiveBacking::Heap, None).unwrap();
        for (ell, j) in [(0, 0), (0, 1), (1, 1)] {
            archive.store(ell, j, &map(0.9)).unwrap();
        }
        assert!(archive.is_complete());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut archive =
            PValueArchive::new(2, SpatialExtent::new(4, 3), ArchiveBacking::Heap, None).unwrap();
        assert!(archive.store(0, 0, &Array2::zeros((4, 3))).is_err());
    }

    #[test]
    fn test_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = PValueArchive::new(
            2,
            SpatialExtent::new(4, 3),
            ArchiveBacking::MemoryMapped,
            Some(dir.path()),
        )
        .unwrap();
        archive.store(0, 0, &map(0.0)).unwrap();
        assert_eq!(archive.load(0, 0).unwrap(), map(0.0));
    }

    #[test]
    fn test_too_few_images() {
        assert!(PValueArchive::new(1, SpatialExtent::new(4, 3), ArchiveBacking::Heap, None).is_err());
    }
}
