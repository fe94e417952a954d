use crate::io::raster::RasterIo;
use crate::types::{GeoReference, PixelWindow, RasterInfo, SarError, SarResult, SpatialExtent};
use ndarray::{s, Array2};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Raster held in memory, one plane per band
#[derive(Debug, Clone)]
pub struct StoredRaster {
    pub bands: Vec<Array2<f64>>,
    pub georef: GeoReference,
}

impl StoredRaster {
    pub fn new(bands: Vec<Array2<f64>>) -> Self {
        Self {
            bands,
            georef: GeoReference::default(),
        }
    }

    pub fn with_georef(mut self, georef: GeoReference) -> Self {
        self.georef = georef;
        self
    }

    fn extent(&self) -> SpatialExtent {
        self.bands
            .first()
            .map(|b| SpatialExtent::new(b.ncols(), b.nrows()))
            .unwrap_or_else(|| SpatialExtent::new(0, 0))
    }
}

/// In-process raster store keyed by path
#[derive(Debug, Default)]
pub struct MemoryRaster {
    rasters: RwLock<HashMap<PathBuf, StoredRaster>>,
}

impl MemoryRaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, raster: StoredRaster) {
        if let Ok(mut rasters) = self.rasters.write() {
            rasters.insert(path.into(), raster);
        }
    }

    pub fn get(&self, path: &Path) -> Option<StoredRaster> {
        self.rasters.read().ok()?.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.rasters
            .read()
            .map(|rasters| {
                let mut paths: Vec<_> = rasters.keys().cloned().collect();
                paths.sort();
                paths
            })
            .unwrap_or_default()
    }

    fn lookup(&self, path: &Path) -> SarResult<StoredRaster> {
        self.get(path)
            .ok_or_else(|| SarError::input_read(path, "no such raster"))
    }

    fn store(&self, path: &Path, raster: StoredRaster) -> SarResult<()> {
        let mut rasters = self
            .rasters
            .write()
            .map_err(|_| SarError::Processing("Raster store lock poisoned".to_string()))?;
        rasters.insert(path.to_path_buf(), raster);
        Ok(())
    }
}

impl RasterIo for MemoryRaster {
    fn info(&self, path: &Path) -> SarResult<RasterInfo> {
        let raster = self.lookup(path)?;
        Ok(RasterInfo {
            extent: raster.extent(),
            bands: raster.bands.len(),
            georef: raster.georef.clone(),
        })
    }

    fn read_band(&self, path: &Path, band: usize, window: PixelWindow) -> SarResult<Array2<f64>> {
        let raster = self.lookup(path)?;
        if band == 0 || band > raster.bands.len() {
            return Err(SarError::input_read(
                path,
                format!("band {} out of range (1..={})", band, raster.bands.len()),
            ));
        }
        if !window.fits_within(raster.extent()) {
            return Err(SarError::input_read(
                path,
                format!("window {:?} exceeds raster extent {:?}", window, raster.extent()),
            ));
        }

        let data = &raster.bands[band - 1];
        Ok(data
            .slice(s![
                window.y0..window.y0 + window.rows,
                window.x0..window.x0 + window.cols
            ])
            .to_owned())
    }

    fn write_byte_raster(
        &self,
        path: &Path,
        bands: &[Array2<u8>],
        georef: &GeoReference,
    ) -> SarResult<()> {
        let bands = bands.iter().map(|b| b.mapv(f64::from)).collect();
        self.store(path, StoredRaster::new(bands).with_georef(georef.clone()))
    }

    fn write_float_raster(
        &self,
        path: &Path,
        bands: &[Array2<f64>],
        georef: &GeoReference,
    ) -> SarResult<()> {
        self.store(path, StoredRaster::new(bands.to_vec()).with_georef(georef.clone()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }
}
