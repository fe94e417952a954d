use crate::io::raster::RasterIo;
use crate::types::{
    GeoReference, GeoTransform, PixelWindow, RasterInfo, SarError, SarResult, SpatialExtent,
};
use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// GDAL-backed raster access
#[derive(Debug, Clone)]
pub struct GdalRaster {
    driver_name: String,
}

impl GdalRaster {
    /// Backend writing GeoTIFF outputs
    pub fn new() -> Self {
        Self::with_driver("GTiff")
    }

    pub fn with_driver(driver_name: impl Into<String>) -> Self {
        Self {
            driver_name: driver_name.into(),
        }
    }

    fn open(path: &Path) -> SarResult<Dataset> {
        Dataset::open(path).map_err(|e| SarError::input_read(path, e))
    }

    fn write_bands<T: GdalType + Copy>(
        &self,
        path: &Path,
        bands: &[Array2<T>],
        georef: &GeoReference,
    ) -> SarResult<()> {
        let (height, width) = bands.first().map(|b| b.dim()).ok_or_else(|| {
            SarError::Processing(format!("No bands to write to {}", path.display()))
        })?;

        log::debug!(
            "Creating {} raster {} ({}x{}, {} bands)",
            self.driver_name,
            path.display(),
            width,
            height,
            bands.len()
        );

        let driver = DriverManager::get_driver_by_name(&self.driver_name)?;
        let mut dataset = driver.create_with_band_type::<T, _>(
            path,
            width as isize,
            height as isize,
            bands.len() as isize,
        )?;

        if let Some(transform) = &georef.geo_transform {
            dataset.set_geo_transform(&transform.to_gdal())?;
        }
        if let Some(projection) = &georef.projection {
            dataset.set_projection(projection)?;
        }

        for (index, band) in bands.iter().enumerate() {
            if band.dim() != (height, width) {
                return Err(SarError::Processing(format!(
                    "Band {} of {} has shape {:?}, expected {:?}",
                    index + 1,
                    path.display(),
                    band.dim(),
                    (height, width)
                )));
            }
            let mut rasterband = dataset.rasterband(index as isize + 1)?;
            let flat_data: Vec<T> = band.iter().copied().collect();
            let buffer = Buffer::new((width, height), flat_data);
            rasterband.write((0, 0), (width, height), &buffer)?;
        }

        Ok(())
    }
}

impl Default for GdalRaster {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterIo for GdalRaster {
    fn info(&self, path: &Path) -> SarResult<RasterInfo> {
        let dataset = Self::open(path)?;
        let (width, height) = dataset.raster_size();
        let projection = dataset.projection();

        Ok(RasterInfo {
            extent: SpatialExtent::new(width, height),
            bands: dataset.raster_count().max(0) as usize,
            georef: GeoReference {
                geo_transform: dataset.geo_transform().ok().map(GeoTransform::from_gdal),
                projection: if projection.is_empty() { None } else { Some(projection) },
            },
        })
    }

    fn read_band(&self, path: &Path, band: usize, window: PixelWindow) -> SarResult<Array2<f64>> {
        let dataset = Self::open(path)?;
        let rasterband = dataset
            .rasterband(band as isize)
            .map_err(|e| SarError::input_read(path, e))?;

        let size = (window.cols, window.rows);
        let band_data = rasterband
            .read_as::<f64>((window.x0 as isize, window.y0 as isize), size, size, None)
            .map_err(|e| SarError::input_read(path, e))?;

        Array2::from_shape_vec((window.rows, window.cols), band_data.data)
            .map_err(|e| SarError::input_read(path, format!("failed to reshape band {}: {}", band, e)))
    }

    fn write_byte_raster(
        &self,
        path: &Path,
        bands: &[Array2<u8>],
        georef: &GeoReference,
    ) -> SarResult<()> {
        self.write_bands(path, bands, georef)
    }

    fn write_float_raster(
        &self,
        path: &Path,
        bands: &[Array2<f64>],
        georef: &GeoReference,
    ) -> SarResult<()> {
        let bands: Vec<Array2<f32>> = bands.iter().map(|b| b.mapv(|v| v as f32)).collect();
        self.write_bands(path, &bands, georef)
    }
}
