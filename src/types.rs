use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Layout of the per-pixel polarimetric matrix, selected once from the band count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixDimension {
    /// Single polarization intensity (C11)
    Scalar,
    /// Dual-pol diagonal only (C11, C22), approximate treatment
    DiagonalPair,
    /// Quad-pol diagonal only (T11, T22, T33), approximate treatment
    DiagonalTriple,
    /// Full dual-pol covariance (C11, C12re, C12im, C22)
    DualFull,
    /// Full quad-pol coherency (T11, T12, T13, T22, T23, T33)
    QuadFull,
}

impl MatrixDimension {
    /// Map a raster band count to its matrix layout
    pub fn from_band_count(bands: usize) -> SarResult<Self> {
        match bands {
            1 => Ok(Self::Scalar),
            2 => Ok(Self::DiagonalPair),
            3 => Ok(Self::DiagonalTriple),
            4 => Ok(Self::DualFull),
            9 => Ok(Self::QuadFull),
            other => Err(SarError::InvalidFormat(format!(
                "Incorrect number of bands: {} (expected 1, 2, 3, 4 or 9)",
                other
            ))),
        }
    }

    /// Matrix order p
    pub fn order(&self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::DiagonalPair | Self::DualFull => 2,
            Self::DiagonalTriple | Self::QuadFull => 3,
        }
    }

    /// Number of raster bands carrying the matrix elements
    pub fn band_count(&self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::DiagonalPair => 2,
            Self::DiagonalTriple => 3,
            Self::DualFull => 4,
            Self::QuadFull => 9,
        }
    }

    /// Diagonal-only layouts ignore off-diagonal correlation entirely
    pub fn is_approximate(&self) -> bool {
        matches!(self, Self::DiagonalPair | Self::DiagonalTriple)
    }
}

impl fmt::Display for MatrixDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => write!(f, "single-pol (1 band)"),
            Self::DiagonalPair => write!(f, "dual-pol diagonal (2 bands)"),
            Self::DiagonalTriple => write!(f, "quad-pol diagonal (3 bands)"),
            Self::DualFull => write!(f, "dual-pol covariance (4 bands)"),
            Self::QuadFull => write!(f, "quad-pol coherency (9 bands)"),
        }
    }
}

/// Raster size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub cols: usize,
    pub rows: usize,
}

impl SpatialExtent {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    pub fn pixel_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Array shape in ndarray (row-major) order
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Window covering the whole extent
    pub fn full_window(&self) -> PixelWindow {
        PixelWindow {
            x0: 0,
            y0: 0,
            cols: self.cols,
            rows: self.rows,
        }
    }
}

/// Rectangular pixel window, offset from the upper-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWindow {
    pub x0: usize,
    pub y0: usize,
    pub cols: usize,
    pub rows: usize,
}

impl PixelWindow {
    pub fn extent(&self) -> SpatialExtent {
        SpatialExtent::new(self.cols, self.rows)
    }

    /// True when the window lies inside a raster of the given extent
    pub fn fits_within(&self, extent: SpatialExtent) -> bool {
        self.cols > 0
            && self.rows > 0
            && self.x0 + self.cols <= extent.cols
            && self.y0 + self.rows <= extent.rows
    }
}

impl std::str::FromStr for PixelWindow {
    type Err = SarError;

    /// Parse `x0,y0,cols,rows`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .map(|v| v.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SarError::Usage(format!("Invalid window '{}': {}", s, e)))?;

        match values.as_slice() {
            [x0, y0, cols, rows] => Ok(Self {
                x0: *x0,
                y0: *y0,
                cols: *cols,
                rows: *rows,
            }),
            _ => Err(SarError::Usage(format!(
                "Window '{}' must have four entries x0,y0,cols,rows",
                s
            ))),
        }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Transform of a window whose upper-left pixel is (x0, y0)
    pub fn shifted(&self, window: &PixelWindow) -> Self {
        let x0 = window.x0 as f64;
        let y0 = window.y0 as f64;
        Self {
            top_left_x: self.top_left_x + x0 * self.pixel_width + y0 * self.rotation_x,
            top_left_y: self.top_left_y + x0 * self.rotation_y + y0 * self.pixel_height,
            ..*self
        }
    }
}

/// Georeferencing carried from the reference image to every output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoReference {
    pub geo_transform: Option<GeoTransform>,
    pub projection: Option<String>,
}

/// Raster metadata needed before any band is read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterInfo {
    pub extent: SpatialExtent,
    pub bands: usize,
    pub georef: GeoReference,
}

/// Error types for change detection
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Could not read {path}: {reason}")]
    InputRead { path: PathBuf, reason: String },

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Parallel execution failed: {0}")]
    ParallelExecution(String),

    #[error("Co-registration failed: {0}")]
    CoRegistration(String),

    #[error("Output file already exists: {0}")]
    OutputExists(PathBuf),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl SarError {
    pub fn input_read(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::InputRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for change detection operations
pub type SarResult<T> = Result<T, SarError>;
