use crate::core::change_maps::ChangeMaps;
use crate::io::raster::RasterIo;
use crate::types::{GeoReference, SarError, SarResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when an output file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionPolicy {
    /// Refuse to write
    Fail,
    /// Replace the existing file
    #[default]
    Overwrite,
    /// Write to the first free `<name>_v<N>` path instead
    Version,
}

impl std::str::FromStr for CollisionPolicy {
    type Err = SarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "overwrite" => Ok(Self::Overwrite),
            "version" => Ok(Self::Version),
            other => Err(SarError::Usage(format!(
                "Unknown collision policy '{}' (expected fail, overwrite or version)",
                other
            ))),
        }
    }
}

/// Paths of the written change maps
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMapPaths {
    pub cmap: PathBuf,
    pub smap: PathBuf,
    pub fmap: PathBuf,
    pub bmap: PathBuf,
}

/// `dir/name.ext` -> `dir/name<suffix>.ext`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(file_name)
}

/// Writes the change maps as byte rasters next to the reference image
pub struct ChangeMapWriter<'a> {
    io: &'a dyn RasterIo,
    policy: CollisionPolicy,
}

impl<'a> ChangeMapWriter<'a> {
    pub fn new(io: &'a dyn RasterIo, policy: CollisionPolicy) -> Self {
        Self { io, policy }
    }

    /// Output base path: `out_name` placed in the directory of `reference`
    pub fn output_base(reference: &Path, out_name: &str) -> PathBuf {
        let file_name = Path::new(out_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| out_name.into());
        match reference.parent() {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }

    /// Resolve a target path according to the collision policy
    pub fn resolve(&self, path: PathBuf) -> SarResult<PathBuf> {
        if !self.io.exists(&path) {
            return Ok(path);
        }

        match self.policy {
            CollisionPolicy::Fail => Err(SarError::OutputExists(path)),
            CollisionPolicy::Overwrite => {
                log::warn!("Overwriting existing file {}", path.display());
                Ok(path)
            }
            CollisionPolicy::Version => {
                let mut version = 1;
                loop {
                    let candidate = with_suffix(&path, &format!("_v{}", version));
                    if !self.io.exists(&candidate) {
                        log::info!("{} exists, writing {}", path.display(), candidate.display());
                        return Ok(candidate);
                    }
                    version += 1;
                }
            }
        }
    }

    /// Write all four maps; `base` is the output path without map suffix
    pub fn write(
        &self,
        maps: &ChangeMaps,
        base: &Path,
        georef: &GeoReference,
    ) -> SarResult<ChangeMapPaths> {
        // Resolve every target before writing anything
        let paths = ChangeMapPaths {
            cmap: self.resolve(with_suffix(base, "_cmap"))?,
            smap: self.resolve(with_suffix(base, "_smap"))?,
            fmap: self.resolve(with_suffix(base, "_fmap"))?,
            bmap: self.resolve(with_suffix(base, "_bmap"))?,
        };

        self.write_single(&paths.cmap, &maps.cmap, georef)?;
        log::info!("Most recent change map written to: {}", paths.cmap.display());

        self.write_single(&paths.fmap, &maps.fmap, georef)?;
        log::info!("Frequency map written to: {}", paths.fmap.display());

        self.io.write_byte_raster(&paths.bmap, &maps.bitemporal_bands(), georef)?;
        log::info!("Bitemporal map image written to: {}", paths.bmap.display());

        self.write_single(&paths.smap, &maps.smap, georef)?;
        log::info!("First change map written to: {}", paths.smap.display());

        Ok(paths)
    }

    fn write_single(&self, path: &Path, band: &Array2<u8>, georef: &GeoReference) -> SarResult<()> {
        self.io.write_byte_raster(path, std::slice::from_ref(band), georef)
    }
}
