use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};

pub const DEFAULT_PALETTE_PATH: &str = "resources/buckets_313.npy";
pub const DEFAULT_INDEX_PATH: &str = "resources/buckets_knn.json";

/// Locations of the artifacts a [`BucketConverter`](crate::BucketConverter) is built from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// `(N, 2)` table of quantized ab-values, `.npy` or `.json`.
    pub palette_path: PathBuf,
    /// Serialized nearest-neighbor index.
    pub index_path: PathBuf,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            palette_path: PathBuf::from(DEFAULT_PALETTE_PATH),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
        }
    }
}

impl ConverterConfig {
    pub fn new(palette_path: impl Into<PathBuf>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            palette_path: palette_path.into(),
            index_path: index_path.into(),
        }
    }

    /// Reads a JSON config. Missing fields keep their defaults and relative
    /// paths are resolved against the config file's directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = crate::read_file(path)?;
        let mut config: Self = serde_json::from_slice(&data).map_err(LoadError::from)?;
        if let Some(dir) = path.parent() {
            config.palette_path = dir.join(&config.palette_path);
            config.index_path = dir.join(&config.index_path);
        }

        Ok(config)
    }

    /// Replaces whichever paths are given, keeping the rest.
    pub fn with_overrides(
        mut self,
        palette_path: Option<PathBuf>,
        index_path: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = palette_path {
            self.palette_path = path;
        }
        if let Some(path) = index_path {
            self.index_path = path;
        }

        self
    }
}
