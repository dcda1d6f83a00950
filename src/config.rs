//! Context configuration
//!
//! Loaded from a JSON file or built in code. All three directories must
//! exist before a context can be created.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_persist_strings() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where the tag string dictionary is mirrored
    pub strings_dir: PathBuf,
    /// Base for relative data and stylesheet paths
    pub data_dir: PathBuf,
    /// SRTM `.hgt` tiles
    pub elevation_dir: PathBuf,
    /// Mirror interned strings to `strings_dir`
    #[serde(default = "default_persist_strings")]
    pub persist_strings: bool,
}

impl Config {
    pub fn new(
        strings_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        elevation_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            strings_dir: strings_dir.into(),
            data_dir: data_dir.into(),
            elevation_dir: elevation_dir.into(),
            persist_strings: true,
        }
    }

    /// Read a JSON config; the result is not validated yet
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, path) in [
            ("strings", &self.strings_dir),
            ("data", &self.data_dir),
            ("elevation", &self.elevation_dir),
        ] {
            if !path.is_dir() {
                return Err(ConfigError::MissingDirectory {
                    kind,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Resolve a data or stylesheet path against `data_dir`
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}
