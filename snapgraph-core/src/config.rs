//! Configuration for the snapshot codec
//!
//! This module provides the configuration structure that selects the default
//! snapshot format, the field marking mode, the persistent-storage directory
//! used for bare file names, and the gzip level of the compressed format.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::format::SnapshotFormat;

/// Environment variable naming the persistent-storage directory.
pub const ENV_STORAGE_DIR: &str = "SNAPGRAPH_DIR";
/// Environment variable selecting the default format.
pub const ENV_FORMAT: &str = "SNAPGRAPH_FORMAT";
/// Environment variable enabling explicit field marking (`1`/`true`).
pub const ENV_EXPLICIT_FIELDS: &str = "SNAPGRAPH_EXPLICIT_FIELDS";
/// Environment variable setting the gzip level.
pub const ENV_COMPRESSION_LEVEL: &str = "SNAPGRAPH_COMPRESSION_LEVEL";

/// Codec settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Format used by the `save`/`load` entry points that take no explicit format
    pub format: SnapshotFormat,
    /// Only persist explicitly marked fields, nested structures included
    pub require_explicit_fields: bool,
    /// Directory bare file names are resolved against (defaults to the working directory)
    pub storage_dir: Option<PathBuf>,
    /// Gzip level for the compressed format (0-9)
    pub compression_level: u32,
}

impl SnapshotConfig {
    /// Binary format, default field rules, no storage directory
    pub fn new() -> Self {
        SnapshotConfig {
            format: SnapshotFormat::Binary,
            require_explicit_fields: false,
            storage_dir: None,
            compression_level: 6,
        }
    }

    /// Configuration rooted at a storage directory
    pub fn with_storage_dir<P: Into<PathBuf>>(dir: P) -> Self {
        SnapshotConfig {
            storage_dir: Some(dir.into()),
            ..Self::new()
        }
    }

    pub fn format(mut self, format: SnapshotFormat) -> Self {
        self.format = format;
        self
    }

    pub fn require_explicit_fields(mut self, required: bool) -> Self {
        self.require_explicit_fields = required;
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Build a configuration from `SNAPGRAPH_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        if let Some(dir) = lookup(ENV_STORAGE_DIR).filter(|dir| !dir.is_empty()) {
            config.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(format) = lookup(ENV_FORMAT) {
            config.format = format.parse()?;
        }
        if let Some(flag) = lookup(ENV_EXPLICIT_FIELDS) {
            config.require_explicit_fields = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(crate::SnapshotError::validation(format!(
                        "{ENV_EXPLICIT_FIELDS} must be a boolean, got '{other}'"
                    )))
                }
            };
        }
        if let Some(level) = lookup(ENV_COMPRESSION_LEVEL) {
            config.compression_level = level.trim().parse().map_err(|_| {
                crate::SnapshotError::validation(format!(
                    "{ENV_COMPRESSION_LEVEL} must be an integer, got '{level}'"
                ))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.compression_level > 9 {
            return Err(crate::SnapshotError::validation(format!(
                "compression level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }
        if let Some(dir) = &self.storage_dir {
            if dir.as_os_str().is_empty() {
                return Err(crate::SnapshotError::validation(
                    "storage directory cannot be empty",
                ));
            }
        }
        Ok(())
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self::new()
    }
}
