//! Configuration management with environment variable support.
//!
//! This module provides [`Config`] for loading and validating MyFS settings
//! from JSON files and environment variables.
//!
//! ## Environment Variables
//!
//! - `MYFS_DATA_PATH`: Override data volume path
//! - `MYFS_METADATA_PATH`: Override metadata volume path
//! - `MYFS_CONFIG`: Override config file path

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable names for configuration overrides
pub const ENV_DATA_PATH: &str = "MYFS_DATA_PATH";
pub const ENV_METADATA_PATH: &str = "MYFS_METADATA_PATH";
pub const ENV_CONFIG_PATH: &str = "MYFS_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path of the data volume (header + appended payloads).
    pub data_path: String,
    /// Path of the encrypted metadata volume.
    pub metadata_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: "./myfs.dat".to_string(),
            metadata_path: "./myfs.meta".to_string(),
        }
    }
}

impl Config {
    /// Load config from file path
    pub fn load(path: &str) -> Result<Self> {
        let s =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let mut config: Config = serde_json::from_str(&s)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config with environment variable overrides
    /// Priority: ENV vars > config file > defaults
    pub fn load_with_env(path: Option<&str>) -> Result<Self> {
        // Check for config path from environment
        let config_path = path
            .map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok());

        let mut config = match config_path {
            Some(ref p) if Path::new(p).exists() => {
                info!(path = p, "loading config from file");
                let s = fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p))?;
                serde_json::from_str(&s)?
            }
            _ => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to config
    fn apply_env_overrides(&mut self) {
        if let Ok(data_path) = env::var(ENV_DATA_PATH) {
            debug!(data_path = %data_path, "overriding data_path from environment");
            self.data_path = data_path;
        }

        if let Ok(metadata_path) = env::var(ENV_METADATA_PATH) {
            debug!(metadata_path = %metadata_path, "overriding metadata_path from environment");
            self.metadata_path = metadata_path;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.data_path.trim().is_empty() {
            anyhow::bail!("data_path cannot be empty");
        }

        if self.metadata_path.trim().is_empty() {
            anyhow::bail!("metadata_path cannot be empty");
        }

        // Both volumes in one file would let payload appends clobber the index
        if self.data_path == self.metadata_path {
            anyhow::bail!("data_path and metadata_path must be distinct files");
        }

        // Warn if the metadata volume looks like it lives in a public directory
        let meta_path = Path::new(&self.metadata_path);
        if let Some(parent) = meta_path.parent() {
            let parent_str = parent.to_string_lossy().to_lowercase();
            if parent_str.contains("public")
                || parent_str.contains("www")
                || parent_str.contains("htdocs")
            {
                warn!(
                    path = %self.metadata_path,
                    "metadata volume appears to be in a public directory - this is a security risk"
                );
            }
        }

        if self.data_path.contains("..") || self.metadata_path.contains("..") {
            warn!("volume path contains '..' - consider using absolute paths");
        }

        Ok(())
    }

    /// Create a new config with explicit values
    pub fn new(data_path: impl Into<String>, metadata_path: impl Into<String>) -> Self {
        Self {
            data_path: data_path.into(),
            metadata_path: metadata_path.into(),
        }
    }
}
