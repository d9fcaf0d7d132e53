//! Configuration module for the frame post-processing pipeline
//!
//! This module handles pipeline configuration including:
//! - Platform capabilities (digital zoom, software LSC, face detection)
//! - Internal buffer pool depth and LSC block sizing
//! - An optional input frame and stream list used by the demo binary
//!
//! # Config Location
//!
//! The default config file lives in the platform-appropriate location:
//! - **Linux**: `~/.config/frame-postproc/pipeline.toml`
//! - **macOS**: `~/Library/Application Support/frame-postproc/pipeline.toml`
//! - **Windows**: `%APPDATA%\frame-postproc\pipeline.toml`
//!
//! Files ending in `.json` are read and written as JSON, everything else as TOML.
//!
//! # Example
//!
//! ```ignore
//! use frame_postproc::config::PipelineConfig;
//!
//! let config = PipelineConfig::load("pipeline.toml")?;
//! assert!(config.pool_depth > 0);
//! ```

pub mod settings;

pub use settings::*;

use crate::backend::encoder::DEFAULT_JPEG_QUALITY;
use crate::error::{Error, Result};
use crate::imaging::lsc::BlockSizing;
use crate::types::{FrameDescriptor, OutputStreamDescriptor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for config directories
pub const APP_ID: &str = "frame-postproc";

/// Default config filename
pub const CONFIG_FILE: &str = "pipeline.toml";

/// Default number of buffers in each pool-owned unit
pub const DEFAULT_POOL_DEPTH: usize = 4;

/// Path of the default config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Buffers pre-allocated per pool-owned unit
    #[serde(default = "default_pool_depth")]
    pub pool_depth: usize,

    #[serde(default)]
    pub lsc_sizing: BlockSizing,

    /// Quality of the software JPEG engine
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default)]
    pub platform: PlatformCapabilities,

    /// Input frame geometry
    #[serde(default)]
    pub input: Option<FrameDescriptor>,

    /// Requested output streams
    #[serde(default)]
    pub streams: Vec<OutputStreamDescriptor>,
}

fn default_pool_depth() -> usize {
    DEFAULT_POOL_DEPTH
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_depth: DEFAULT_POOL_DEPTH,
            lsc_sizing: BlockSizing::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            platform: PlatformCapabilities::default(),
            input: None,
            streams: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file (JSON if the extension is `.json`, TOML otherwise)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

        if is_json(path) {
            let config: Self = serde_json::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?;
            config.validate()?;
            Ok(config)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file {:?}: {}", path, e)))
    }

    /// Reject values no graph can be built from
    pub fn validate(&self) -> Result<()> {
        if self.pool_depth == 0 {
            return Err(Error::Config("pool_depth must be at least 1".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.platform.max_digital_zoom < 1.0 {
            return Err(Error::Config(format!(
                "max_digital_zoom must be at least 1.0, got {}",
                self.platform.max_digital_zoom
            )));
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::StreamId;
    use crate::types::{PixelFormat, Rotation};

    const SAMPLE: &str = r#"
pool_depth = 6
lsc_sizing = "calibrated"

[platform]
max_digital_zoom = 4.0
software_lsc = true

[input]
width = 1920
height = 1080
stride = 1920
format = "Nv12"
size = 3110400

[[streams]]
id = 1
width = 1920
height = 1080
format = "Nv12"

[[streams]]
id = 2
width = 640
height = 480
format = "Blob"
rotation = "Deg90"
"#;

    #[test]
    fn test_parse_sample() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.pool_depth, 6);
        assert_eq!(config.lsc_sizing, BlockSizing::Calibrated);
        assert!(config.platform.software_lsc);
        assert_eq!(config.input, Some(FrameDescriptor::nv12(1920, 1080)));
        assert_eq!(config.streams.len(), 2);
        assert_eq!(config.streams[1].id, StreamId(2));
        assert_eq!(config.streams[1].format, PixelFormat::Blob);
        assert_eq!(config.streams[1].rotation, Rotation::Deg90);
        assert_eq!(config.jpeg_quality, DEFAULT_JPEG_QUALITY);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_zero_pool_depth_rejected() {
        assert!(PipelineConfig::from_toml_str("pool_depth = 0").is_err());
    }

    #[test]
    fn test_save_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pipeline.toml");
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_save_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        config.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.trim_start().starts_with('{'));
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load_or_default(dir.path().join("missing.toml"));
        assert_eq!(config, PipelineConfig::default());
    }
}
