//! Configuration for the canvas, the execution engine and storage
//!
//! Every section falls back to the values in [`crate::constants`] when a
//! field is absent, so a partial JSON file is a valid config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::constants::{execution, fallback, hit, node_box, paths, zoom};

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config {path:?}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Canvas geometry and zoom bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CanvasConfig {
    pub node_width: f64,
    pub node_height: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    /// Where the first node without a position is placed
    pub fallback_origin: (f64, f64),
    /// Horizontal spacing between repaired nodes
    pub fallback_spacing: f64,
    /// World distance used when hit-testing connections
    pub hit_tolerance: f64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            node_width: node_box::WIDTH,
            node_height: node_box::HEIGHT,
            min_zoom: zoom::MIN,
            max_zoom: zoom::MAX,
            zoom_step: zoom::STEP,
            fallback_origin: fallback::ORIGIN,
            fallback_spacing: fallback::SPACING,
            hit_tolerance: hit::TOLERANCE,
        }
    }
}

impl CanvasConfig {
    /// Check the bounds the transform and router rely on
    ///
    /// Zoom bounds must be positive and ordered, since the transform clamps
    /// into them and divides by the zoom level.
    pub fn validate(&self) -> Result<(), String> {
        fn positive(name: &str, value: f64) -> Result<(), String> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(format!("{} must be a positive number, got {}", name, value))
            }
        }

        positive("nodeWidth", self.node_width)?;
        positive("nodeHeight", self.node_height)?;
        positive("minZoom", self.min_zoom)?;
        positive("maxZoom", self.max_zoom)?;
        positive("zoomStep", self.zoom_step)?;
        if self.min_zoom > self.max_zoom {
            return Err(format!(
                "minZoom ({}) must not exceed maxZoom ({})",
                self.min_zoom, self.max_zoom
            ));
        }
        if !(self.hit_tolerance.is_finite() && self.hit_tolerance >= 0.0) {
            return Err(format!("hitTolerance must be non-negative, got {}", self.hit_tolerance));
        }
        let (x, y) = self.fallback_origin;
        if !(x.is_finite() && y.is_finite() && self.fallback_spacing.is_finite()) {
            return Err("fallbackOrigin and fallbackSpacing must be finite".to_string());
        }
        Ok(())
    }
}

/// Execution engine limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Maximum number of nodes visited in one run (guards cyclic graphs)
    pub max_steps: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: execution::MAX_STEPS,
        }
    }
}

/// Where the JSON store keeps its files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Root directory; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: Some(PathBuf::from(paths::DATA_DIR)),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkflowConfig {
    pub canvas: CanvasConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

impl WorkflowConfig {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults; a malformed one, or one with
    /// unusable canvas bounds, is an error.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.canvas.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }
}
