// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{CameraBackendType, LensFacing, Resolution};
use crate::constants::{self, snapshot};
use crate::errors::{AppError, AppResult};
use crate::render::{RendererConfig, RendererKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Directory under the user config directory
const CONFIG_DIR: &str = "camera-preview";
const CONFIG_FILE: &str = "config.json";

/// Debug snapshot settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Push periodic snapshots to the debug sink
    pub enabled: bool,
    /// Stop after this many snapshots
    pub limit: u32,
    /// Milliseconds between snapshot requests
    pub interval_ms: u64,
    /// Target directory (default: ~/Pictures/camera-preview)
    pub directory: Option<PathBuf>,
}

impl SnapshotSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: snapshot::DEFAULT_LIMIT,
            interval_ms: snapshot::DEFAULT_INTERVAL.as_millis() as u64,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Renderer used at startup
    pub renderer: RendererKind,
    /// Preferred camera direction
    pub lens_facing: LensFacing,
    /// Camera backend to use (GStreamer or synthetic)
    pub backend: CameraBackendType,
    /// Capture resolution requested from the camera
    pub target_resolution: Resolution,
    /// Display aspect (width / height) the preview is fitted to
    pub aspect_ratio: f32,
    pub snapshots: SnapshotSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            renderer: RendererKind::default(),
            lens_facing: LensFacing::default(),
            backend: CameraBackendType::default(),
            target_resolution: Resolution::new(constants::TARGET_WIDTH, constants::TARGET_HEIGHT),
            aspect_ratio: constants::TARGET_ASPECT_RATIO,
            snapshots: SnapshotSettings::default(),
        }
    }
}

impl Config {
    /// `~/.config/camera-preview/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Read a config file, failing on I/O or parse errors
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Read a config file, using defaults when it is missing or invalid
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        if !(self.aspect_ratio.is_finite() && self.aspect_ratio > 0.0) {
            return Err(AppError::Config(format!(
                "aspect_ratio must be positive, got {}",
                self.aspect_ratio
            )));
        }
        if self.target_resolution.width == 0 || self.target_resolution.height == 0 {
            return Err(AppError::Config(format!(
                "target_resolution must be non-zero, got {}",
                self.target_resolution
            )));
        }
        Ok(())
    }

    /// Renderer configuration with this config's aspect ratio
    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            aspect_ratio: self.aspect_ratio,
            ..RendererConfig::default()
        }
    }
}
