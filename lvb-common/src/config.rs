//! Workbench configuration loading
//!
//! All tunables that used to live in ambient application settings are
//! carried in one explicit struct handed to the results layer at
//! construction time.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Workbench-wide configuration.
///
/// Loaded from a TOML file; every field has a default so a partial (or
/// absent) file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Deadline for one acquisition cycle, in milliseconds.
    pub acquisition_timeout_ms: u64,

    /// Drop sectors whose report indicates no symbol was detected.
    /// When false such sectors are kept with a zero-value grade.
    pub ignore_no_read: bool,

    /// DPI assumed for images that do not carry their own density.
    pub default_target_dpi: u32,

    /// Keep the device-returned image bytes in their original format
    /// instead of re-encoding when caching the current image.
    pub preserve_image_format: bool,

    /// Radius (pixels) for the center-point containment lookup used to
    /// name handheld verifier sectors after stored neighbours.
    pub containment_radius: f64,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            acquisition_timeout_ms: 30_000,
            ignore_no_read: false,
            default_target_dpi: 600,
            preserve_image_format: false,
            containment_radius: 50.0,
        }
    }
}

impl WorkbenchConfig {
    /// Acquisition deadline as a [`Duration`].
    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_millis(self.acquisition_timeout_ms)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file, falling back to defaults if it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
