//! Configuration system
//!
//! Handles TOML config file parsing and CLI argument merging.

pub mod builder;
pub mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use crate::stabilizer::StabilizerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// GPU selection settings
    pub gpu: GpuConfig,
    /// Native library settings
    pub library: LibraryConfig,
    /// Stabilizer settings
    pub stabilizer: StabilizerSection,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
    /// Sampler poll interval in milliseconds
    pub interval_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            interval_ms: 1000,
        }
    }
}

impl GeneralConfig {
    /// Poll interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// GPU selection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GpuConfig {
    /// Device index to sample
    pub index: u32,
}

/// Native library configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LibraryConfig {
    /// Explicit library path, replacing the default search list
    pub path: Option<PathBuf>,
}

/// Stabilizer configuration as written in the file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerSection {
    /// Failure grace period in milliseconds
    pub failure_grace_ms: i64,
    /// EMA smoothing factor (clamped to 0.05-0.95)
    pub smoothing_factor: f64,
    /// Consecutive zero readings required to accept zero
    pub zero_confirm_count: i32,
    /// Value reported when no reading is available
    pub unsupported_value: i32,
}

impl Default for StabilizerSection {
    fn default() -> Self {
        let defaults = StabilizerConfig::default();
        Self {
            failure_grace_ms: defaults.failure_grace_ms,
            smoothing_factor: defaults.smoothing_factor,
            zero_confirm_count: defaults.zero_confirm_count,
            unsupported_value: defaults.unsupported_value,
        }
    }
}

impl StabilizerSection {
    /// Convert to a clamped stabilizer configuration
    pub fn to_config(&self) -> StabilizerConfig {
        StabilizerConfig::new(
            self.failure_grace_ms,
            self.smoothing_factor,
            self.zero_confirm_count,
            self.unsupported_value,
        )
    }
}
