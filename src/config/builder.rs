//! Configuration builder
//!
//! Merges configuration from files and CLI arguments.

use crate::config::{Config, ConfigFile};
use crate::error::ConfigError;

/// Builder for merging configuration sources
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Load configuration from a file
    ///
    /// An explicit path must exist and parse; without one the default
    /// locations are searched and a miss keeps the defaults.
    pub fn with_file(mut self, path: Option<&str>) -> Result<Self, ConfigError> {
        let file_config = match path {
            Some(path) => Some(ConfigFile::load(path)?),
            None => ConfigFile::load_default(),
        };

        if let Some(cfg) = file_config {
            self.config = cfg;
        }

        Ok(self)
    }

    /// Override with CLI verbose flag
    pub fn with_verbose(mut self, verbose: Option<bool>) -> Self {
        if let Some(v) = verbose {
            self.config.general.verbose = v;
        }
        self
    }

    /// Override with CLI interval
    pub fn with_interval_ms(mut self, interval: Option<u64>) -> Self {
        if let Some(i) = interval {
            self.config.general.interval_ms = i;
        }
        self
    }

    /// Override with CLI GPU index
    pub fn with_gpu_index(mut self, index: Option<u32>) -> Self {
        if let Some(i) = index {
            self.config.gpu.index = i;
        }
        self
    }

    /// Override with CLI failure grace period
    pub fn with_failure_grace_ms(mut self, grace: Option<i64>) -> Self {
        if let Some(g) = grace {
            self.config.stabilizer.failure_grace_ms = g;
        }
        self
    }

    /// Override with CLI smoothing factor
    pub fn with_smoothing_factor(mut self, alpha: Option<f64>) -> Self {
        if let Some(a) = alpha {
            self.config.stabilizer.smoothing_factor = a;
        }
        self
    }

    /// Override with CLI zero-confirmation count
    pub fn with_zero_confirm_count(mut self, count: Option<i32>) -> Self {
        if let Some(c) = count {
            self.config.stabilizer.zero_confirm_count = c;
        }
        self
    }

    /// Build the final configuration
    ///
    /// Stabilizer values are clamped later; only values with no sensible
    /// clamp are rejected here.
    pub fn build(self) -> Result<Config, ConfigError> {
        if self.config.general.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "general.interval_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
