//! Command handlers
//!
//! Each command handler orchestrates the execution of a CLI command.

pub mod probe;
pub mod read;
pub mod watch;

pub use probe::run_probe;
pub use read::run_read;
pub use watch::run_watch;

use crate::config::Config;
use crate::nvml::SharedNvml;
use crate::usage::NvmlUsageProvider;

use std::sync::Arc;

/// Open the configured GPU, honoring a library path override
pub(crate) fn open_provider(config: &Config) -> NvmlUsageProvider {
    let shared = match config.library.path {
        Some(ref path) => Arc::new(SharedNvml::with_library_path(path.clone())),
        None => SharedNvml::global(),
    };
    NvmlUsageProvider::with_shared(shared, config.gpu.index)
}
