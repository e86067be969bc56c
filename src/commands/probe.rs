//! Probe command implementation
//!
//! Reports whether NVML can be loaded and the selected GPU opened.

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, ProbeReport};
use crate::commands::open_provider;
use crate::config::Config;
use crate::error::Result;
use crate::usage::UsageProvider;

/// Execute the probe command
pub fn run_probe(config: &Config, format: OutputFormat) -> Result<()> {
    let provider = open_provider(config);

    let report = ProbeReport {
        gpu_index: provider.device_index(),
        library_present: provider.is_available(),
        ready: provider.is_ready(),
        error: provider.init_error().map(|e| e.to_string()),
    };
    provider.close();

    print_output(&report, format)?;

    Ok(())
}
