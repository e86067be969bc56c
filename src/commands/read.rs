//! Read command implementation
//!
//! Takes a single raw reading. A failed reading prints the failure sentinel
//! and still exits successfully.

use crate::cli::args::{OutputFormat, ReadArgs};
use crate::cli::output::{print_output, ReadingOutput};
use crate::commands::open_provider;
use crate::config::Config;
use crate::domain::FAILURE_SENTINEL;
use crate::error::Result;
use crate::usage::UsageProvider;

/// Execute the read command
pub fn run_read(args: &ReadArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let provider = open_provider(config);

    let output = match provider.read_utilization() {
        Ok(util) => ReadingOutput {
            gpu_index: provider.device_index(),
            gpu_percent: i32::from(util.gpu_percent()),
            memory_percent: args.memory.then_some(util.memory_percent()),
        },
        Err(e) => {
            log::warn!("GPU {} reading failed: {}", provider.device_index(), e);
            ReadingOutput {
                gpu_index: provider.device_index(),
                gpu_percent: FAILURE_SENTINEL,
                memory_percent: None,
            }
        }
    };
    provider.close();

    print_output(&output, format)?;

    Ok(())
}
