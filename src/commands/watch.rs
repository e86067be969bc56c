//! Watch command implementation
//!
//! Polls the GPU and prints one stabilized sample per tick.

use crate::cli::args::OutputFormat;
use crate::cli::output::print_line;
use crate::commands::open_provider;
use crate::config::Config;
use crate::error::Result;
use crate::services::Sampler;
use crate::stabilizer::UsageStabilizer;

/// Execute the watch command
pub fn run_watch(config: &Config, count: Option<u64>, format: OutputFormat) -> Result<()> {
    let provider = open_provider(config);
    let stabilizer = UsageStabilizer::new(config.stabilizer.to_config());
    let sampler = Sampler::new(provider, stabilizer, config.general.interval());

    log::info!(
        "Watching GPU {} every {:?}",
        config.gpu.index,
        sampler.interval()
    );

    // A failed write (closed pipe) ends the loop and surfaces as an I/O error
    sampler.run(count, |sample| print_line(sample, format))?;

    Ok(())
}
