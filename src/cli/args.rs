//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// NVML-backed GPU load sampler
///
/// Reads GPU utilization and smooths it into a stable percentage.
#[derive(Parser, Debug)]
#[command(name = "gpuload")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "GPULOAD_CONFIG")]
    pub config: Option<String>,

    /// Target GPU by index (0-based)
    #[arg(long, global = true)]
    pub gpu: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report whether NVML can be loaded and the GPU opened
    Probe,

    /// Take a single raw reading
    Read(ReadArgs),

    /// Poll and print stabilized GPU load
    Watch(WatchArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the read command
#[derive(Parser, Debug)]
pub struct ReadArgs {
    /// Also report memory bandwidth utilization
    #[arg(short, long)]
    pub memory: bool,
}

/// Arguments for the watch command
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Poll interval in milliseconds
    #[arg(short, long)]
    pub interval_ms: Option<u64>,

    /// Stop after this many samples
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Failure grace period in milliseconds
    #[arg(long)]
    pub grace_ms: Option<i64>,

    /// Smoothing factor (clamped to 0.05-0.95)
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Consecutive zero readings required to accept zero
    #[arg(long)]
    pub zero_confirm: Option<i32>,
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for machine parsing
    Json,
    /// Compact single-line format
    Compact,
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
