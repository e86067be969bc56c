//! gpuload - NVML-backed GPU load sampler
//!
//! A command-line tool that reads NVIDIA GPU utilization and smooths it into
//! a stable percentage.

use clap::Parser;
use gpuload::cli::args::{generate_completions, Cli, Commands};
use gpuload::commands::{run_probe, run_read, run_watch};
use gpuload::config::{Config, ConfigBuilder};
use gpuload::error::AppError;

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Set log level based on verbose flag
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    // Run the appropriate command
    let result = run(&cli);

    if let Err(e) = result {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config, AppError> {
    let mut builder = ConfigBuilder::new()
        .with_file(cli.config.as_deref())?
        .with_verbose(cli.verbose.then_some(true))
        .with_gpu_index(cli.gpu);

    if let Commands::Watch(ref args) = cli.command {
        builder = builder
            .with_interval_ms(args.interval_ms)
            .with_failure_grace_ms(args.grace_ms)
            .with_smoothing_factor(args.alpha)
            .with_zero_confirm_count(args.zero_confirm);
    }

    let config = builder.build()?;
    if config.general.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), AppError> {
    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return Ok(());
    }

    let config = load_config(cli)?;

    match &cli.command {
        Commands::Probe => run_probe(&config, cli.format),

        Commands::Read(args) => run_read(args, &config, cli.format),

        Commands::Watch(args) => run_watch(&config, args.count, cli.format),

        Commands::Completions { .. } => Ok(()),
    }
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    if let AppError::Config(gpuload::error::ConfigError::FileNotFound(_)) = err {
        eprintln!();
        eprintln!("Hint: Check the --config path or the GPULOAD_CONFIG variable.");
    }
}
