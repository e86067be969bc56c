//! CLI argument parsing and output formatting
//!
//! clap derive definitions plus table, JSON and compact printers.

pub mod args;
pub mod output;

pub use args::{Cli, Commands};
