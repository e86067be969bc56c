//! gpuload - stable GPU load readings from NVML
//!
//! This library samples GPU utilization through a dynamically loaded NVML,
//! shares the native subsystem between any number of providers, and filters
//! the raw readings into a value steady enough for a UI.
//!
//! # Modules
//!
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Configuration system
//! - [`domain`]: Domain value types
//! - [`error`]: Error types
//! - [`nvml`]: NVML loading and shared lifecycle
//! - [`services`]: Polling sampler
//! - [`stabilizer`]: Reading stabilization filter
//! - [`usage`]: GPU usage providers

pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod nvml;
pub mod services;
pub mod stabilizer;
pub mod usage;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{AppError, Result};
pub use stabilizer::{StabilizerConfig, UsageStabilizer};
pub use usage::{NvmlUsageProvider, UnavailableProvider, UsageProvider};
