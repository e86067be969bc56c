//! Unified error types for gpuload
//!
//! Every layer has its own error enum. The library absorbs native failures
//! and collapses them into sentinel values at the provider boundary; only the
//! binary ever reports an `AppError` to the user.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from native library operations
    #[error("NVML error: {0}")]
    Nvml(#[from] NvmlError),

    /// Error from a usage provider
    #[error("Usage provider error: {0}")]
    Usage(#[from] UsageError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error (file operations, output)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the native monitoring library
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NvmlError {
    /// The library could not be located or loaded
    #[error("NVML library not found: {0}")]
    LibraryNotFound(String),

    /// The library loaded but lacks a required entry point
    #[error("NVML symbol missing: {0}")]
    SymbolMissing(String),

    /// The one-time subsystem init call failed
    #[error("Failed to initialize NVML: {0}")]
    InitializationFailed(String),

    /// No device handle for the requested index
    #[error("GPU device not found at index {0}")]
    DeviceNotFound(u32),

    /// A utilization query returned a failure code
    #[error("Utilization query failed: {0}")]
    QueryFailed(String),

    /// GPU is lost (fallen off bus, etc.)
    #[error("GPU is lost or has become inaccessible")]
    GpuLost,

    /// Unknown NVML error
    #[error("NVML error: {0}")]
    Unknown(String),
}

/// Errors from reading a usage provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// The provider never obtained a device handle
    #[error("Provider is not ready")]
    NotReady,

    /// The provider has been closed
    #[error("Provider is closed")]
    Closed,

    /// Both read attempts failed
    #[error("Read failed: {0}")]
    Read(#[from] NvmlError),
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
