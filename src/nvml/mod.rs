//! NVML abstraction layer
//!
//! Trait-based access to the native library plus its shared lifecycle.

pub mod library;
pub mod shared;
pub mod traits;

pub use library::NvmlLibrary;
pub use shared::{NvmlLease, SharedNvml};
pub use traits::{DeviceHandle, NativeBackend};
