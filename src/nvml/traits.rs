//! Trait definitions for the native monitoring library
//!
//! The four entry points the rest of the crate needs from the vendor library.
//! `NvmlLibrary` binds them to the real shared object; `mock::MockBackend`
//! scripts them for tests.

use crate::domain::Utilization;
use crate::error::NvmlError;

use nvml_wrapper_sys::bindings::nvmlDevice_t;

/// Opaque device handle handed out by the native library
///
/// Stored as an address so that it stays `Send + Sync`; it is only ever
/// turned back into a pointer when passed to the backend that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    /// Wrap a raw NVML device pointer
    pub fn from_raw(raw: nvmlDevice_t) -> Self {
        Self(raw as usize)
    }

    /// Recover the raw NVML device pointer
    pub fn as_raw(self) -> nvmlDevice_t {
        self.0 as nvmlDevice_t
    }

    /// Build a handle from an arbitrary token (fake backends)
    pub fn from_token(token: usize) -> Self {
        Self(token)
    }

    /// The token or address behind this handle
    pub fn token(self) -> usize {
        self.0
    }
}

/// Native monitoring library operations
///
/// Implementations must be callable from any thread. Every call is treated as
/// bounded and synchronous; no timeout is applied at this layer.
pub trait NativeBackend: Send + Sync {
    /// One-time subsystem init
    fn init(&self) -> Result<(), NvmlError>;

    /// Subsystem shutdown
    fn shutdown(&self) -> Result<(), NvmlError>;

    /// Look up the device handle for an index
    fn device_handle(&self, index: u32) -> Result<DeviceHandle, NvmlError>;

    /// Query utilization rates for a device
    ///
    /// Percentages are clamped to 0-100 by the returned `Utilization`.
    fn utilization(&self, device: DeviceHandle) -> Result<Utilization, NvmlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_token_round_trip() {
        let handle = DeviceHandle::from_token(0x1000);
        assert_eq!(handle.token(), 0x1000);
        assert_eq!(DeviceHandle::from_raw(handle.as_raw()), handle);
    }
}
