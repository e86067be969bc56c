//! GPU usage providers
//!
//! A provider yields one GPU load percentage per call. Internally every read
//! is a `Result`; `read_usage_percent` is the boundary where errors collapse
//! into [`FAILURE_SENTINEL`].

pub mod native;
pub mod unavailable;

pub use native::NvmlUsageProvider;
pub use unavailable::UnavailableProvider;

use crate::domain::FAILURE_SENTINEL;
use crate::error::UsageError;

/// Capability to read a GPU usage percentage
pub trait UsageProvider: Send + Sync {
    /// Read the current GPU usage (0-100)
    fn try_read_usage(&self) -> Result<u8, UsageError>;

    /// Whether the backing library can be located at all
    fn is_available(&self) -> bool;

    /// Release this provider's claim on its backend
    ///
    /// Idempotent; safe to call on a provider that never became ready.
    fn close(&self);

    /// Read the current GPU usage, or `-1` on any failure
    fn read_usage_percent(&self) -> i32 {
        match self.try_read_usage() {
            Ok(percent) => i32::from(percent),
            Err(e) => {
                log::debug!("GPU usage read failed: {}", e);
                FAILURE_SENTINEL
            }
        }
    }
}

impl<P: UsageProvider + ?Sized> UsageProvider for Box<P> {
    fn try_read_usage(&self) -> Result<u8, UsageError> {
        (**self).try_read_usage()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn close(&self) {
        (**self).close()
    }

    fn read_usage_percent(&self) -> i32 {
        (**self).read_usage_percent()
    }
}
