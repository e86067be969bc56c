//! Provider for hosts without a supported GPU backend

use crate::error::UsageError;
use crate::usage::UsageProvider;

/// Provider that is never available and never yields a reading
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableProvider;

impl UsageProvider for UnavailableProvider {
    fn try_read_usage(&self) -> Result<u8, UsageError> {
        Err(UsageError::NotReady)
    }

    fn is_available(&self) -> bool {
        false
    }

    fn close(&self) {}
}
