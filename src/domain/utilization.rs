//! Utilization domain types
//!
//! Percentages reported by the native layer arrive as unsigned integers the
//! caller does not fully trust, so every constructor clamps to 0-100.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value returned at the provider boundary when no reading is available
pub const FAILURE_SENTINEL: i32 = -1;

/// GPU and memory utilization rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Utilization {
    /// GPU compute utilization (0-100%)
    pub gpu: u8,
    /// Memory bandwidth utilization (0-100%)
    pub memory: u8,
}

impl Utilization {
    /// Create a new utilization value
    pub fn new(gpu: u8, memory: u8) -> Self {
        Self {
            gpu: gpu.min(100),
            memory: memory.min(100),
        }
    }

    /// Build from the raw unsigned fields of the native structure
    pub fn from_raw(gpu: u32, memory: u32) -> Self {
        Self {
            gpu: clamp_percent(gpu),
            memory: clamp_percent(memory),
        }
    }

    /// Get GPU utilization as percentage
    pub fn gpu_percent(&self) -> u8 {
        self.gpu
    }

    /// Get memory bandwidth utilization as percentage
    pub fn memory_percent(&self) -> u8 {
        self.memory
    }
}

impl fmt::Display for Utilization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPU {}%, memory {}%", self.gpu, self.memory)
    }
}

/// Clamp an unsigned native percentage into 0-100
pub fn clamp_percent(raw: u32) -> u8 {
    raw.min(100) as u8
}
