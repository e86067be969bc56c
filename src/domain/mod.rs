//! Domain models for gpuload
//!
//! Value types with their range invariants enforced on construction.

pub mod utilization;

pub use utilization::{clamp_percent, Utilization, FAILURE_SENTINEL};
