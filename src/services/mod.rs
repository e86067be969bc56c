//! Service layer
//!
//! The polling loop that ties a usage provider to a stabilizer.

pub mod sampler;

pub use sampler::{Sampler, UsageSample};
