//! Blackbox Common Utilities
//!
//! Shared infrastructure for all Blackbox crates:
//! - Error types and result aliases
//! - Clocks and the fixed-cadence frame scheduler
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
