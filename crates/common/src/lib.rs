//! ShotScope Common Utilities
//!
//! Shared infrastructure for all ShotScope crates:
//! - Error types and result aliases
//! - Clock and rate utilities for the sample stream
//! - Tracing/logging initialization
//! - Configuration loading and validation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
