//! Core utilities for the particle renderer.
//!
//! This crate provides foundational types used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame clock

mod clock;
mod error;
mod logging;

pub use clock::Clock;
pub use error::{Error, Result};
pub use logging::init_logging;
