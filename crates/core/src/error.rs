//! Shared error type for the platform layer.

use thiserror::Error;

/// Errors raised outside the Vulkan abstraction, mostly windowing.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or handle retrieval failed.
    #[error("Window error: {0}")]
    Window(String),

    /// Surface creation or another Vulkan call failed before the rhi layer
    /// was involved.
    #[error("Vulkan error: {0}")]
    Vulkan(String),
}

/// Result alias for platform operations.
pub type Result<T> = std::result::Result<T, Error>;
