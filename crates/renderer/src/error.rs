//! Renderer error types.

use thiserror::Error;

/// Errors that can occur while setting up or driving the renderer.
#[derive(Debug, Error)]
pub enum RendererError {
    /// Error from the Vulkan abstraction layer.
    #[error("RHI error: {0}")]
    Rhi(#[from] nebula_rhi::RhiError),

    /// Error from the windowing/platform layer.
    #[error("Platform error: {0}")]
    Platform(#[from] nebula_core::Error),
}

/// Result type for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;
