//! Error type for the Vulkan abstraction layer.

use thiserror::Error;

/// Errors from the Vulkan abstraction.
///
/// Raw `vk::Result` codes, loader failures, and allocator failures convert
/// automatically; the remaining variants classify setup failures that have
/// no Vulkan error code of their own.
#[derive(Error, Debug)]
pub enum RhiError {
    /// A Vulkan call returned an error code.
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// The Vulkan library could not be loaded.
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// Memory allocation failed (including no compatible memory type).
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No physical device satisfies the queue and feature requirements.
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// The surface reports no formats or no present modes.
    #[error("Surface unsupported: {0}")]
    SurfaceUnsupported(String),

    /// SPIR-V could not be read or is malformed.
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Pipeline construction was misconfigured.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A caller passed an invalid size, range, or empty request.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

/// Result alias for rhi operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
