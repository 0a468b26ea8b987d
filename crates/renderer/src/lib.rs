//! GPU particle renderer built on the Vulkan abstraction layer.
//!
//! A compute pass advances the particle simulation each frame, writing into
//! per-frame storage buffers that the graphics pass then reads as vertex
//! input. Two frames are kept in flight; the swapchain is recreated on
//! resize and surface staleness without surfacing errors to the caller.

pub mod error;
pub mod frame_slots;
pub mod particles;
pub mod pipelines;
pub mod renderer;
pub mod schedule;
pub mod targets;
pub mod ubo;

pub use error::{RendererError, RendererResult};
pub use renderer::Renderer;
