//! Platform abstraction layer for the particle renderer.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Raw window handles for Vulkan surface creation

mod window;

pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
