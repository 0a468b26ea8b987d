//! Render pass attachments and framebuffers.
//!
//! The render pass survives swapchain recreation (the surface format does
//! not change); the size-dependent attachments and framebuffers are rebuilt
//! in place.

use std::sync::Arc;

use nebula_rhi::device::Device;
use nebula_rhi::image::GpuImage;
use nebula_rhi::render_pass::{Framebuffer, RenderPass};
use nebula_rhi::swapchain::Swapchain;
use nebula_rhi::vk;
use tracing::debug;

use crate::error::RendererResult;

/// Depth attachment format.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Size-dependent render targets: MSAA color, depth, and one framebuffer
/// per swapchain image, all bound to a single render pass.
pub struct RenderTargets {
    device: Arc<Device>,
    render_pass: RenderPass,
    samples: vk::SampleCountFlags,
    // Rebuilt on every swapchain recreation
    framebuffers: Vec<Framebuffer>,
    depth: GpuImage,
    color: GpuImage,
}

impl RenderTargets {
    /// Creates the render pass and the attachments for the current
    /// swapchain size.
    ///
    /// # Errors
    ///
    /// Returns an error if any attachment or framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        swapchain: &Swapchain,
        samples: vk::SampleCountFlags,
    ) -> RendererResult<Self> {
        let render_pass =
            RenderPass::new(device.clone(), swapchain.format(), DEPTH_FORMAT, samples)?;

        let (color, depth, framebuffers) =
            Self::build_attachments(&device, &render_pass, swapchain, samples)?;

        Ok(Self {
            device,
            render_pass,
            samples,
            framebuffers,
            depth,
            color,
        })
    }

    /// Rebuilds the attachments and framebuffers after swapchain recreation,
    /// keeping the render pass.
    ///
    /// The caller must ensure no GPU work still references the old
    /// attachments; swapchain recreation waits for device idle, which
    /// covers this.
    ///
    /// # Errors
    ///
    /// Returns an error if attachment or framebuffer creation fails.
    pub fn rebuild(&mut self, swapchain: &Swapchain) -> RendererResult<()> {
        let (color, depth, framebuffers) =
            Self::build_attachments(&self.device, &self.render_pass, swapchain, self.samples)?;

        // Old attachments drop here, after the new ones were built
        self.color = color;
        self.depth = depth;
        self.framebuffers = framebuffers;

        debug!(
            "Rebuilt render targets at {}x{}",
            swapchain.extent().width,
            swapchain.extent().height
        );
        Ok(())
    }

    fn build_attachments(
        device: &Arc<Device>,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        samples: vk::SampleCountFlags,
    ) -> RendererResult<(GpuImage, GpuImage, Vec<Framebuffer>)> {
        let extent = swapchain.extent();

        let color =
            GpuImage::color_attachment(device.clone(), swapchain.format(), extent, samples)?;
        let depth = GpuImage::depth_attachment(device.clone(), DEPTH_FORMAT, extent, samples)?;

        let framebuffers = swapchain
            .views()
            .iter()
            .map(|&swapchain_view| {
                // Attachment order fixed by the render pass
                let attachments = [color.view(), depth.view(), swapchain_view];
                Framebuffer::new(device.clone(), render_pass, &attachments, extent)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((color, depth, framebuffers))
    }

    /// Returns the render pass.
    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Returns the framebuffer for a swapchain image index.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> &Framebuffer {
        &self.framebuffers[image_index as usize]
    }

    /// Returns the MSAA sample count.
    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}
