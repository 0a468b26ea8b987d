//! Swapchain management.
//!
//! The swapchain owns its images and views and classifies every interaction
//! with the presentation engine: acquisition and presentation report whether
//! the swapchain is still usable, merely suboptimal, or stale and in need of
//! recreation. Callers never see raw `ERROR_OUT_OF_DATE_KHR`.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Outcome of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAcquire {
    /// An image was acquired and may be rendered to.
    Acquired {
        /// Index of the acquired image.
        index: u32,
        /// The swapchain no longer matches the surface exactly but the image
        /// is still usable; recreate after presenting.
        suboptimal: bool,
    },
    /// The swapchain no longer matches the surface. No image was acquired
    /// and the wait semaphore was not signaled; recreate and retry.
    Stale,
}

/// Outcome of presenting a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was presented.
    Ok,
    /// The image was presented but the swapchain should be recreated.
    Suboptimal,
    /// The swapchain no longer matches the surface; recreate before the
    /// next frame.
    Stale,
}

/// Surface capabilities, formats and present modes for a device/surface pair.
pub struct SwapchainSupportDetails {
    /// Surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any surface query fails.
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// Picks the surface format, preferring B8G8R8A8 sRGB.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .unwrap_or(formats[0])
}

/// Picks the present mode, preferring MAILBOX with FIFO as the guaranteed
/// fallback.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Resolves the swapchain extent from surface capabilities and the window's
/// framebuffer size.
///
/// `u32::MAX` in `current_extent` means the surface takes its size from the
/// swapchain; in that case the window size is clamped to the supported range.
/// The result is always at least 1x1 so swapchain creation cannot be handed
/// a zero extent.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_width: u32,
    window_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window_width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width)
            .max(1),
        height: window_height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height)
            .max(1),
    }
}

/// Number of swapchain images to request: one more than the minimum so
/// acquisition rarely blocks, capped at the surface maximum (0 = unlimited).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

/// Swapchain wrapper owning the images, views and loader.
pub struct Swapchain {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Swapchain extension loader.
    loader: ash::khr::swapchain::Device,
    /// Surface extension loader.
    surface_loader: ash::khr::surface::Instance,
    /// Presentation surface.
    surface: vk::SurfaceKHR,
    /// Swapchain handle.
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the swapchain itself).
    images: Vec<vk::Image>,
    /// One view per swapchain image.
    views: Vec<vk::ImageView>,
    /// Selected surface format.
    format: vk::SurfaceFormatKHR,
    /// Current extent.
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a swapchain for the given surface sized to the window.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceUnsupported`] if the surface reports no
    /// formats or present modes, or a Vulkan error if creation fails.
    pub fn new(
        device: Arc<Device>,
        instance: &ash::Instance,
        surface_loader: ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        window_width: u32,
        window_height: u32,
    ) -> RhiResult<Self> {
        let loader = ash::khr::swapchain::Device::new(instance, device.handle());

        let mut swapchain = Self {
            device,
            loader,
            surface_loader,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
        };

        swapchain.create(window_width, window_height)?;
        Ok(swapchain)
    }

    /// Builds (or rebuilds) the swapchain, handing the previous handle to
    /// the driver as `old_swapchain`.
    fn create(&mut self, window_width: u32, window_height: u32) -> RhiResult<()> {
        let support = SwapchainSupportDetails::query(
            &self.surface_loader,
            self.device.physical_device(),
            self.surface,
        )?;

        if support.formats.is_empty() {
            return Err(RhiError::SurfaceUnsupported(
                "Surface reports no formats".to_string(),
            ));
        }
        if support.present_modes.is_empty() {
            return Err(RhiError::SurfaceUnsupported(
                "Surface reports no present modes".to_string(),
            ));
        }

        let format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, window_width, window_height);
        let image_count = determine_image_count(&support.capabilities);

        let families = self.device.queue_families();
        let graphics = families.graphics_family.ok_or(RhiError::NoSuitableGpu)?;
        let present = families.present_family.ok_or(RhiError::NoSuitableGpu)?;
        let family_indices = [graphics, present];

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        if graphics != present {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices);
        } else {
            create_info = create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
        }

        let new_swapchain = unsafe { self.loader.create_swapchain(&create_info, None)? };

        self.destroy_current();
        self.swapchain = new_swapchain;
        self.format = format;
        self.extent = extent;
        self.images = unsafe { self.loader.get_swapchain_images(new_swapchain)? };

        self.views = self
            .images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );
                unsafe { self.device.handle().create_image_view(&view_info, None) }
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Swapchain: {} images, {:?}, {:?}, {}x{}",
            self.images.len(),
            format.format,
            present_mode,
            extent.width,
            extent.height
        );

        Ok(())
    }

    /// Recreates the swapchain after the surface changed.
    ///
    /// Waits for the device to go idle first, then rebuilds against the
    /// current surface state. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns an error if the device wait or swapchain creation fails.
    pub fn recreate(&mut self, window_width: u32, window_height: u32) -> RhiResult<()> {
        self.device.wait_idle()?;
        debug!("Recreating swapchain at {}x{}", window_width, window_height);
        self.create(window_width, window_height)
    }

    /// Acquires the next swapchain image, signaling `semaphore` when the
    /// image is ready to be rendered to.
    ///
    /// A stale swapchain is reported as [`ImageAcquire::Stale`], not as an
    /// error; in that case the semaphore was not signaled and may be reused.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that recreation cannot fix, such
    /// as device loss.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<ImageAcquire> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(ImageAcquire::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(ImageAcquire::Stale),
            Err(e) => Err(e.into()),
        }
    }

    /// Presents image `index` on `queue` once `wait_semaphore` signals.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that recreation cannot fix.
    pub fn present(
        &self,
        queue: vk::Queue,
        index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let indices = [index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe { self.loader.queue_present(queue, &present_info) };

        match result {
            Ok(false) => Ok(PresentOutcome::Ok),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the swapchain image views.
    #[inline]
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Returns the surface format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    /// Returns the current extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Destroys the current views and swapchain handle, if any.
    fn destroy_current(&mut self) {
        unsafe {
            for &view in &self.views {
                self.device.handle().destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
        }
        self.views.clear();
        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_current();
        debug!("Destroyed swapchain");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
        min_images: u32,
        max_images: u32,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: min_images,
            max_image_count: max_images,
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_bgra_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_choose_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current_when_fixed() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096), 2, 0);
        let extent = choose_extent(&caps, 1920, 1080);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_choose_extent_clamps_window_size() {
        let caps = capabilities((u32::MAX, u32::MAX), (64, 64), (2048, 2048), 2, 0);
        let extent = choose_extent(&caps, 4000, 32);
        assert_eq!(extent.width, 2048);
        assert_eq!(extent.height, 64);
    }

    #[test]
    fn test_choose_extent_never_yields_zero() {
        // A minimized window reports zero; the extent must stay valid
        let caps = capabilities((u32::MAX, u32::MAX), (0, 0), (4096, 4096), 2, 0);
        let extent = choose_extent(&caps, 0, 0);
        assert_eq!(extent.width, 1);
        assert_eq!(extent.height, 1);
    }

    #[test]
    fn test_determine_image_count_requests_one_extra() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096), 2, 0);
        assert_eq!(determine_image_count(&caps), 3);
    }

    #[test]
    fn test_determine_image_count_respects_maximum() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096), 3, 3);
        assert_eq!(determine_image_count(&caps), 3);
    }
}
