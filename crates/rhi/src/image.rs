//! GPU image management.
//!
//! This module handles image creation, layout transitions, buffer-to-image
//! copies and mip chain generation. It covers the three image roles this
//! renderer needs:
//!
//! - multisampled color attachments (resolved into the swapchain image)
//! - depth attachments
//! - sampled textures uploaded from host pixel data

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool, submit_one_shot};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of mip levels for an image of the given dimensions.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Access masks and pipeline stages for a layout transition.
///
/// The masks match the operations on each side of the transition; an
/// unsupported pair is a programming error and is rejected.
fn barrier_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> RhiResult<(
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL) => Ok((
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        _ => Err(RhiError::InvalidHandle(format!(
            "Unsupported layout transition: {:?} -> {:?}",
            old_layout, new_layout
        ))),
    }
}

/// GPU image wrapper with managed memory and a default 2-D view.
///
/// Owns the image, its allocation and one image view. Dropped in reverse
/// creation order: view, then image, then allocation.
pub struct GpuImage {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// Default image view covering all mip levels.
    view: vk::ImageView,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Image format.
    format: vk::Format,
    /// Image extent.
    extent: vk::Extent2D,
    /// Number of mip levels.
    mip_levels: u32,
}

impl GpuImage {
    /// Creates a device-local 2-D image with the given parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if image creation, memory allocation or view
    /// creation fails.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: Arc<Device>,
        format: vk::Format,
        extent: vk::Extent2D,
        mip_levels: u32,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: &'static str,
    ) -> RhiResult<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created {} image: {}x{}, {:?}, {} mip level(s)",
            name, extent.width, extent.height, format, mip_levels
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format,
            extent,
            mip_levels,
        })
    }

    /// Creates a multisampled color attachment for MSAA rendering.
    ///
    /// The image is transient: it is rendered to and resolved within a single
    /// render pass and never sampled.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub fn color_attachment(
        device: Arc<Device>,
        format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        Self::new(
            device,
            format,
            extent,
            1,
            samples,
            vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
            "msaa color",
        )
    }

    /// Creates a depth attachment matching the MSAA sample count.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub fn depth_attachment(
        device: Arc<Device>,
        format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        Self::new(
            device,
            format,
            extent,
            1,
            samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            "depth",
        )
    }

    /// Creates a sampled texture with a full mip chain, uploading `pixels`
    /// through a staging buffer and generating the mips with per-level blits.
    ///
    /// `pixels` must be tightly packed in the given format (e.g. RGBA8 =
    /// `width * height * 4` bytes). The image ends in
    /// `SHADER_READ_ONLY_OPTIMAL` layout across all mip levels.
    ///
    /// # Errors
    ///
    /// Returns an error if creation, the staging upload or the mip blits fail.
    pub fn texture(
        device: Arc<Device>,
        pool: &CommandPool,
        format: vk::Format,
        extent: vk::Extent2D,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let mip_levels = mip_level_count(extent.width, extent.height);

        let image = Self::new(
            device.clone(),
            format,
            extent,
            mip_levels,
            vk::SampleCountFlags::TYPE_1,
            vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            vk::ImageAspectFlags::COLOR,
            "texture",
        )?;

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

        // Validate the transition pair up front so recording cannot fail
        let (src_access, dst_access, src_stage, dst_stage) = barrier_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        submit_one_shot(&device, pool, device.graphics_queue(), |cmd| {
            let barrier = image.layout_barrier(
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                src_access,
                dst_access,
                0,
                mip_levels,
            );
            cmd.pipeline_barrier(src_stage, dst_stage, &[barrier]);

            image.record_copy_from_buffer(cmd, staging.handle());
            image.record_generate_mipmaps(cmd);
        })?;

        // `staging` drops here, after the upload completed
        Ok(image)
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the default image view.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the number of mip levels.
    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Records a layout transition over a mip level range.
    ///
    /// # Errors
    ///
    /// Returns an error for transition pairs this renderer never performs.
    pub fn record_transition_layout(
        &self,
        cmd: &CommandBuffer,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        base_mip: u32,
        level_count: u32,
    ) -> RhiResult<()> {
        let (src_access, dst_access, src_stage, dst_stage) =
            barrier_masks(old_layout, new_layout)?;

        let barrier = self.layout_barrier(
            old_layout,
            new_layout,
            src_access,
            dst_access,
            base_mip,
            level_count,
        );
        cmd.pipeline_barrier(src_stage, dst_stage, &[barrier]);
        Ok(())
    }

    /// Records a full-extent copy from a tightly packed buffer into mip 0.
    ///
    /// The image must be in `TRANSFER_DST_OPTIMAL` layout.
    pub fn record_copy_from_buffer(&self, cmd: &CommandBuffer, src: vk::Buffer) {
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            });

        cmd.copy_buffer_to_image(src, self.image, &[region]);
    }

    /// Records mip chain generation by blitting each level from the previous
    /// one, with explicit layout transitions around every blit.
    ///
    /// On entry all levels must be in `TRANSFER_DST_OPTIMAL` layout; on exit
    /// the whole chain is in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn record_generate_mipmaps(&self, cmd: &CommandBuffer) {
        let mut mip_width = self.extent.width as i32;
        let mut mip_height = self.extent.height as i32;

        for level in 1..self.mip_levels {
            // Previous level becomes the blit source
            let to_src = self.layout_barrier(
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
                level - 1,
                1,
            );
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                &[to_src],
            );

            let next_width = (mip_width / 2).max(1);
            let next_height = (mip_height / 2).max(1);

            let blit = vk::ImageBlit::default()
                .src_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(level - 1)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .src_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: mip_width,
                        y: mip_height,
                        z: 1,
                    },
                ])
                .dst_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(level)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .dst_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D {
                        x: next_width,
                        y: next_height,
                        z: 1,
                    },
                ]);

            cmd.blit_image(
                self.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
            );

            // Source level is final; hand it to the fragment shader
            let to_shader = self.layout_barrier(
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::SHADER_READ,
                level - 1,
                1,
            );
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[to_shader],
            );

            mip_width = next_width;
            mip_height = next_height;
        }

        // The last level was only ever a blit destination
        let last = self.layout_barrier(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            self.mip_levels - 1,
            1,
        );
        cmd.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[last],
        );
    }

    /// Builds an image memory barrier for a mip level range of this image.
    fn layout_barrier(
        &self,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        base_mip: u32,
        level_count: u32,
    ) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(base_mip)
                    .level_count(level_count)
                    .base_array_layer(0)
                    .layer_count(1),
            )
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free image allocation: {:?}", e);
            }
        }

        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }

        debug!("Destroyed image");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(800, 600), 10);
    }

    #[test]
    fn test_barrier_masks_upload_chain() {
        // undefined -> transfer-dst: nothing before, transfer writes after
        let (src, dst, src_stage, dst_stage) = barrier_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src, vk::AccessFlags::empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        // transfer-dst -> shader-read: transfer writes before, shader reads after
        let (src, dst, src_stage, dst_stage) = barrier_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);
        assert_eq!(src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_barrier_masks_rejects_unknown_transition() {
        let result = barrier_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        );
        assert!(result.is_err());
    }
}
