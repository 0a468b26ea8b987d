//! Frames-in-flight slot ring.
//!
//! Each slot owns everything one in-flight frame touches: its command
//! buffers, semaphores, fences, uniform buffer, and particle storage buffer.
//! The compute shader reads the previous slot's particle buffer and writes
//! the current slot's, so the buffers ping-pong across the ring.

use std::sync::Arc;

use nebula_rhi::buffer::{Buffer, BufferUsage, upload_via_staging};
use nebula_rhi::command::{CommandBuffer, CommandPool};
use nebula_rhi::descriptor::{BufferWrite, DescriptorPool, DescriptorSetLayout, update_buffer_descriptors};
use nebula_rhi::device::Device;
use nebula_rhi::sync::{Fence, MAX_FRAMES_IN_FLIGHT, Semaphore};
use nebula_rhi::vk;
use tracing::debug;

use crate::error::RendererResult;
use crate::particles::Particle;
use crate::ubo::SimParams;

/// Per-frame-in-flight resources.
pub struct FrameSlot {
    /// Command buffer for the graphics submission.
    pub graphics_cmd: CommandBuffer,
    /// Command buffer for the compute submission.
    pub compute_cmd: CommandBuffer,
    /// Signaled when the acquired swapchain image is ready to render to.
    pub image_available: Semaphore,
    /// Signaled when the graphics submission finishes; waited on by present.
    pub render_finished: Semaphore,
    /// Signaled when the compute submission finishes; waited on by the
    /// graphics submission at the vertex-input stage.
    pub compute_finished: Semaphore,
    /// Signaled when the slot's graphics submission completes.
    pub render_fence: Fence,
    /// Signaled when the slot's compute submission completes.
    pub compute_fence: Fence,
    /// Persistently mapped uniform buffer holding [`SimParams`].
    pub uniform: Buffer,
    /// Device-local particle buffer; compute output and vertex input.
    pub storage: Buffer,
    /// Compute descriptor set: slot uniform, previous slot's particles,
    /// this slot's particles.
    pub compute_set: vk::DescriptorSet,
    /// True while a compute-finished signal has not yet been consumed by a
    /// graphics submission. Set on compute submit, cleared on graphics
    /// submit; stays set across a dropped frame.
    pub compute_signal_pending: bool,
}

/// The ring of frame slots.
pub struct FrameSlotRing {
    slots: Vec<FrameSlot>,
    // Owns the compute descriptor sets; must outlive the slots' handles
    _descriptor_pool: DescriptorPool,
}

impl FrameSlotRing {
    /// Builds the slot ring and seeds every slot's particle buffer with the
    /// same initial state.
    ///
    /// Both fences start signaled so the first frame's waits pass
    /// immediately. Uploads go through `transfer_pool` on the graphics
    /// queue and complete before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation or the initial upload
    /// fails.
    pub fn new(
        device: Arc<Device>,
        graphics_pool: &CommandPool,
        compute_pool: &CommandPool,
        transfer_pool: &CommandPool,
        compute_set_layout: &DescriptorSetLayout,
        initial_particles: &[Particle],
    ) -> RendererResult<Self> {
        let slot_count = MAX_FRAMES_IN_FLIGHT;
        let particle_bytes: &[u8] = bytemuck::cast_slice(initial_particles);

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(slot_count as u32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(2 * slot_count as u32),
        ];
        let descriptor_pool =
            DescriptorPool::new(device.clone(), slot_count as u32, &pool_sizes)?;

        let layouts = vec![compute_set_layout.handle(); slot_count];
        let sets = descriptor_pool.allocate(&layouts)?;

        let mut slots = Vec::with_capacity(slot_count);
        for set in sets {
            let uniform = Buffer::new(device.clone(), BufferUsage::Uniform, SimParams::SIZE)?;

            let storage = Buffer::new(
                device.clone(),
                BufferUsage::Storage,
                particle_bytes.len() as vk::DeviceSize,
            )?;
            upload_via_staging(&device, transfer_pool, &storage, particle_bytes)?;

            slots.push(FrameSlot {
                graphics_cmd: CommandBuffer::new(device.clone(), graphics_pool)?,
                compute_cmd: CommandBuffer::new(device.clone(), compute_pool)?,
                image_available: Semaphore::new(device.clone())?,
                render_finished: Semaphore::new(device.clone())?,
                compute_finished: Semaphore::new(device.clone())?,
                render_fence: Fence::new(device.clone(), true)?,
                compute_fence: Fence::new(device.clone(), true)?,
                uniform,
                storage,
                compute_set: set,
                compute_signal_pending: false,
            });
        }

        // Each slot's compute reads the previous slot's particles and
        // writes its own
        let mut writes = Vec::with_capacity(3 * slot_count);
        for (i, slot) in slots.iter().enumerate() {
            let prev = &slots[(i + slot_count - 1) % slot_count];
            writes.push(BufferWrite {
                set: slot.compute_set,
                binding: 0,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                buffer: slot.uniform.handle(),
                offset: 0,
                range: SimParams::SIZE,
            });
            writes.push(BufferWrite {
                set: slot.compute_set,
                binding: 1,
                descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                buffer: prev.storage.handle(),
                offset: 0,
                range: prev.storage.size(),
            });
            writes.push(BufferWrite {
                set: slot.compute_set,
                binding: 2,
                descriptor_type: vk::DescriptorType::STORAGE_BUFFER,
                buffer: slot.storage.handle(),
                offset: 0,
                range: slot.storage.size(),
            });
        }
        update_buffer_descriptors(&device, &writes);

        debug!("Frame slot ring created ({} slots)", slot_count);

        Ok(Self {
            slots,
            _descriptor_pool: descriptor_pool,
        })
    }

    /// Returns the number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns whether the ring is empty (it never is after construction).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the slot at `index`.
    #[inline]
    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Returns the slot at `index` mutably.
    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut FrameSlot {
        &mut self.slots[index]
    }
}
