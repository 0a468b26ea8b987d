//! Frame orchestration.
//!
//! [`Renderer`] owns the whole Vulkan object graph and drives the per-frame
//! algorithm: wait on the slot's compute fence, submit the particle
//! simulation, wait on the render fence, acquire a swapchain image, record
//! and submit the graphics work, present, advance the ring. Stale and
//! suboptimal surfaces are recovered internally by recreating the
//! swapchain; every other submission failure propagates to the run loop.

use std::path::Path;
use std::sync::Arc;

use nebula_core::Clock;
use nebula_platform::{Surface, Window};
use nebula_rhi::command::CommandPool;
use nebula_rhi::device::Device;
use nebula_rhi::RhiError;
use nebula_rhi::instance::Instance;
use nebula_rhi::physical_device::select_physical_device;
use nebula_rhi::swapchain::Swapchain;
use nebula_rhi::sync::FENCE_TIMEOUT_NS;
use nebula_rhi::vk;
use tracing::{debug, info};

use crate::error::RendererResult;
use crate::frame_slots::FrameSlotRing;
use crate::particles::{self, PARTICLE_COUNT};
use crate::pipelines::{COMPUTE_LOCAL_SIZE, PipelineSet};
use crate::schedule::{self, AcquirePlan};
use crate::targets::RenderTargets;
use crate::ubo::SimParams;

/// GPU particle renderer.
///
/// Field order is drop order: per-frame resources first, then pipelines and
/// attachments, then the swapchain, pools, device, surface, and instance
/// last. Wrappers hold `Arc<Device>`, so the device itself is destroyed
/// only after everything created from it.
pub struct Renderer {
    frame_index: u64,
    resize_requested: bool,
    window_extent: (u32, u32),
    clock: Clock,

    slots: FrameSlotRing,
    pipelines: PipelineSet,
    targets: RenderTargets,
    swapchain: Swapchain,
    // Kept alive for the command buffers allocated from them
    _graphics_pool: CommandPool,
    _compute_pool: CommandPool,
    _transfer_pool: CommandPool,
    device: Arc<Device>,
    // Kept alive until everything created from them is destroyed
    _surface: Surface,
    _instance: Instance,
}

impl Renderer {
    /// Brings up the full Vulkan stack for `window` and seeds the particle
    /// simulation.
    ///
    /// Validation layers are enabled in debug builds when available.
    /// Compiled SPIR-V is loaded from `shader_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if no suitable GPU is found, the surface is
    /// unsupported, or any Vulkan object creation fails.
    pub fn new(window: &Window, shader_dir: &Path) -> RendererResult<Self> {
        let instance = Instance::new(cfg!(debug_assertions))?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let gpu_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let samples = gpu_info.max_msaa_samples();
        info!(
            "Using {} ({}) with {:?} MSAA",
            gpu_info.device_name(),
            gpu_info.device_type_name(),
            samples
        );

        let device = Device::new(&instance, &gpu_info)?;

        let swapchain = Swapchain::new(
            device.clone(),
            instance.handle(),
            surface.loader().clone(),
            surface.handle(),
            window.width(),
            window.height(),
        )?;

        let targets = RenderTargets::new(device.clone(), &swapchain, samples)?;
        let pipelines =
            PipelineSet::new(device.clone(), targets.render_pass(), samples, shader_dir)?;

        let families = device.queue_families();
        let graphics_family = families.graphics_family.ok_or(RhiError::NoSuitableGpu)?;
        let compute_family = families.compute_family.ok_or(RhiError::NoSuitableGpu)?;

        let graphics_pool = CommandPool::new(device.clone(), graphics_family)?;
        let compute_pool = CommandPool::new(device.clone(), compute_family)?;
        let transfer_pool = CommandPool::new_transient(device.clone(), graphics_family)?;

        let aspect = window.height() as f32 / window.width() as f32;
        let initial = particles::seed_particles(PARTICLE_COUNT, aspect);

        let slots = FrameSlotRing::new(
            device.clone(),
            &graphics_pool,
            &compute_pool,
            &transfer_pool,
            pipelines.compute_set_layout(),
            &initial,
        )?;

        info!("Renderer initialized ({} particles)", PARTICLE_COUNT);

        Ok(Self {
            frame_index: 0,
            resize_requested: false,
            window_extent: (window.width(), window.height()),
            clock: Clock::new(),
            slots,
            pipelines,
            targets,
            swapchain,
            _graphics_pool: graphics_pool,
            _compute_pool: compute_pool,
            _transfer_pool: transfer_pool,
            device,
            _surface: surface,
            _instance: instance,
        })
    }

    /// Records that the window was resized. Consumed by the next
    /// [`Self::draw_frame`], which recreates the swapchain after presenting.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        self.window_extent = (width, height);
        self.resize_requested = true;
        debug!("Resize requested: {}x{}", width, height);
    }

    /// Simulates and draws one frame.
    ///
    /// A stale surface drops the frame (no submit, no present), recreates
    /// the swapchain and returns without error; the frame index does not
    /// advance. A minimized window (zero extent) is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error for submission or presentation failures other than
    /// stale/suboptimal surfaces, and for fence waits exceeding the
    /// operational timeout (treated as device loss).
    pub fn draw_frame(&mut self) -> RendererResult<()> {
        let (width, height) = self.window_extent;
        if !schedule::extent_is_renderable(width, height) {
            return Ok(());
        }

        let s = schedule::slot_index(self.frame_index, self.slots.len());
        let delta_ms = self.clock.tick().as_secs_f32() * 1000.0;

        if schedule::run_compute_stage(self.slots.slot(s).compute_signal_pending) {
            self.submit_compute(s, delta_ms)?;
            self.slots.slot_mut(s).compute_signal_pending = true;
        }

        self.slots.slot(s).render_fence.wait(FENCE_TIMEOUT_NS)?;

        let acquire = self
            .swapchain
            .acquire_next_image(self.slots.slot(s).image_available.handle())?;

        let (image_index, acquired_suboptimal) = match schedule::plan_acquire(acquire) {
            AcquirePlan::SkipAndRecreate => {
                // Frame dropped wholesale; the slot's fence stays signaled
                // and its semaphores were not consumed
                self.recreate()?;
                return Ok(());
            }
            AcquirePlan::Render {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
        };

        self.slots.slot(s).render_fence.reset()?;
        self.record_graphics(s, image_index)?;
        self.submit_graphics(s)?;
        self.slots.slot_mut(s).compute_signal_pending = false;

        let outcome = self.swapchain.present(
            self.device.present_queue(),
            image_index,
            self.slots.slot(s).render_finished.handle(),
        )?;

        let resize = std::mem::take(&mut self.resize_requested);
        if schedule::should_recreate_after_present(outcome, acquired_suboptimal, resize) {
            self.recreate()?;
        }

        self.frame_index += 1;
        Ok(())
    }

    /// Runs the compute stage for slot `s`: waits for the slot's previous
    /// compute work, writes the simulation parameters, and submits the
    /// particle update signaling the slot's compute-finished semaphore.
    fn submit_compute(&self, s: usize, delta_ms: f32) -> RendererResult<()> {
        let slot = self.slots.slot(s);

        slot.compute_fence.wait(FENCE_TIMEOUT_NS)?;
        slot.uniform
            .write_data(0, SimParams { delta_time: delta_ms }.as_bytes())?;
        slot.compute_fence.reset()?;

        let cmd = &slot.compute_cmd;
        cmd.reset()?;
        cmd.begin()?;
        let pipeline = self.pipelines.compute();
        cmd.bind_pipeline(pipeline.bind_point(), pipeline.handle());
        cmd.bind_descriptor_sets(
            pipeline.bind_point(),
            self.pipelines.compute_layout().handle(),
            0,
            &[slot.compute_set],
        );
        cmd.dispatch(
            schedule::dispatch_group_count(PARTICLE_COUNT, COMPUTE_LOCAL_SIZE),
            1,
            1,
        );
        cmd.end()?;

        let command_buffers = [cmd.handle()];
        let signal_semaphores = [slot.compute_finished.handle()];
        let submit = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_compute(&[submit], slot.compute_fence.handle())?;
        }
        Ok(())
    }

    /// Re-records slot `s`'s graphics command buffer against the acquired
    /// image's framebuffer.
    fn record_graphics(&self, s: usize, image_index: u32) -> RendererResult<()> {
        let slot = self.slots.slot(s);
        let extent = self.swapchain.extent();

        let cmd = &slot.graphics_cmd;
        cmd.reset()?;
        cmd.begin()?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
            // Resolve attachment is never cleared; placeholder for index 2
            vk::ClearValue::default(),
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.targets.render_pass().handle())
            .framebuffer(self.targets.framebuffer(image_index).handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        cmd.begin_render_pass(&begin_info);
        let pipeline = self.pipelines.graphics();
        cmd.bind_pipeline(pipeline.bind_point(), pipeline.handle());

        let viewport = vk::Viewport::default()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);
        cmd.set_viewport(&viewport);

        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        cmd.set_scissor(&scissor);

        // The compute output buffer is the vertex source
        cmd.bind_vertex_buffers(0, &[slot.storage.handle()], &[0]);
        cmd.draw(PARTICLE_COUNT, 1, 0, 0);

        cmd.end_render_pass();
        cmd.end()?;
        Ok(())
    }

    /// Submits slot `s`'s graphics command buffer, waiting on the slot's
    /// compute-finished and image-available semaphores at their matching
    /// stages.
    fn submit_graphics(&self, s: usize) -> RendererResult<()> {
        let slot = self.slots.slot(s);

        let (wait_semaphores, wait_stages) = schedule::graphics_wait_info(
            slot.compute_finished.handle(),
            slot.image_available.handle(),
        );
        let command_buffers = [slot.graphics_cmd.handle()];
        let signal_semaphores = [slot.render_finished.handle()];

        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit], slot.render_fence.handle())?;
        }
        Ok(())
    }

    /// Recreates the swapchain and rebuilds the size-dependent render
    /// targets. Deferred while the window extent is zero (minimized).
    fn recreate(&mut self) -> RendererResult<()> {
        let (width, height) = self.window_extent;
        if !schedule::extent_is_renderable(width, height) {
            // Keep the request alive; retried once the extent is non-zero
            self.resize_requested = true;
            return Ok(());
        }

        self.swapchain.recreate(width, height)?;
        self.targets.rebuild(&self.swapchain)?;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // No slot resource may be destroyed while its submission is in
        // flight
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle during shutdown: {:?}", e);
        }
        info!("Renderer shut down after {} frames", self.frame_index);
    }
}
