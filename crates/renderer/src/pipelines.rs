//! Pipeline and descriptor layout wiring.

use std::path::Path;
use std::sync::Arc;

use nebula_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout};
use nebula_rhi::device::Device;
use nebula_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout, PrimitiveTopology};
use nebula_rhi::render_pass::RenderPass;
use nebula_rhi::shader::{Shader, ShaderStage};
use nebula_rhi::vk;
use tracing::info;

use crate::error::RendererResult;
use crate::particles::Particle;

/// Workgroup width of the particle compute shader.
pub const COMPUTE_LOCAL_SIZE: u32 = 256;

/// The two pipelines of the particle renderer plus their layouts.
///
/// Pipelines are built once at startup and survive swapchain recreation;
/// viewport and scissor are dynamic state.
pub struct PipelineSet {
    compute_set_layout: DescriptorSetLayout,
    compute_layout: PipelineLayout,
    // Kept alive for the graphics pipeline; it has no descriptor sets to
    // bind, so nothing reads it after creation.
    _graphics_layout: PipelineLayout,
    compute: Pipeline,
    graphics: Pipeline,
}

impl PipelineSet {
    /// Loads the SPIR-V shaders from `shader_dir` and builds both pipelines.
    ///
    /// The compute descriptor layout has three bindings: the slot's uniform
    /// buffer, the previous slot's particle buffer (read), and the current
    /// slot's particle buffer (written). The graphics pipeline has no
    /// descriptors; it reads particles as vertex input.
    ///
    /// # Errors
    ///
    /// Returns an error if a shader file is missing or invalid, or pipeline
    /// creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        samples: vk::SampleCountFlags,
        shader_dir: &Path,
    ) -> RendererResult<Self> {
        let vert = Shader::from_spirv_file(
            device.clone(),
            shader_dir.join("particle.vert.spv"),
            ShaderStage::Vertex,
        )?;
        let frag = Shader::from_spirv_file(
            device.clone(),
            shader_dir.join("particle.frag.spv"),
            ShaderStage::Fragment,
        )?;
        let comp = Shader::from_spirv_file(
            device.clone(),
            shader_dir.join("particle.comp.spv"),
            ShaderStage::Compute,
        )?;

        let bindings = DescriptorBindingBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(1, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(2, vk::ShaderStageFlags::COMPUTE)
            .build();
        let compute_set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;

        let compute_layout =
            PipelineLayout::new(device.clone(), &[compute_set_layout.handle()])?;
        let graphics_layout = PipelineLayout::new(device.clone(), &[])?;

        let compute = Pipeline::new_compute(device.clone(), &compute_layout, &comp)?;

        let graphics = GraphicsPipelineBuilder::new(device)
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .vertex_input(
                vec![Particle::binding_description()],
                Particle::attribute_descriptions(),
            )
            .topology(PrimitiveTopology::PointList)
            .samples(samples)
            .depth_test(true)
            .blend(true)
            .build(&graphics_layout, render_pass)?;

        info!("Pipelines created ({:?} MSAA)", samples);

        Ok(Self {
            compute_set_layout,
            compute_layout,
            _graphics_layout: graphics_layout,
            compute,
            graphics,
        })
    }

    /// Returns the compute descriptor set layout.
    #[inline]
    pub fn compute_set_layout(&self) -> &DescriptorSetLayout {
        &self.compute_set_layout
    }

    /// Returns the compute pipeline layout.
    #[inline]
    pub fn compute_layout(&self) -> &PipelineLayout {
        &self.compute_layout
    }

    /// Returns the compute pipeline.
    #[inline]
    pub fn compute(&self) -> &Pipeline {
        &self.compute
    }

    /// Returns the graphics pipeline.
    #[inline]
    pub fn graphics(&self) -> &Pipeline {
        &self.graphics
    }
}
