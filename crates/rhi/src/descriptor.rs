//! Descriptor set management.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Builder for descriptor set layout bindings.
#[derive(Default)]
pub struct DescriptorBindingBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorBindingBuilder<'a> {
    /// Creates an empty binding builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a uniform buffer binding.
    pub fn uniform_buffer(mut self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stages),
        );
        self
    }

    /// Adds a storage buffer binding.
    pub fn storage_buffer(mut self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(stages),
        );
        self
    }

    /// Returns the accumulated bindings.
    pub fn build(self) -> Vec<vk::DescriptorSetLayoutBinding<'a>> {
        self.bindings
    }
}

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Layout handle.
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a descriptor set layout from the given bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!("Created descriptor set layout ({} bindings)", bindings.len());

        Ok(Self { device, layout })
    }

    /// Returns the layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool wrapper.
///
/// Sets allocated from the pool are freed when the pool drops; they are not
/// returned individually.
pub struct DescriptorPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Pool handle.
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Creates a descriptor pool with the given per-type capacities.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!("Created descriptor pool (max {} sets)", max_sets);

        Ok(Self { device, pool })
    }

    /// Allocates one descriptor set per layout in `layouts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted or allocation fails.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        if layouts.is_empty() {
            return Err(RhiError::InvalidHandle(
                "Cannot allocate zero descriptor sets".to_string(),
            ));
        }

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// A single buffer write for [`update_buffer_descriptors`].
pub struct BufferWrite {
    /// Destination descriptor set.
    pub set: vk::DescriptorSet,
    /// Destination binding index.
    pub binding: u32,
    /// Descriptor type (uniform or storage buffer).
    pub descriptor_type: vk::DescriptorType,
    /// Buffer to bind.
    pub buffer: vk::Buffer,
    /// Byte offset into the buffer.
    pub offset: vk::DeviceSize,
    /// Bound range in bytes.
    pub range: vk::DeviceSize,
}

/// Writes buffer bindings into descriptor sets in one call.
pub fn update_buffer_descriptors(device: &Device, writes: &[BufferWrite]) {
    let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = writes
        .iter()
        .map(|w| {
            [vk::DescriptorBufferInfo::default()
                .buffer(w.buffer)
                .offset(w.offset)
                .range(w.range)]
        })
        .collect();

    let descriptor_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .zip(buffer_infos.iter())
        .map(|(w, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(w.set)
                .dst_binding(w.binding)
                .dst_array_element(0)
                .descriptor_type(w.descriptor_type)
                .buffer_info(info)
        })
        .collect();

    unsafe {
        device
            .handle()
            .update_descriptor_sets(&descriptor_writes, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_builder_orders_bindings() {
        let bindings = DescriptorBindingBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(1, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(2, vk::ShaderStageFlags::COMPUTE)
            .build();

        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(bindings[2].binding, 2);
        assert_eq!(bindings[2].descriptor_count, 1);
    }

    #[test]
    fn test_binding_builder_stage_flags() {
        let bindings = DescriptorBindingBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::COMPUTE)
            .build();

        assert!(bindings[0]
            .stage_flags
            .contains(vk::ShaderStageFlags::VERTEX));
        assert!(bindings[0]
            .stage_flags
            .contains(vk::ShaderStageFlags::COMPUTE));
    }
}
