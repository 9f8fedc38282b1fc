//! Vulkan Descriptor Set Layout, Pool, and Set.

use crate::{
    check_buffer_range, Buffer, DescriptorPool, DescriptorSet, DescriptorSetLayout,
    DescriptorSetLayoutBinding, DescriptorType, ShaderStages,
};
use ash::vk;

pub struct VulkanDescriptorSetLayout {
    pub device: ash::Device,
    pub layout: vk::DescriptorSetLayout,
    /// Bindings used to create this layout; sets allocated from it look up descriptor types here.
    pub bindings: Vec<DescriptorSetLayoutBinding>,
}

impl Drop for VulkanDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

impl std::fmt::Debug for VulkanDescriptorSetLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDescriptorSetLayout")
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

impl DescriptorSetLayout for VulkanDescriptorSetLayout {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub fn descriptor_type_to_vk(t: DescriptorType) -> vk::DescriptorType {
    match t {
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
    }
}

pub fn shader_stages_to_vk(s: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if s.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if s.contains(ShaderStages::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    flags
}

pub fn create_descriptor_set_layout(
    device: &ash::Device,
    bindings: &[DescriptorSetLayoutBinding],
) -> Result<VulkanDescriptorSetLayout, String> {
    let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
        .iter()
        .map(|b| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(b.binding)
                .descriptor_type(descriptor_type_to_vk(b.descriptor_type))
                .descriptor_count(b.count)
                .stage_flags(shader_stages_to_vk(b.stages))
        })
        .collect();
    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
    let layout = unsafe {
        device
            .create_descriptor_set_layout(&create_info, None)
            .map_err(|e| format!("create_descriptor_set_layout: {e:?}"))?
    };
    Ok(VulkanDescriptorSetLayout {
        device: device.clone(),
        layout,
        bindings: bindings.to_vec(),
    })
}

/// Descriptors of each type reserved per set.
const DESCRIPTORS_PER_SET: u32 = 8;

pub fn create_descriptor_pool(device: &ash::Device, max_sets: u32) -> Result<VulkanDescriptorPool, String> {
    let per_type = max_sets.max(1) * DESCRIPTORS_PER_SET;
    let pool_sizes = [DescriptorType::UniformBuffer, DescriptorType::StorageBuffer].map(|ty| {
        vk::DescriptorPoolSize::default()
            .ty(descriptor_type_to_vk(ty))
            .descriptor_count(per_type)
    });
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(max_sets.max(1))
        .pool_sizes(&pool_sizes);
    let pool = unsafe {
        device
            .create_descriptor_pool(&create_info, None)
            .map_err(|e| format!("create_descriptor_pool: {e:?}"))?
    };
    Ok(VulkanDescriptorPool {
        device: device.clone(),
        pool,
        max_sets,
    })
}

/// Owns the pool; sets allocated from it are freed when the pool is destroyed.
pub struct VulkanDescriptorPool {
    pub device: ash::Device,
    pub pool: vk::DescriptorPool,
    pub max_sets: u32,
}

impl Drop for VulkanDescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

impl std::fmt::Debug for VulkanDescriptorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDescriptorPool")
            .field("max_sets", &self.max_sets)
            .finish()
    }
}

impl DescriptorPool for VulkanDescriptorPool {
    fn allocate_set(&self, layout: &dyn DescriptorSetLayout) -> Result<Box<dyn DescriptorSet>, String> {
        let vk_layout = layout
            .as_any()
            .downcast_ref::<VulkanDescriptorSetLayout>()
            .ok_or("Layout must be VulkanDescriptorSetLayout")?;
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(std::slice::from_ref(&vk_layout.layout));
        let sets = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(|e| format!("allocate_descriptor_sets: {e:?}"))?
        };
        let set = sets.first().copied().ok_or("no descriptor set allocated")?;
        Ok(Box::new(VulkanDescriptorSet {
            device: self.device.clone(),
            set,
            bindings: vk_layout.bindings.clone(),
        }))
    }
}

pub struct VulkanDescriptorSet {
    pub device: ash::Device,
    pub set: vk::DescriptorSet,
    bindings: Vec<DescriptorSetLayoutBinding>,
}

impl std::fmt::Debug for VulkanDescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDescriptorSet").finish()
    }
}

impl DescriptorSet for VulkanDescriptorSet {
    fn write_buffer(&mut self, binding: u32, buffer: &dyn Buffer, offset: u64, range: u64) -> Result<(), String> {
        let descriptor_type = self
            .bindings
            .iter()
            .find(|b| b.binding == binding)
            .map(|b| b.descriptor_type)
            .ok_or_else(|| format!("write_buffer: binding {binding} not found in layout"))?;
        let range = if range > 0 {
            range
        } else {
            buffer.size().saturating_sub(offset)
        };
        check_buffer_range(buffer.size(), offset, range)?;
        let vk_buf = buffer
            .as_any()
            .downcast_ref::<super::buffer::VulkanBuffer>()
            .ok_or("Buffer must be VulkanBuffer")?;
        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(vk_buf.buffer)
            .offset(offset)
            .range(range);
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(descriptor_type_to_vk(descriptor_type))
            .buffer_info(std::slice::from_ref(&buffer_info));
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
