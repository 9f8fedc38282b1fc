//! Vulkan memory selection and allocation for buffers and images.

use ash::vk;

/// Index of the first memory type allowed by `type_bits` that has all of `required`.
pub(crate) fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        let allowed = type_bits & (1 << i) != 0;
        allowed && props.memory_types[i as usize].property_flags.contains(required)
    })
}

/// Allocate memory satisfying `requirements` with all of `required` property flags.
pub(crate) fn allocate(
    device: &ash::Device,
    props: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    required: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory, String> {
    let memory_type_index = find_memory_type(props, requirements.memory_type_bits, required)
        .ok_or_else(|| format!("no memory type with {required:?}"))?;
    let allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);
    unsafe {
        device
            .allocate_memory(&allocate_info, None)
            .map_err(|e| format!("allocate_memory: {e:?}"))
    }
}
