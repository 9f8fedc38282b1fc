//! Vulkan Buffer implementation: a VkBuffer bound to its own host-coherent allocation.

use crate::{Buffer, ResourceId};
use ash::vk;
use std::sync::Arc;

pub struct VulkanBuffer {
    pub device: Arc<ash::Device>,
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: u64,
    pub id: ResourceId,
    pub label: Option<&'static str>,
}

impl VulkanBuffer {
    /// Map `len` bytes at `offset` and hand the pointer to `f`. The range must already be checked.
    pub(crate) fn with_mapped<R>(
        &self,
        offset: u64,
        len: u64,
        f: impl FnOnce(*mut u8) -> R,
    ) -> Result<R, String> {
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, offset, len, vk::MemoryMapFlags::empty())
                .map_err(|e| format!("map_memory: {e:?}"))?;
            let result = f(ptr.cast::<u8>());
            self.device.unmap_memory(self.memory);
            Ok(result)
        }
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

impl std::fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuffer")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("size", &self.size)
            .finish()
    }
}

impl Buffer for VulkanBuffer {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn size(&self) -> u64 {
        self.size
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
