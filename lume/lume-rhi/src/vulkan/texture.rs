//! Vulkan Texture: 2D VkImage with device-local memory and one view, used as a render target.

use crate::{ResourceId, Texture, TextureDescriptor, TextureFormat, TextureUsage};
use ash::vk;
use std::sync::Arc;

use super::memory;

/// Create a Vulkan texture from descriptor.
pub fn create_texture(
    device: Arc<ash::Device>,
    memory_props: &vk::PhysicalDeviceMemoryProperties,
    descriptor: &TextureDescriptor,
    id: ResourceId,
) -> Result<VulkanTexture, String> {
    let (width, height) = descriptor.size;
    let extent = vk::Extent3D {
        width: width.max(1),
        height: height.max(1),
        depth: 1,
    };
    let vk_format = texture_format_to_vk(descriptor.format);

    let create_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk_format)
        .extent(extent)
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(texture_usage_to_vk(descriptor.usage, descriptor.format))
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let image = unsafe {
        device
            .create_image(&create_info, None)
            .map_err(|e| format!("create_image: {e:?}"))?
    };

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory = match memory::allocate(
        &device,
        memory_props,
        requirements,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    ) {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e);
        }
    };

    let aspect_mask = if descriptor.format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };
    let view_create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(vk_format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe {
        device
            .bind_image_memory(image, memory, 0)
            .and_then(|()| device.create_image_view(&view_create_info, None))
    };
    let view = match view {
        Ok(view) => view,
        Err(e) => {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            return Err(format!("create_image_view: {e:?}"));
        }
    };

    Ok(VulkanTexture {
        device,
        image,
        memory,
        view,
        format: descriptor.format,
        size: (extent.width, extent.height),
        id,
    })
}

/// Vulkan texture with image, memory, and view.
pub struct VulkanTexture {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) image: vk::Image,
    pub(crate) memory: vk::DeviceMemory,
    pub(crate) view: vk::ImageView,
    pub(crate) format: TextureFormat,
    pub(crate) size: (u32, u32),
    pub(crate) id: ResourceId,
}

impl VulkanTexture {
    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

impl std::fmt::Debug for VulkanTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTexture")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("format", &self.format)
            .finish()
    }
}

impl Texture for VulkanTexture {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn format(&self) -> TextureFormat {
        self.format
    }
    fn size(&self) -> (u32, u32) {
        self.size
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub fn texture_format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::D32Float => vk::Format::D32_SFLOAT,
    }
}

pub fn texture_usage_to_vk(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::COPY_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        if format.is_depth() {
            flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_targets_get_depth_usage() {
        let flags = texture_usage_to_vk(TextureUsage::RENDER_ATTACHMENT, TextureFormat::D32Float);
        assert_eq!(flags, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        let flags = texture_usage_to_vk(
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
            TextureFormat::Rgba8Unorm,
        );
        assert_eq!(
            flags,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
        );
    }
}
