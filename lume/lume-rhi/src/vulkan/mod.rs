//! Vulkan backend for Lume RHI.
//! Implements Device, Buffer, Texture, GraphicsPipeline, CommandEncoder, Fence, Semaphore
//! on a headless device with one graphics queue.

mod buffer;
mod descriptor;
mod memory;
mod pipeline;
mod queue;
mod render_pass;
mod texture;

use crate::{
    check_buffer_range, Buffer, BufferDescriptor, BufferUsage, CommandBuffer, CommandEncoder,
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBinding, Device, DeviceLimits, Fence,
    GraphicsPipeline, GraphicsPipelineDescriptor, RenderPass, RenderPassDescriptor, ResourceId,
    Semaphore, Texture, TextureDescriptor,
};
use ash::vk;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use buffer::VulkanBuffer;
pub use descriptor::{VulkanDescriptorPool, VulkanDescriptorSet, VulkanDescriptorSetLayout};
pub use pipeline::VulkanGraphicsPipeline;
pub use queue::VulkanQueue;
pub use texture::VulkanTexture;

use render_pass::{ColorAttachmentInfo, DepthAttachmentInfo, PassObjects};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

fn validation_requested() -> bool {
    cfg!(feature = "validation") || std::env::var("LUME_VALIDATION").is_ok_and(|v| v == "1")
}

pub struct VulkanDevice {
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    device: Arc<ash::Device>,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    memory_props: vk::PhysicalDeviceMemoryProperties,
    limits: DeviceLimits,
    next_id: AtomicU64,
}

struct Adapter {
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
    properties: vk::PhysicalDeviceProperties,
}

/// Prefer a discrete GPU; otherwise the first device with a graphics queue.
fn pick_adapter(instance: &ash::Instance) -> Result<Adapter, String> {
    let physical_devices = unsafe {
        instance
            .enumerate_physical_devices()
            .map_err(|e| format!("enumerate_physical_devices: {e:?}"))?
    };
    let mut candidates: Vec<Adapter> = physical_devices
        .into_iter()
        .filter_map(|physical_device| {
            let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            let queue_family_index = families
                .iter()
                .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))?
                as u32;
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            Some(Adapter {
                physical_device,
                queue_family_index,
                properties,
            })
        })
        .collect();
    candidates.sort_by_key(|a| a.properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU);
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| "No Vulkan physical device with a graphics queue".to_string())
}

impl VulkanDevice {
    /// Create a headless Vulkan device on the preferred physical device.
    pub fn new() -> Result<Arc<Self>, String> {
        let entry = unsafe { ash::Entry::load().map_err(|e| e.to_string())? };
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_2)
            .application_name(c"Lume")
            .engine_name(c"Lume");

        let mut layers = Vec::new();
        if validation_requested() {
            let available = unsafe { entry.enumerate_instance_layer_properties().unwrap_or_default() };
            let present = available
                .iter()
                .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER));
            if present {
                log::info!("Vulkan validation layer enabled");
                layers.push(VALIDATION_LAYER.as_ptr());
            } else {
                log::warn!("Vulkan validation requested but {VALIDATION_LAYER:?} is not installed");
            }
        }
        let instance_create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layers);
        let instance = unsafe {
            entry
                .create_instance(&instance_create_info, None)
                .map_err(|e| format!("create_instance: {e:?}"))?
        };

        match Self::with_instance(entry.clone(), instance.clone()) {
            Ok(device) => Ok(Arc::new(device)),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    fn with_instance(entry: ash::Entry, instance: ash::Instance) -> Result<Self, String> {
        let adapter = pick_adapter(&instance)?;
        let supported = unsafe { instance.get_physical_device_features(adapter.physical_device) };
        let enabled_features = vk::PhysicalDeviceFeatures::default()
            .multi_draw_indirect(supported.multi_draw_indirect == vk::TRUE)
            .draw_indirect_first_instance(supported.draw_indirect_first_instance == vk::TRUE);
        let device_limits = &adapter.properties.limits;
        let limits = DeviceLimits {
            min_storage_buffer_offset_alignment: device_limits.min_storage_buffer_offset_alignment.max(1),
            max_draw_indirect_count: device_limits.max_draw_indirect_count.max(1),
            multi_draw_indirect: supported.multi_draw_indirect == vk::TRUE,
            draw_indirect_first_instance: supported.draw_indirect_first_instance == vk::TRUE,
        };
        let name = adapter
            .properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::info!("Vulkan device: {name} ({limits:?})");

        let queue_priorities = [1.0f32];
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(adapter.queue_family_index)
            .queue_priorities(&queue_priorities);
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_features(&enabled_features);
        let device_raw = unsafe {
            instance
                .create_device(adapter.physical_device, &device_create_info, None)
                .map_err(|e| format!("create_device: {e:?}"))?
        };
        let queue = unsafe { device_raw.get_device_queue(adapter.queue_family_index, 0) };
        let command_pool_create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(adapter.queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match unsafe { device_raw.create_command_pool(&command_pool_create_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device_raw.destroy_device(None) };
                return Err(format!("create_command_pool: {e:?}"));
            }
        };
        let memory_props = unsafe { instance.get_physical_device_memory_properties(adapter.physical_device) };

        Ok(Self {
            entry,
            instance,
            device: Arc::new(device_raw),
            queue,
            command_pool,
            memory_props,
            limits,
            next_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> ResourceId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn vulkan_buffer(buffer: &dyn Buffer) -> Result<&VulkanBuffer, String> {
        buffer
            .as_any()
            .downcast_ref::<VulkanBuffer>()
            .ok_or_else(|| "Buffer is not a Vulkan buffer".to_string())
    }
}

fn buffer_usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    flags
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Device for VulkanDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Box<dyn Buffer>, String> {
        let size = desc.size.max(1);
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            self.device
                .create_buffer(&create_info, None)
                .map_err(|e| format!("create_buffer {:?}: {e:?}", desc.label))?
        };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = memory::allocate(
            &self.device,
            &self.memory_props,
            requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .and_then(|memory| unsafe {
            match self.device.bind_buffer_memory(buffer, memory, 0) {
                Ok(()) => Ok(memory),
                Err(e) => {
                    self.device.free_memory(memory, None);
                    Err(format!("bind_buffer_memory: {e:?}"))
                }
            }
        });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        Ok(Box::new(VulkanBuffer {
            device: Arc::clone(&self.device),
            buffer,
            memory,
            size,
            id: self.next_id(),
            label: desc.label,
        }))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<Box<dyn Texture>, String> {
        let tex = texture::create_texture(self.device.clone(), &self.memory_props, desc, self.next_id())?;
        Ok(Box::new(tex))
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<Box<dyn GraphicsPipeline>, String> {
        let pipe = VulkanGraphicsPipeline::create(&self.device, desc)?;
        Ok(Box::new(pipe))
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorSetLayoutBinding],
    ) -> Result<Box<dyn DescriptorSetLayout>, String> {
        let layout = descriptor::create_descriptor_set_layout(&self.device, bindings)?;
        Ok(Box::new(layout))
    }

    fn create_descriptor_pool(&self, max_sets: u32) -> Result<Box<dyn DescriptorPool>, String> {
        let pool = descriptor::create_descriptor_pool(&self.device, max_sets)?;
        Ok(Box::new(pool))
    }

    fn create_command_encoder(&self) -> Result<Box<dyn CommandEncoder>, String> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe {
            self.device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| format!("allocate_command_buffers: {e:?}"))?
        };
        let cmd = buffers.first().copied().ok_or("no command buffer allocated")?;
        // From here the encoder frees `cmd` on every path.
        let encoder = VulkanCommandEncoder {
            device: Arc::clone(&self.device),
            command_pool: self.command_pool,
            buffer: cmd,
            limits: self.limits,
            passes: Vec::new(),
            finished: false,
        };
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(|e| format!("begin_command_buffer: {e:?}"))?;
        }
        Ok(Box::new(encoder))
    }

    fn queue(&self) -> Result<Box<dyn crate::Queue>, String> {
        Ok(Box::new(VulkanQueue::new(self.device.clone(), self.queue)))
    }

    fn write_buffer(&self, buffer: &dyn Buffer, offset: u64, data: &[u8]) -> Result<(), String> {
        let vk_buf = Self::vulkan_buffer(buffer)?;
        check_buffer_range(vk_buf.size, offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }
        vk_buf.with_mapped(offset, data.len() as u64, |dst| unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        })
    }

    fn read_buffer(&self, buffer: &dyn Buffer, offset: u64, data: &mut [u8]) -> Result<(), String> {
        let vk_buf = Self::vulkan_buffer(buffer)?;
        check_buffer_range(vk_buf.size, offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len();
        vk_buf.with_mapped(offset, len as u64, |src| unsafe {
            std::ptr::copy_nonoverlapping(src.cast_const(), data.as_mut_ptr(), len);
        })
    }

    fn wait_idle(&self) -> Result<(), String> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| format!("device_wait_idle: {e:?}"))
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>, String> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe {
            self.device
                .create_fence(&create_info, None)
                .map_err(|e| format!("create_fence: {e:?}"))?
        };
        Ok(Box::new(VulkanFence {
            device: Arc::clone(&self.device),
            fence,
        }))
    }

    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>, String> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe {
            self.device
                .create_semaphore(&create_info, None)
                .map_err(|e| format!("create_semaphore: {e:?}"))?
        };
        Ok(Box::new(VulkanSemaphore {
            device: Arc::clone(&self.device),
            semaphore,
        }))
    }
}

struct VulkanCommandEncoder {
    device: Arc<ash::Device>,
    command_pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    limits: DeviceLimits,
    /// Per-pass objects; they must outlive execution of `buffer`.
    passes: Vec<PassObjects>,
    finished: bool,
}

impl Drop for VulkanCommandEncoder {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        unsafe {
            self.device.free_command_buffers(self.command_pool, &[self.buffer]);
            for pass in &self.passes {
                pass.destroy(&self.device);
            }
        }
    }
}

impl std::fmt::Debug for VulkanCommandEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandEncoder")
            .field("passes", &self.passes.len())
            .finish()
    }
}

fn texture_view(texture: &dyn Texture) -> Result<vk::ImageView, String> {
    texture
        .as_any()
        .downcast_ref::<VulkanTexture>()
        .map(|t| t.view)
        .ok_or_else(|| "attachment texture must be VulkanTexture".to_string())
}

impl CommandEncoder for VulkanCommandEncoder {
    fn begin_render_pass<'a>(&mut self, desc: RenderPassDescriptor<'a>) -> Result<Box<dyn RenderPass>, String> {
        let color_infos: Vec<ColorAttachmentInfo> = desc
            .color_attachments
            .iter()
            .map(|a| ColorAttachmentInfo {
                format: a.texture.format(),
                load_op: a.load_op,
                store_op: a.store_op,
            })
            .collect();
        let depth_info = desc.depth_stencil_attachment.as_ref().map(|d| DepthAttachmentInfo {
            format: d.texture.format(),
            depth_load_op: d.depth_load_op,
            depth_store_op: d.depth_store_op,
        });

        let mut image_views = desc
            .color_attachments
            .iter()
            .map(|a| texture_view(a.texture))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(ref d) = desc.depth_stencil_attachment {
            image_views.push(texture_view(d.texture)?);
        }

        let (width, height) = desc
            .color_attachments
            .first()
            .map(|a| a.texture.size())
            .or_else(|| desc.depth_stencil_attachment.as_ref().map(|d| d.texture.size()))
            .ok_or("render pass needs at least one attachment")?;
        let extent = vk::Extent2D { width, height };

        let vk_render_pass = render_pass::create_vk_render_pass(&self.device, &color_infos, depth_info.as_ref())?;
        let framebuffer_create_info = vk::FramebufferCreateInfo::default()
            .render_pass(vk_render_pass)
            .attachments(&image_views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = match unsafe { self.device.create_framebuffer(&framebuffer_create_info, None) } {
            Ok(fb) => fb,
            Err(e) => {
                unsafe { self.device.destroy_render_pass(vk_render_pass, None) };
                return Err(format!("create_framebuffer: {e:?}"));
            }
        };
        self.passes.push(PassObjects {
            render_pass: vk_render_pass,
            framebuffer,
        });

        let mut clear_values: Vec<vk::ClearValue> = desc
            .color_attachments
            .iter()
            .map(|att| {
                let c = att.clear_value.unwrap_or(crate::ClearColor {
                    r: 0.0,
                    g: 0.0,
                    b: 0.0,
                    a: 1.0,
                });
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [c.r, c.g, c.b, c.a],
                    },
                }
            })
            .collect();
        if let Some(ref d) = desc.depth_stencil_attachment {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: d.clear_depth,
                    stencil: 0,
                },
            });
        }

        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(vk_render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D::default().extent(extent))
            .clear_values(&clear_values);
        unsafe {
            self.device
                .cmd_begin_render_pass(self.buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        Ok(Box::new(render_pass::VulkanRenderPassRecorder::new(
            Arc::clone(&self.device),
            self.buffer,
            extent,
            self.limits.multi_draw_indirect,
            self.limits.max_draw_indirect_count,
        )))
    }

    fn finish(mut self: Box<Self>) -> Result<Box<dyn CommandBuffer>, String> {
        unsafe {
            self.device
                .end_command_buffer(self.buffer)
                .map_err(|e| format!("end_command_buffer: {e:?}"))?;
        }
        self.finished = true;
        Ok(Box::new(VulkanCommandBuffer {
            device: Arc::clone(&self.device),
            command_pool: self.command_pool,
            buffer: self.buffer,
            passes: std::mem::take(&mut self.passes),
        }))
    }
}

/// Recorded commands plus the render passes and framebuffers they reference.
/// Drop only after the fence of the submission that used it has signaled.
pub struct VulkanCommandBuffer {
    device: Arc<ash::Device>,
    command_pool: vk::CommandPool,
    pub(crate) buffer: vk::CommandBuffer,
    passes: Vec<PassObjects>,
}

impl Drop for VulkanCommandBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.free_command_buffers(self.command_pool, &[self.buffer]);
            for pass in &self.passes {
                pass.destroy(&self.device);
            }
        }
    }
}

impl std::fmt::Debug for VulkanCommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanCommandBuffer")
            .field("passes", &self.passes.len())
            .finish()
    }
}

impl CommandBuffer for VulkanCommandBuffer {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub(crate) struct VulkanFence {
    device: Arc<ash::Device>,
    pub(crate) fence: vk::Fence,
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

impl std::fmt::Debug for VulkanFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanFence").finish()
    }
}

impl Fence for VulkanFence {
    fn wait(&self, timeout_ns: u64) -> Result<bool, String> {
        match unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(format!("wait_for_fences: {e:?}")),
        }
    }

    fn reset(&self) -> Result<(), String> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(|e| format!("reset_fences: {e:?}"))
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub(crate) struct VulkanSemaphore {
    device: Arc<ash::Device>,
    pub(crate) semaphore: vk::Semaphore,
}

impl Drop for VulkanSemaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

impl std::fmt::Debug for VulkanSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSemaphore").finish()
    }
}

impl Semaphore for VulkanSemaphore {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_usage_combines_flags() {
        let flags = buffer_usage_to_vk(BufferUsage::STORAGE | BufferUsage::INDIRECT);
        assert!(flags.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
        assert!(flags.contains(vk::BufferUsageFlags::INDIRECT_BUFFER));
        assert!(!flags.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
        assert_eq!(buffer_usage_to_vk(BufferUsage::UNIFORM), vk::BufferUsageFlags::UNIFORM_BUFFER);
    }
}
