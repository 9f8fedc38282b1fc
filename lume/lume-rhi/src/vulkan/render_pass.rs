//! Vulkan Render Pass creation and recording.

use crate::{Buffer, DescriptorSet, GraphicsPipeline, LoadOp, StoreOp};
use ash::vk;
use std::sync::Arc;

use super::buffer::VulkanBuffer;
use super::descriptor::VulkanDescriptorSet;
use super::pipeline::VulkanGraphicsPipeline;
use super::texture::texture_format_to_vk;

/// Create a VkRenderPass from attachment formats and load/store ops.
/// Pipelines are built against one of these; begin_render_pass creates a compatible one per pass.
pub fn create_vk_render_pass(
    device: &ash::Device,
    color_attachments: &[ColorAttachmentInfo],
    depth_attachment: Option<&DepthAttachmentInfo>,
) -> Result<vk::RenderPass, String> {
    let mut attachments = Vec::new();
    let mut color_refs = Vec::new();
    let mut depth_ref = None;

    for (i, att) in color_attachments.iter().enumerate() {
        let (load_op, store_op) = (load_op_to_vk(att.load_op), store_op_to_vk(att.store_op));
        let format = texture_format_to_vk(att.format);
        attachments.push(
            vk::AttachmentDescription::default()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(load_op)
                .store_op(store_op)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
        color_refs.push(
            vk::AttachmentReference::default()
                .attachment(i as u32)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
    }

    if let Some(dep) = depth_attachment {
        let idx = attachments.len();
        attachments.push(
            vk::AttachmentDescription::default()
                .format(texture_format_to_vk(dep.format))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(load_op_to_vk(dep.depth_load_op))
                .store_op(store_op_to_vk(dep.depth_store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
        depth_ref = Some(
            vk::AttachmentReference::default()
                .attachment(idx as u32)
                .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
    }

    let subpass = if let Some(ref d) = depth_ref {
        vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(d)
    } else {
        vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
    };

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass));

    unsafe {
        device
            .create_render_pass(&create_info, None)
            .map_err(|e| format!("create_render_pass: {e:?}"))
    }
}

pub struct ColorAttachmentInfo {
    pub format: crate::TextureFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

pub struct DepthAttachmentInfo {
    pub format: crate::TextureFormat,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
}

fn load_op_to_vk(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
    }
}

fn store_op_to_vk(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

/// Render pass and framebuffer created for one pass. The command encoder owns them until the
/// recorded command buffer is dropped.
pub(crate) struct PassObjects {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
}

impl PassObjects {
    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_framebuffer(self.framebuffer, None);
        device.destroy_render_pass(self.render_pass, None);
    }
}

/// Vulkan render pass recording - implements RenderPass trait.
pub struct VulkanRenderPassRecorder {
    pub(crate) device: Arc<ash::Device>,
    pub(crate) command_buffer: vk::CommandBuffer,
    pub(crate) extent: vk::Extent2D,
    pub(crate) pipeline_layout: Option<vk::PipelineLayout>,
    multi_draw_indirect: bool,
    max_draw_indirect_count: u32,
}

impl VulkanRenderPassRecorder {
    pub(crate) fn new(
        device: Arc<ash::Device>,
        command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
        multi_draw_indirect: bool,
        max_draw_indirect_count: u32,
    ) -> Self {
        Self {
            device,
            command_buffer,
            extent,
            pipeline_layout: None,
            multi_draw_indirect,
            max_draw_indirect_count,
        }
    }
}

/// Splits `draw_count` records into `(first_record, count)` calls of at most `max_per_call` records.
pub(crate) fn indirect_batches(draw_count: u32, max_per_call: u32) -> impl Iterator<Item = (u32, u32)> {
    let step = max_per_call.max(1);
    (0..draw_count)
        .step_by(step as usize)
        .map(move |first| (first, step.min(draw_count - first)))
}

impl crate::RenderPass for VulkanRenderPassRecorder {
    fn set_pipeline(&mut self, pipeline: &dyn GraphicsPipeline) {
        let Some(vk_pipe) = pipeline.as_any().downcast_ref::<VulkanGraphicsPipeline>() else {
            log::warn!("set_pipeline: not a Vulkan pipeline, ignored");
            return;
        };
        unsafe {
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk_pipe.pipeline,
            );
            // Viewport and scissor are dynamic; cover the full attachment.
            let viewport = vk::Viewport::default()
                .width(self.extent.width as f32)
                .height(self.extent.height as f32)
                .max_depth(1.0);
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            let scissor = vk::Rect2D::default().extent(self.extent);
            self.device.cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
        self.pipeline_layout = Some(vk_pipe.layout);
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet) {
        let Some(layout) = self.pipeline_layout else {
            log::warn!("bind_descriptor_set before set_pipeline, ignored");
            return;
        };
        if let Some(vk_set) = set.as_any().downcast_ref::<VulkanDescriptorSet>() {
            unsafe {
                self.device.cmd_bind_descriptor_sets(
                    self.command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    set_index,
                    &[vk_set.set],
                    &[],
                );
            }
        }
    }

    fn draw_indirect(&mut self, buffer: &dyn Buffer, offset: u64, draw_count: u32, stride: u32) {
        let Some(vk_buf) = buffer.as_any().downcast_ref::<VulkanBuffer>() else {
            log::warn!("draw_indirect: not a Vulkan buffer, ignored");
            return;
        };
        let max_per_call = if self.multi_draw_indirect {
            self.max_draw_indirect_count
        } else {
            1
        };
        for (first, count) in indirect_batches(draw_count, max_per_call) {
            unsafe {
                self.device.cmd_draw_indirect(
                    self.command_buffer,
                    vk_buf.buffer,
                    offset + u64::from(first) * u64::from(stride),
                    count,
                    stride,
                );
            }
        }
    }

    fn end(self: Box<Self>) {
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
        }
    }
}

impl std::fmt::Debug for VulkanRenderPassRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanRenderPassRecorder")
            .field("extent", &self.extent)
            .field("multi_draw_indirect", &self.multi_draw_indirect)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_cover_every_record_once() {
        let batches: Vec<_> = indirect_batches(10, 4).collect();
        assert_eq!(batches, vec![(0, 4), (4, 4), (8, 2)]);
        let single: Vec<_> = indirect_batches(3, 1).collect();
        assert_eq!(single, vec![(0, 1), (1, 1), (2, 1)]);
        assert_eq!(indirect_batches(0, 8).count(), 0);
        assert_eq!(indirect_batches(5, u32::MAX).collect::<Vec<_>>(), vec![(0, 5)]);
    }
}
