//! Vulkan Queue for non-blocking submit.

use crate::{CommandBuffer, Fence, Queue, Semaphore};
use ash::vk;
use std::sync::Arc;

use super::{VulkanCommandBuffer, VulkanFence, VulkanSemaphore};

pub struct VulkanQueue {
    pub device: Arc<ash::Device>,
    pub queue: vk::Queue,
}

impl VulkanQueue {
    pub fn new(device: Arc<ash::Device>, queue: vk::Queue) -> Self {
        Self { device, queue }
    }
}

impl std::fmt::Debug for VulkanQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanQueue").finish()
    }
}

fn semaphores(list: &[&dyn Semaphore]) -> Result<Vec<vk::Semaphore>, String> {
    list.iter()
        .map(|s| {
            s.as_any()
                .downcast_ref::<VulkanSemaphore>()
                .map(|vs| vs.semaphore)
                .ok_or_else(|| "Semaphore must be VulkanSemaphore".to_string())
        })
        .collect()
}

impl Queue for VulkanQueue {
    fn submit(
        &self,
        command_buffers: &[&dyn CommandBuffer],
        wait_semaphores: &[&dyn Semaphore],
        signal_semaphores: &[&dyn Semaphore],
        signal_fence: Option<&dyn Fence>,
    ) -> Result<(), String> {
        let vk_buffers = command_buffers
            .iter()
            .map(|b| {
                b.as_any()
                    .downcast_ref::<VulkanCommandBuffer>()
                    .map(|vb| vb.buffer)
                    .ok_or_else(|| "CommandBuffer must be VulkanCommandBuffer".to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;
        let wait_semas = semaphores(wait_semaphores)?;
        let signal_semas = semaphores(signal_semaphores)?;
        let fence = match signal_fence {
            Some(f) => f
                .as_any()
                .downcast_ref::<VulkanFence>()
                .map(|vf| vf.fence)
                .ok_or("Fence must be VulkanFence")?,
            None => vk::Fence::null(),
        };
        if vk_buffers.is_empty() && fence == vk::Fence::null() {
            return Ok(());
        }

        // Waits apply where indirect arguments and pulled vertices are first read.
        let wait_stages = vec![
            vk::PipelineStageFlags::DRAW_INDIRECT | vk::PipelineStageFlags::VERTEX_SHADER;
            wait_semas.len()
        ];

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&vk_buffers)
            .wait_semaphores(&wait_semas)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semas);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], fence)
                .map_err(|e| format!("queue submit: {e:?}"))?;
        }
        Ok(())
    }
}
