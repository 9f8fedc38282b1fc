//! Vulkan Graphics Pipeline without fixed-function vertex input.

use crate::{
    CompareOp, CullMode, FrontFace, GraphicsPipeline, GraphicsPipelineDescriptor, LoadOp,
    PrimitiveTopology, StoreOp,
};
use ash::vk;
use std::ffi::CString;
use std::io::Cursor;

use super::super::descriptor;
use super::super::render_pass::{create_vk_render_pass, ColorAttachmentInfo, DepthAttachmentInfo};

pub struct VulkanGraphicsPipeline {
    pub(crate) device: ash::Device,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    /// Compatible render pass the pipeline was built against.
    pub(crate) render_pass: vk::RenderPass,
    pub(crate) _set_layout: Option<descriptor::VulkanDescriptorSetLayout>,
}

impl VulkanGraphicsPipeline {
    pub fn create(device: &ash::Device, desc: &GraphicsPipelineDescriptor) -> Result<Self, String> {
        let color_attachments: Vec<ColorAttachmentInfo> = desc
            .color_targets
            .iter()
            .map(|t| ColorAttachmentInfo {
                format: t.format,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            })
            .collect();
        let depth_attachment = desc.depth_stencil.as_ref().map(|ds| DepthAttachmentInfo {
            format: ds.format,
            depth_load_op: LoadOp::Load,
            depth_store_op: StoreOp::Store,
        });

        let mut modules = Vec::new();
        let result = Self::build(device, desc, &color_attachments, depth_attachment.as_ref(), &mut modules);
        for module in modules {
            unsafe {
                device.destroy_shader_module(module, None);
            }
        }
        result
    }

    fn build(
        device: &ash::Device,
        desc: &GraphicsPipelineDescriptor,
        color_attachments: &[ColorAttachmentInfo],
        depth_attachment: Option<&DepthAttachmentInfo>,
        modules: &mut Vec<vk::ShaderModule>,
    ) -> Result<Self, String> {
        let mut entry_names: Vec<CString> = Vec::new();
        let mut stage_flags = Vec::new();

        modules.push(create_shader_module(device, &desc.vertex_shader.source)?);
        entry_names.push(CString::new(desc.vertex_shader.entry_point.as_str()).map_err(|e| e.to_string())?);
        stage_flags.push(vk::ShaderStageFlags::VERTEX);
        if let Some(ref fs) = desc.fragment_shader {
            modules.push(create_shader_module(device, &fs.source)?);
            entry_names.push(CString::new(fs.entry_point.as_str()).map_err(|e| e.to_string())?);
            stage_flags.push(vk::ShaderStageFlags::FRAGMENT);
        }
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = modules
            .iter()
            .zip(&entry_names)
            .zip(&stage_flags)
            .map(|((module, name), stage)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(*stage)
                    .module(*module)
                    .name(name)
            })
            .collect();

        // Vertices are pulled from storage buffers by the vertex shader.
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.primitive_topology))
            .primitive_restart_enable(false);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(desc.rasterization.cull_mode))
            .front_face(front_face_to_vk(desc.rasterization.front_face));
        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
            .color_targets
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let depth_stencil = desc.depth_stencil.as_ref().map_or(
            vk::PipelineDepthStencilStateCreateInfo::default(),
            |ds| {
                vk::PipelineDepthStencilStateCreateInfo::default()
                    .depth_test_enable(true)
                    .depth_write_enable(ds.depth_write_enabled)
                    .depth_compare_op(compare_op_to_vk(ds.depth_compare))
            },
        );

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let set_layout = if desc.layout_bindings.is_empty() {
            None
        } else {
            Some(descriptor::create_descriptor_set_layout(device, &desc.layout_bindings)?)
        };
        let set_layouts: Vec<vk::DescriptorSetLayout> = set_layout.iter().map(|l| l.layout).collect();
        let layout_create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| format!("create_pipeline_layout: {e:?}"))?
        };

        let render_pass = match create_vk_render_pass(device, color_attachments, depth_attachment) {
            Ok(rp) => rp,
            Err(e) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(e);
            }
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match created {
            Ok(pipelines) => pipelines.first().copied().ok_or_else(|| "no pipeline created".to_string()),
            Err((_, res)) => Err(format!("create_graphics_pipelines: {res:?}")),
        };
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe {
                    device.destroy_render_pass(render_pass, None);
                    device.destroy_pipeline_layout(layout, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            device: device.clone(),
            pipeline,
            layout,
            render_pass,
            _set_layout: set_layout,
        })
    }
}

fn create_shader_module(device: &ash::Device, source: &[u8]) -> Result<vk::ShaderModule, String> {
    let code = ash::util::read_spv(&mut Cursor::new(source)).map_err(|e| format!("invalid SPIR-V: {e}"))?;
    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    unsafe {
        device
            .create_shader_module(&create_info, None)
            .map_err(|e| format!("create_shader_module: {e:?}"))
    }
}

fn topology_to_vk(t: PrimitiveTopology) -> vk::PrimitiveTopology {
    match t {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
    }
}

fn cull_mode_to_vk(c: CullMode) -> vk::CullModeFlags {
    match c {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::Front => vk::CullModeFlags::FRONT,
    }
}

fn front_face_to_vk(f: FrontFace) -> vk::FrontFace {
    match f {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

fn compare_op_to_vk(o: CompareOp) -> vk::CompareOp {
    match o {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

impl Drop for VulkanGraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

impl std::fmt::Debug for VulkanGraphicsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanGraphicsPipeline").finish()
    }
}

impl GraphicsPipeline for VulkanGraphicsPipeline {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
