//! Lume RHI: backend-agnostic rendering hardware interface.
//!
//! The traits cover what an indirect, vertex-pulling renderer needs: host-visible buffers,
//! offscreen render targets, one graphics pipeline with a single descriptor set, and
//! multi-draw indirect recording. Every backend object releases its GPU resources on drop.

use std::any::Any;
use std::fmt::Debug;

/// Unique identifier for a GPU resource.
pub type ResourceId = u64;

bitflags::bitflags! {
    /// Buffer usage flags; combine for buffers bound in several ways (e.g. STORAGE | INDIRECT).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        const UNIFORM = 1 << 0;
        const STORAGE = 1 << 1;
        const INDIRECT = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    D32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::D32Float)
    }
}

/// Device properties that shape buffer layout and draw submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of a storage-buffer binding offset, in bytes.
    pub min_storage_buffer_offset_alignment: u64,
    /// Largest `draw_count` a single indirect draw may use.
    pub max_draw_indirect_count: u32,
    /// Whether one indirect call may issue more than one draw.
    pub multi_draw_indirect: bool,
    /// Whether indirect commands may use a non-zero `first_instance`.
    pub draw_indirect_first_instance: bool,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_storage_buffer_offset_alignment: 256,
            max_draw_indirect_count: u32::MAX,
            multi_draw_indirect: true,
            draw_indirect_first_instance: true,
        }
    }
}

/// The core device trait that all backends must implement.
pub trait Device: Send + Sync + Debug {
    fn limits(&self) -> DeviceLimits;

    /// Create a buffer backed by host-visible, host-coherent memory.
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Box<dyn Buffer>, String>;
    fn create_texture(&self, desc: &TextureDescriptor) -> Result<Box<dyn Texture>, String>;
    /// Create a graphics pipeline. The pipeline is created against a compatible render pass:
    /// the [`RenderPassDescriptor`] passed to [`CommandEncoder::begin_render_pass`] must use the
    /// same color/depth formats as `color_targets` and `depth_stencil`.
    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<Box<dyn GraphicsPipeline>, String>;
    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorSetLayoutBinding],
    ) -> Result<Box<dyn DescriptorSetLayout>, String>;
    fn create_descriptor_pool(&self, max_sets: u32) -> Result<Box<dyn DescriptorPool>, String>;

    /// Create a command encoder for recording GPU commands.
    fn create_command_encoder(&self) -> Result<Box<dyn CommandEncoder>, String>;

    /// Get the main (graphics) queue for submissions.
    fn queue(&self) -> Result<Box<dyn Queue>, String>;

    /// Copy bytes into a buffer. Fails when `offset + data.len()` exceeds the buffer size.
    /// The memory is coherent: the write is visible to work submitted afterwards.
    fn write_buffer(&self, buffer: &dyn Buffer, offset: u64, data: &[u8]) -> Result<(), String>;

    /// Copy bytes out of a buffer. Fails when the range exceeds the buffer size.
    fn read_buffer(&self, buffer: &dyn Buffer, offset: u64, data: &mut [u8]) -> Result<(), String>;

    /// Wait for the device to become idle (all submitted work finished).
    fn wait_idle(&self) -> Result<(), String>;

    /// Create a fence for CPU-GPU synchronization.
    fn create_fence(&self, signaled: bool) -> Result<Box<dyn Fence>, String>;
    /// Create a semaphore for GPU-GPU synchronization.
    fn create_semaphore(&self) -> Result<Box<dyn Semaphore>, String>;
}

/// Fence: CPU can wait for GPU to complete submitted work.
pub trait Fence: Send + Sync + Debug {
    /// Returns `Ok(false)` when the timeout elapsed before the fence was signaled.
    fn wait(&self, timeout_ns: u64) -> Result<bool, String>;
    fn reset(&self) -> Result<(), String>;
    fn as_any(&self) -> &dyn Any;
}

/// Semaphore: GPU-GPU synchronization between submissions.
pub trait Semaphore: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

/// Queue for submitting work. Does not block.
/// The caller must keep command_buffers alive until the signal_fence has been waited on.
pub trait Queue: Send + Sync + Debug {
    fn submit(
        &self,
        command_buffers: &[&dyn CommandBuffer],
        wait_semaphores: &[&dyn Semaphore],
        signal_semaphores: &[&dyn Semaphore],
        signal_fence: Option<&dyn Fence>,
    ) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<&'static str>,
    pub size: u64,
    pub usage: BufferUsage,
}

impl Default for BufferDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: 0,
            usage: BufferUsage::STORAGE,
        }
    }
}

pub trait Buffer: Send + Sync + Debug {
    fn id(&self) -> ResourceId;
    fn size(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<&'static str>,
    /// (width, height).
    pub size: (u32, u32),
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: (1, 1),
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_ATTACHMENT,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const RENDER_ATTACHMENT = 1 << 1;
    }
}

pub trait Texture: Send + Sync + Debug {
    fn id(&self) -> ResourceId;
    fn format(&self) -> TextureFormat;
    fn size(&self) -> (u32, u32);
    fn as_any(&self) -> &dyn Any;
}

/// Graphics pipeline for rasterization (vertex + fragment).
pub trait GraphicsPipeline: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

/// Descriptor for creating a graphics pipeline. There is no fixed-function vertex input:
/// shaders fetch vertices from storage buffers.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor {
    pub label: Option<&'static str>,
    pub vertex_shader: ShaderStage,
    pub fragment_shader: Option<ShaderStage>,
    pub primitive_topology: PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub color_targets: Vec<ColorTargetState>,
    pub depth_stencil: Option<DepthStencilState>,
    /// Bindings of descriptor set 0. Used to create the pipeline layout.
    pub layout_bindings: Vec<DescriptorSetLayoutBinding>,
}

#[derive(Debug, Clone)]
pub struct ShaderStage {
    pub source: Vec<u8>, // SPIR-V bytes
    pub entry_point: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
}

#[derive(Debug, Clone, Default)]
pub struct RasterizationState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone)]
pub struct ColorTargetState {
    pub format: TextureFormat,
}

#[derive(Debug, Clone)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Render pass descriptor for begin_render_pass.
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor<'a> {
    pub label: Option<&'static str>,
    pub color_attachments: Vec<ColorAttachment<'a>>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment<'a>>,
}

#[derive(Debug, Clone)]
pub struct ColorAttachment<'a> {
    pub texture: &'a dyn Texture,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: Option<ClearColor>,
}

#[derive(Debug, Clone, Copy)]
pub struct ClearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Debug, Clone)]
pub struct DepthStencilAttachment<'a> {
    pub texture: &'a dyn Texture,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub clear_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

pub trait CommandEncoder: Debug {
    fn begin_render_pass<'a>(
        &mut self,
        desc: RenderPassDescriptor<'a>,
    ) -> Result<Box<dyn RenderPass>, String>;
    fn finish(self: Box<Self>) -> Result<Box<dyn CommandBuffer>, String>;
}

/// Render pass for recording draw calls.
pub trait RenderPass: Debug {
    fn set_pipeline(&mut self, pipeline: &dyn GraphicsPipeline);
    /// Bind a descriptor set for the currently bound graphics pipeline (set_index must match layout).
    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet);
    /// Issue `draw_count` non-indexed draws whose parameters are read from `buffer`, starting at
    /// byte `offset`, `stride` bytes apart. Each record matches `VkDrawIndirectCommand`.
    /// Devices without multi-draw indirect get one call per record, with the same result.
    fn draw_indirect(&mut self, buffer: &dyn Buffer, offset: u64, draw_count: u32, stride: u32);
    fn end(self: Box<Self>);
}

/// Descriptor binding type for layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
}

/// Descriptor set layout binding.
#[derive(Debug, Clone)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStages,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
    }
}

/// Descriptor set layout.
pub trait DescriptorSetLayout: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

/// Descriptor pool for allocating sets.
pub trait DescriptorPool: Send + Sync + Debug {
    fn allocate_set(&self, layout: &dyn DescriptorSetLayout) -> Result<Box<dyn DescriptorSet>, String>;
}

/// Descriptor set for binding resources.
pub trait DescriptorSet: Send + Sync + Debug {
    /// Bind `range` bytes of `buffer` starting at `offset`. A zero range binds the rest of the buffer.
    fn write_buffer(&mut self, binding: u32, buffer: &dyn Buffer, offset: u64, range: u64) -> Result<(), String>;
    fn as_any(&self) -> &dyn Any;
}

pub trait CommandBuffer: Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

/// Checks that `len` bytes at `offset` fit in a buffer of `size` bytes.
pub fn check_buffer_range(size: u64, offset: u64, len: u64) -> Result<(), String> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(format!(
            "range {offset}..{} exceeds buffer size {size}",
            offset.saturating_add(len)
        )),
    }
}

#[cfg(feature = "vulkan")]
pub mod vulkan;

#[cfg(feature = "vulkan")]
pub use vulkan::VulkanDevice;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_range_checks() {
        assert!(check_buffer_range(64, 0, 64).is_ok());
        assert!(check_buffer_range(64, 60, 4).is_ok());
        assert!(check_buffer_range(64, 60, 8).is_err());
        assert!(check_buffer_range(64, u64::MAX, 2).is_err());
        assert!(check_buffer_range(0, 0, 0).is_ok());
    }
}
