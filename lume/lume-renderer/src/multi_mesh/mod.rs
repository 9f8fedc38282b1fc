//! Multi-mesh renderer: the whole scene drawn by one indirect multi-draw per frame.
//!
//! The vertex shader pulls everything it needs from storage buffers. Instance `i` reads draw-data
//! row `i`, fetches `indices[row.index_offset + vertex_index]`, adds `row.vertex_offset` and
//! reads the interleaved vertex at that position. No per-mesh state changes are recorded.

mod geometry;
mod indirect;

pub use geometry::GeometryLayout;
pub use indirect::{build_indirect_commands, DrawIndirectCommand, DRAW_INDIRECT_COMMAND_SIZE};

use bytemuck::{Pod, Zeroable};
use log::{debug, info};
use lume_mesh::{load_draw_data, load_mesh_data, DrawData, Error, MeshData, Result, VertexLayout};
use lume_rhi::{
    Buffer, BufferDescriptor, BufferUsage, ColorTargetState, CompareOp, DepthStencilState,
    DescriptorPool, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorType,
    Device, GraphicsPipeline, GraphicsPipelineDescriptor, PrimitiveTopology, RasterizationState,
    RenderPass, ShaderStage, ShaderStages,
};
use std::path::Path;
use std::sync::Arc;

use crate::config::{MultiMeshConfig, MultiMeshShaders};

pub type Mat4 = [[f32; 4]; 4];

pub const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Descriptor bindings of set 0.
pub mod bindings {
    pub const UNIFORMS: u32 = 0;
    pub const VERTICES: u32 = 1;
    pub const INDICES: u32 = 2;
    pub const DRAW_DATA: u32 = 3;
    pub const TRANSFORMS: u32 = 4;
}

/// Uniform block of one frame slot (binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PerFrameData {
    pub view_proj: Mat4,
    /// xyz camera position, w unused.
    pub camera_pos: [f32; 4],
    /// Floats per vertex in the interleaved stream.
    pub vertex_stride: u32,
    /// Float offset of the UV pair inside a vertex, or `u32::MAX` when absent.
    pub uv_offset: u32,
    /// Float offset of the normal inside a vertex, or `u32::MAX` when absent.
    pub normal_offset: u32,
    pub _pad: u32,
}

pub const ATTRIBUTE_ABSENT: u32 = u32::MAX;

impl PerFrameData {
    pub fn new(view_proj: Mat4, camera_pos: [f32; 3], layout: VertexLayout) -> Self {
        Self {
            view_proj,
            camera_pos: [camera_pos[0], camera_pos[1], camera_pos[2], 1.0],
            vertex_stride: layout.floats_per_vertex(),
            uv_offset: layout.uv_offset().unwrap_or(ATTRIBUTE_ABSENT),
            normal_offset: layout.normal_offset().unwrap_or(ATTRIBUTE_ABSENT),
            _pad: 0,
        }
    }
}

/// Buffers of one frame slot. The GPU may read them until the slot's submission completes.
#[derive(Debug)]
struct FrameResources {
    uniforms: Box<dyn Buffer>,
    draw_data_buffer: Box<dyn Buffer>,
    transforms: Box<dyn Buffer>,
    indirect: Box<dyn Buffer>,
    descriptor_set: Box<dyn DescriptorSet>,
    draw_data: Vec<DrawData>,
}

/// Draws every draw-data row of a container with a single `draw_indirect` per frame.
///
/// The geometry buffer is built once; per-frame buffers are indexed by frame slot and must not
/// be updated while the GPU still reads that slot.
#[derive(Debug)]
pub struct MultiMeshRenderer {
    mesh_data: MeshData,
    layout: VertexLayout,
    geometry_layout: GeometryLayout,
    transform_count: usize,
    frames: Vec<FrameResources>,
    geometry: Box<dyn Buffer>,
    pipeline: Box<dyn GraphicsPipeline>,
    _descriptor_pool: Box<dyn DescriptorPool>,
    _descriptor_set_layout: Box<dyn DescriptorSetLayout>,
    device: Arc<dyn Device>,
}

fn layout_bindings() -> Vec<DescriptorSetLayoutBinding> {
    let binding = |binding, descriptor_type| DescriptorSetLayoutBinding {
        binding,
        descriptor_type,
        count: 1,
        stages: ShaderStages::VERTEX,
    };
    vec![
        DescriptorSetLayoutBinding {
            stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            ..binding(bindings::UNIFORMS, DescriptorType::UniformBuffer)
        },
        binding(bindings::VERTICES, DescriptorType::StorageBuffer),
        binding(bindings::INDICES, DescriptorType::StorageBuffer),
        binding(bindings::DRAW_DATA, DescriptorType::StorageBuffer),
        binding(bindings::TRANSFORMS, DescriptorType::StorageBuffer),
    ]
}

/// The vertex layout shared by every mesh of the container.
fn shared_vertex_layout(mesh_data: &MeshData) -> Result<VertexLayout> {
    let first = mesh_data
        .meshes
        .first()
        .ok_or_else(|| Error::Format("mesh container is empty".to_string()))?;
    let element_size = first.stream_element_size[0];
    if let Some((i, _)) = mesh_data
        .meshes
        .iter()
        .enumerate()
        .find(|(_, m)| m.stream_element_size[0] != element_size)
    {
        return Err(Error::Format(format!(
            "mesh {i} vertex size differs from mesh 0 ({element_size} bytes)"
        )));
    }
    VertexLayout::from_element_size(element_size)
        .ok_or_else(|| Error::Format(format!("unsupported vertex size {element_size} bytes")))
}

/// Checks every row against the container so no draw can read outside the geometry buffer.
fn validate_rows(mesh_data: &MeshData, rows: &[DrawData]) -> Result<()> {
    let total_vertices = mesh_data.vertex_count();
    for (i, row) in rows.iter().enumerate() {
        row.validate(&mesh_data.meshes).map_err(|e| match e {
            Error::Format(message) => Error::Format(format!("draw data row {i}: {message}")),
            other => other,
        })?;
        let mesh = &mesh_data.meshes[row.mesh_index as usize];
        let index_end = row.index_offset as u64 + mesh.lod_index_count(row.lod) as u64;
        if index_end > mesh_data.index_data.len() as u64 {
            return Err(Error::Format(format!(
                "draw data row {i} reads indices up to {index_end} of {}",
                mesh_data.index_data.len()
            )));
        }
        let slice = &mesh_data.index_data[row.index_offset as usize..index_end as usize];
        if let Some(&max_index) = slice.iter().max() {
            let vertex_end = row.vertex_offset as u64 + max_index as u64 + 1;
            if vertex_end > total_vertices {
                return Err(Error::Format(format!(
                    "draw data row {i} reads vertices up to {vertex_end} of {total_vertices}"
                )));
            }
        }
    }
    Ok(())
}

fn create_buffer(device: &dyn Device, label: &'static str, size: u64, usage: BufferUsage) -> Result<Box<dyn Buffer>> {
    debug!("buffer {label}: {size} bytes");
    Ok(device.create_buffer(&BufferDescriptor {
        label: Some(label),
        size,
        usage,
    })?)
}

impl MultiMeshRenderer {
    /// Builds every GPU resource for `mesh_data` and `draw_data`. Nothing is returned on failure.
    pub fn new(
        device: Arc<dyn Device>,
        mesh_data: MeshData,
        draw_data: Vec<DrawData>,
        shaders: &MultiMeshShaders,
        config: &MultiMeshConfig,
    ) -> Result<Self> {
        mesh_data.validate()?;
        let layout = shared_vertex_layout(&mesh_data)?;
        if mesh_data.index_data.is_empty() {
            return Err(Error::Format("mesh container has no indices".to_string()));
        }
        if draw_data.is_empty() {
            return Err(Error::Format("draw data table is empty".to_string()));
        }
        validate_rows(&mesh_data, &draw_data)?;
        if config.frames_in_flight == 0 {
            return Err(Error::FrameSlot { index: 0, count: 0 });
        }
        let limits = device.limits();
        if !limits.draw_indirect_first_instance {
            return Err(Error::Device(
                "device cannot pass first_instance through indirect draws".to_string(),
            ));
        }

        let geometry_layout = GeometryLayout::new(
            std::mem::size_of_val(mesh_data.vertex_data.as_slice()) as u64,
            std::mem::size_of_val(mesh_data.index_data.as_slice()) as u64,
            limits.min_storage_buffer_offset_alignment,
        );
        let geometry = create_buffer(
            device.as_ref(),
            "multi_mesh_geometry",
            geometry_layout.total_size(),
            BufferUsage::STORAGE,
        )?;

        let set_bindings = layout_bindings();
        let descriptor_set_layout = device.create_descriptor_set_layout(&set_bindings)?;
        let descriptor_pool = device.create_descriptor_pool(config.frames_in_flight as u32)?;
        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDescriptor {
            label: Some("multi_mesh"),
            vertex_shader: ShaderStage {
                source: shaders.vertex.clone(),
                entry_point: shaders.vertex_entry.clone(),
            },
            fragment_shader: Some(ShaderStage {
                source: shaders.fragment.clone(),
                entry_point: shaders.fragment_entry.clone(),
            }),
            primitive_topology: PrimitiveTopology::TriangleList,
            rasterization: RasterizationState {
                cull_mode: config.cull_mode,
                ..Default::default()
            },
            color_targets: vec![ColorTargetState {
                format: config.color_format,
            }],
            depth_stencil: config.depth_format.map(|format| DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: CompareOp::Less,
            }),
            layout_bindings: set_bindings,
        })?;

        let transform_count = draw_data
            .iter()
            .map(|row| row.transform_index as usize + 1)
            .max()
            .unwrap_or(1);
        let max_shapes = draw_data.len() as u64;
        let mut frames = Vec::with_capacity(config.frames_in_flight);
        for _ in 0..config.frames_in_flight {
            let uniforms = create_buffer(
                device.as_ref(),
                "multi_mesh_uniforms",
                std::mem::size_of::<PerFrameData>() as u64,
                BufferUsage::UNIFORM,
            )?;
            let draw_data_buffer = create_buffer(
                device.as_ref(),
                "multi_mesh_draw_data",
                max_shapes * std::mem::size_of::<DrawData>() as u64,
                BufferUsage::STORAGE,
            )?;
            let transforms = create_buffer(
                device.as_ref(),
                "multi_mesh_transforms",
                (transform_count * std::mem::size_of::<Mat4>()) as u64,
                BufferUsage::STORAGE,
            )?;
            let indirect = create_buffer(
                device.as_ref(),
                "multi_mesh_indirect",
                max_shapes * DRAW_INDIRECT_COMMAND_SIZE as u64,
                BufferUsage::STORAGE | BufferUsage::INDIRECT,
            )?;
            let mut descriptor_set = descriptor_pool.allocate_set(descriptor_set_layout.as_ref())?;
            descriptor_set.write_buffer(bindings::UNIFORMS, uniforms.as_ref(), 0, 0)?;
            descriptor_set.write_buffer(
                bindings::VERTICES,
                geometry.as_ref(),
                0,
                geometry_layout.vertex_bytes,
            )?;
            descriptor_set.write_buffer(
                bindings::INDICES,
                geometry.as_ref(),
                geometry_layout.index_offset,
                geometry_layout.index_bytes,
            )?;
            descriptor_set.write_buffer(bindings::DRAW_DATA, draw_data_buffer.as_ref(), 0, 0)?;
            descriptor_set.write_buffer(bindings::TRANSFORMS, transforms.as_ref(), 0, 0)?;
            frames.push(FrameResources {
                uniforms,
                draw_data_buffer,
                transforms,
                indirect,
                descriptor_set,
                draw_data: draw_data.clone(),
            });
        }

        let renderer = Self {
            mesh_data,
            layout,
            geometry_layout,
            transform_count,
            frames,
            geometry,
            pipeline,
            _descriptor_pool: descriptor_pool,
            _descriptor_set_layout: descriptor_set_layout,
            device,
        };
        renderer.update_geometry_buffers()?;
        let identity = vec![IDENTITY; transform_count];
        for frame in 0..renderer.frame_count() {
            renderer.update_uniform_buffer(frame, IDENTITY, [0.0; 3])?;
            renderer.update_transform_buffer(frame, &identity)?;
            renderer.write_draw_data(frame)?;
            renderer.update_indirect_buffers(frame, None)?;
        }
        info!(
            "multi-mesh renderer: {} meshes, {} draws, {} frame slots, geometry {} bytes",
            renderer.mesh_data.mesh_count(),
            renderer.max_shapes(),
            renderer.frame_count(),
            renderer.geometry_layout.total_size()
        );
        Ok(renderer)
    }

    /// Loads a container and its draw-data table from disk.
    pub fn from_files(
        device: Arc<dyn Device>,
        mesh_file: impl AsRef<Path>,
        draw_data_file: impl AsRef<Path>,
        shaders: &MultiMeshShaders,
        config: &MultiMeshConfig,
    ) -> Result<Self> {
        let (header, mesh_data) = load_mesh_data(mesh_file.as_ref())?;
        let draw_data = load_draw_data(draw_data_file.as_ref())?;
        debug!(
            "{} draws for {} meshes from {}",
            draw_data.len(),
            header.mesh_count,
            draw_data_file.as_ref().display()
        );
        Self::new(device, mesh_data, draw_data, shaders, config)
    }

    fn frame(&self, index: usize) -> Result<&FrameResources> {
        self.frames.get(index).ok_or(Error::FrameSlot {
            index,
            count: self.frames.len(),
        })
    }

    fn frame_mut(&mut self, index: usize) -> Result<&mut FrameResources> {
        let count = self.frames.len();
        self.frames.get_mut(index).ok_or(Error::FrameSlot { index, count })
    }

    pub fn update_uniform_buffer(&self, frame: usize, view_proj: Mat4, camera_pos: [f32; 3]) -> Result<()> {
        let data = PerFrameData::new(view_proj, camera_pos, self.layout);
        let slot = self.frame(frame)?;
        self.device.write_buffer(slot.uniforms.as_ref(), 0, bytemuck::bytes_of(&data))?;
        Ok(())
    }

    /// Writes instance transforms starting at transform index 0.
    pub fn update_transform_buffer(&self, frame: usize, transforms: &[Mat4]) -> Result<()> {
        if transforms.len() > self.transform_count {
            return Err(Error::Format(format!(
                "{} transforms given, the draw data uses {}",
                transforms.len(),
                self.transform_count
            )));
        }
        let slot = self.frame(frame)?;
        self.device
            .write_buffer(slot.transforms.as_ref(), 0, bytemuck::cast_slice(transforms))?;
        Ok(())
    }

    /// Replaces the draw-data rows of one frame slot, e.g. after picking other LODs.
    /// The row count is fixed at construction.
    pub fn update_draw_data_buffer(&mut self, frame: usize, rows: &[DrawData]) -> Result<()> {
        if rows.len() != self.max_shapes() {
            return Err(Error::Format(format!(
                "{} draw data rows given, renderer was built for {}",
                rows.len(),
                self.max_shapes()
            )));
        }
        validate_rows(&self.mesh_data, rows)?;
        let transform_count = self.transform_count;
        if let Some(row) = rows.iter().find(|r| r.transform_index as usize >= transform_count) {
            return Err(Error::Format(format!(
                "transform index {} exceeds the {transform_count} transforms of the renderer",
                row.transform_index
            )));
        }
        self.frame_mut(frame)?.draw_data = rows.to_vec();
        self.write_draw_data(frame)
    }

    fn write_draw_data(&self, frame: usize) -> Result<()> {
        let slot = self.frame(frame)?;
        self.device.write_buffer(
            slot.draw_data_buffer.as_ref(),
            0,
            bytemuck::cast_slice(&slot.draw_data),
        )?;
        Ok(())
    }

    /// Rebuilds the indirect commands of a frame slot from its draw data.
    /// `visibility` holds one flag per row; hidden rows are drawn with zero instances.
    pub fn update_indirect_buffers(&self, frame: usize, visibility: Option<&[bool]>) -> Result<()> {
        let slot = self.frame(frame)?;
        let commands = build_indirect_commands(&self.mesh_data.meshes, &slot.draw_data, visibility)?;
        self.device
            .write_buffer(slot.indirect.as_ref(), 0, bytemuck::cast_slice(&commands))?;
        Ok(())
    }

    /// Uploads vertices, alignment padding and indices into the geometry buffer.
    pub fn update_geometry_buffers(&self) -> Result<()> {
        let bytes = self
            .geometry_layout
            .pack(&self.mesh_data.vertex_data, &self.mesh_data.index_data);
        self.device.write_buffer(self.geometry.as_ref(), 0, &bytes)?;
        Ok(())
    }

    /// Records the frame's draw: pipeline, descriptor set and one indirect multi-draw.
    pub fn fill_command_buffer(&self, pass: &mut dyn RenderPass, frame: usize) -> Result<()> {
        let slot = self.frame(frame)?;
        pass.set_pipeline(self.pipeline.as_ref());
        pass.bind_descriptor_set(0, slot.descriptor_set.as_ref());
        pass.draw_indirect(
            slot.indirect.as_ref(),
            0,
            self.max_shapes() as u32,
            DRAW_INDIRECT_COMMAND_SIZE,
        );
        Ok(())
    }

    /// Number of draw-data rows, and of indirect commands per frame.
    pub fn max_shapes(&self) -> usize {
        self.frames.first().map_or(0, |f| f.draw_data.len())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn transform_count(&self) -> usize {
        self.transform_count
    }

    pub fn geometry_layout(&self) -> &GeometryLayout {
        &self.geometry_layout
    }

    pub fn vertex_layout(&self) -> VertexLayout {
        self.layout
    }

    pub fn mesh_data(&self) -> &MeshData {
        &self.mesh_data
    }

    pub fn draw_data(&self, frame: usize) -> Result<&[DrawData]> {
        Ok(&self.frame(frame)?.draw_data)
    }

    pub fn geometry_buffer(&self) -> &dyn Buffer {
        self.geometry.as_ref()
    }

    pub fn indirect_buffer(&self, frame: usize) -> Result<&dyn Buffer> {
        Ok(self.frame(frame)?.indirect.as_ref())
    }
}

impl Drop for MultiMeshRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("wait_idle before releasing renderer resources: {e}");
        }
    }
}

#[cfg(test)]
mod tests;
