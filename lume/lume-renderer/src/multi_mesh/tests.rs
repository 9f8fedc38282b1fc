use super::*;
use lume_mesh::{build_draw_data, merge_draw_data, save_draw_data, save_mesh_data, BoundingBox, Mesh};
use lume_rhi::{
    CommandBuffer, CommandEncoder, DeviceLimits, Fence, Queue, RenderPassDescriptor, ResourceId,
    Semaphore, Texture, TextureDescriptor,
};
use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Host-memory device: buffers are byte vectors and render passes append to a shared log.
#[derive(Debug)]
struct TestDevice {
    limits: DeviceLimits,
    fail_pipeline: bool,
    next_id: AtomicU64,
    wait_idle_calls: AtomicUsize,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Recorded {
    SetPipeline,
    BindDescriptorSet { set_index: u32, writes: Vec<SetWrite> },
    DrawIndirect { buffer: ResourceId, offset: u64, draw_count: u32, stride: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SetWrite {
    binding: u32,
    buffer: ResourceId,
    offset: u64,
    range: u64,
}

impl TestDevice {
    fn new(limits: DeviceLimits) -> Arc<Self> {
        Arc::new(Self {
            limits,
            fail_pipeline: false,
            next_id: AtomicU64::new(1),
            wait_idle_calls: AtomicUsize::new(0),
            recorded: Arc::default(),
        })
    }

    fn read(&self, buffer: &dyn Buffer) -> Vec<u8> {
        let mut bytes = vec![0; buffer.size() as usize];
        self.read_buffer(buffer, 0, &mut bytes).unwrap();
        bytes
    }
}

#[derive(Debug)]
struct TestBuffer {
    id: ResourceId,
    data: Mutex<Vec<u8>>,
}

impl Buffer for TestBuffer {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct TestObject;

impl GraphicsPipeline for TestObject {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DescriptorSetLayout for TestObject {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl CommandBuffer for TestObject {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Fence for TestObject {
    fn wait(&self, _timeout_ns: u64) -> std::result::Result<bool, String> {
        Ok(true)
    }
    fn reset(&self) -> std::result::Result<(), String> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Semaphore for TestObject {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Queue for TestObject {
    fn submit(
        &self,
        _command_buffers: &[&dyn CommandBuffer],
        _wait_semaphores: &[&dyn Semaphore],
        _signal_semaphores: &[&dyn Semaphore],
        _signal_fence: Option<&dyn Fence>,
    ) -> std::result::Result<(), String> {
        Ok(())
    }
}

#[derive(Debug)]
struct TestPool;

impl DescriptorPool for TestPool {
    fn allocate_set(&self, _layout: &dyn DescriptorSetLayout) -> std::result::Result<Box<dyn DescriptorSet>, String> {
        Ok(Box::new(TestSet::default()))
    }
}

#[derive(Debug, Default)]
struct TestSet {
    writes: Vec<SetWrite>,
}

impl DescriptorSet for TestSet {
    fn write_buffer(&mut self, binding: u32, buffer: &dyn Buffer, offset: u64, range: u64) -> std::result::Result<(), String> {
        let range = if range > 0 { range } else { buffer.size() - offset };
        lume_rhi::check_buffer_range(buffer.size(), offset, range)?;
        self.writes.push(SetWrite {
            binding,
            buffer: buffer.id(),
            offset,
            range,
        });
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct TestEncoder {
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl CommandEncoder for TestEncoder {
    fn begin_render_pass<'a>(&mut self, _desc: RenderPassDescriptor<'a>) -> std::result::Result<Box<dyn RenderPass>, String> {
        Ok(Box::new(TestPass {
            recorded: self.recorded.clone(),
        }))
    }
    fn finish(self: Box<Self>) -> std::result::Result<Box<dyn CommandBuffer>, String> {
        Ok(Box::new(TestObject))
    }
}

#[derive(Debug)]
struct TestPass {
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl RenderPass for TestPass {
    fn set_pipeline(&mut self, _pipeline: &dyn GraphicsPipeline) {
        self.recorded.lock().unwrap().push(Recorded::SetPipeline);
    }
    fn bind_descriptor_set(&mut self, set_index: u32, set: &dyn DescriptorSet) {
        let writes = set.as_any().downcast_ref::<TestSet>().unwrap().writes.clone();
        self.recorded
            .lock()
            .unwrap()
            .push(Recorded::BindDescriptorSet { set_index, writes });
    }
    fn draw_indirect(&mut self, buffer: &dyn Buffer, offset: u64, draw_count: u32, stride: u32) {
        self.recorded.lock().unwrap().push(Recorded::DrawIndirect {
            buffer: buffer.id(),
            offset,
            draw_count,
            stride,
        });
    }
    fn end(self: Box<Self>) {}
}

impl Device for TestDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }
    fn create_buffer(&self, desc: &BufferDescriptor) -> std::result::Result<Box<dyn Buffer>, String> {
        Ok(Box::new(TestBuffer {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            data: Mutex::new(vec![0; desc.size as usize]),
        }))
    }
    fn create_texture(&self, _desc: &TextureDescriptor) -> std::result::Result<Box<dyn Texture>, String> {
        Err("textures are not supported by the test device".to_string())
    }
    fn create_graphics_pipeline(&self, _desc: &GraphicsPipelineDescriptor) -> std::result::Result<Box<dyn GraphicsPipeline>, String> {
        if self.fail_pipeline {
            return Err("pipeline rejected".to_string());
        }
        Ok(Box::new(TestObject))
    }
    fn create_descriptor_set_layout(&self, _bindings: &[DescriptorSetLayoutBinding]) -> std::result::Result<Box<dyn DescriptorSetLayout>, String> {
        Ok(Box::new(TestObject))
    }
    fn create_descriptor_pool(&self, _max_sets: u32) -> std::result::Result<Box<dyn DescriptorPool>, String> {
        Ok(Box::new(TestPool))
    }
    fn create_command_encoder(&self) -> std::result::Result<Box<dyn CommandEncoder>, String> {
        Ok(Box::new(TestEncoder {
            recorded: self.recorded.clone(),
        }))
    }
    fn queue(&self) -> std::result::Result<Box<dyn Queue>, String> {
        Ok(Box::new(TestObject))
    }
    fn write_buffer(&self, buffer: &dyn Buffer, offset: u64, data: &[u8]) -> std::result::Result<(), String> {
        let buffer = buffer.as_any().downcast_ref::<TestBuffer>().ok_or("not a test buffer")?;
        let mut bytes = buffer.data.lock().unwrap();
        lume_rhi::check_buffer_range(bytes.len() as u64, offset, data.len() as u64)?;
        bytes[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        Ok(())
    }
    fn read_buffer(&self, buffer: &dyn Buffer, offset: u64, data: &mut [u8]) -> std::result::Result<(), String> {
        let buffer = buffer.as_any().downcast_ref::<TestBuffer>().ok_or("not a test buffer")?;
        let bytes = buffer.data.lock().unwrap();
        lume_rhi::check_buffer_range(bytes.len() as u64, offset, data.len() as u64)?;
        data.copy_from_slice(&bytes[offset as usize..offset as usize + data.len()]);
        Ok(())
    }
    fn wait_idle(&self) -> std::result::Result<(), String> {
        self.wait_idle_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
    fn create_fence(&self, _signaled: bool) -> std::result::Result<Box<dyn Fence>, String> {
        Ok(Box::new(TestObject))
    }
    fn create_semaphore(&self) -> std::result::Result<Box<dyn Semaphore>, String> {
        Ok(Box::new(TestObject))
    }
}

fn shaders() -> MultiMeshShaders {
    MultiMeshShaders::new(vec![0; 4], vec![0; 4])
}

/// One position-only mesh per part, each with a single LOD.
fn container(parts: &[(&[[f32; 3]], &[u32])]) -> MeshData {
    let mut data = MeshData::new();
    for (vertices, indices) in parts {
        let mut mesh = Mesh {
            stream_count: 1,
            vertex_count: vertices.len() as u32,
            ..Default::default()
        };
        mesh.lod_offset[0] = data.index_data.len() as u32;
        mesh.lod_offset[1] = (data.index_data.len() + indices.len()) as u32;
        mesh.stream_offset[0] = std::mem::size_of_val(data.vertex_data.as_slice()) as u64;
        mesh.stream_element_size[0] = 12;
        let flat: Vec<f32> = vertices.iter().flatten().copied().collect();
        data.push_mesh(mesh, BoundingBox::from_points(vertices.iter().copied()), indices, &flat);
    }
    data
}

const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
const QUAD: [[f32; 3]; 4] = [
    [-1.0, -1.0, 2.0],
    [1.0, -1.0, 2.0],
    [1.0, 1.0, 2.0],
    [-1.0, 1.0, 2.0],
];
const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

fn scene() -> MeshData {
    container(&[(&TRIANGLE, &[0, 1, 2]), (&QUAD, &QUAD_INDICES)])
}

fn renderer(device: &Arc<TestDevice>, data: MeshData, rows: Vec<DrawData>) -> Result<MultiMeshRenderer> {
    MultiMeshRenderer::new(device.clone(), data, rows, &shaders(), &MultiMeshConfig::default())
}

fn commands(device: &TestDevice, renderer: &MultiMeshRenderer, frame: usize) -> Vec<DrawIndirectCommand> {
    let bytes = device.read(renderer.indirect_buffer(frame).unwrap());
    bytemuck::pod_collect_to_vec(&bytes)
}

/// Runs the vertex-pulling rule of the shader over the uploaded buffers and returns the
/// positions each visible instance would emit.
fn pulled_positions(device: &TestDevice, renderer: &MultiMeshRenderer, frame: usize) -> Vec<Vec<[f32; 3]>> {
    let layout = renderer.geometry_layout();
    let geometry = device.read(renderer.geometry_buffer());
    let vertices: Vec<f32> = bytemuck::pod_collect_to_vec(&geometry[..layout.vertex_bytes as usize]);
    let indices: Vec<u32> = bytemuck::pod_collect_to_vec(&geometry[layout.index_offset as usize..]);
    let rows = renderer.draw_data(frame).unwrap();
    let stride = renderer.vertex_layout().floats_per_vertex() as usize;
    commands(device, renderer, frame)
        .iter()
        .filter(|c| c.instance_count > 0)
        .map(|c| {
            let row = &rows[c.first_instance as usize];
            (0..c.vertex_count)
                .map(|v| {
                    let index = indices[(row.index_offset + c.first_vertex + v) as usize];
                    let at = (index + row.vertex_offset) as usize * stride;
                    [vertices[at], vertices[at + 1], vertices[at + 2]]
                })
                .collect()
        })
        .collect()
}

#[test]
fn index_region_follows_device_alignment() {
    for alignment in [4u64, 64, 256] {
        let device = TestDevice::new(DeviceLimits {
            min_storage_buffer_offset_alignment: alignment,
            ..Default::default()
        });
        let data = scene();
        let rows = build_draw_data(&data);
        let r = renderer(&device, data.clone(), rows).unwrap();
        let layout = *r.geometry_layout();
        assert_eq!(layout.index_offset % alignment, 0);
        assert_eq!(layout.vertex_bytes, 7 * 12);
        let geometry = device.read(r.geometry_buffer());
        assert_eq!(geometry, layout.pack(&data.vertex_data, &data.index_data));
    }
}

#[test]
fn uploads_every_frame_slot() {
    let device = TestDevice::new(DeviceLimits::default());
    let data = scene();
    let rows = build_draw_data(&data);
    let r = renderer(&device, data, rows.clone()).unwrap();
    assert_eq!(r.frame_count(), 3);
    assert_eq!(r.max_shapes(), 2);
    for frame in 0..r.frame_count() {
        let cmds = commands(&device, &r, frame);
        assert_eq!(
            cmds,
            vec![
                DrawIndirectCommand { vertex_count: 3, instance_count: 1, first_vertex: 0, first_instance: 0 },
                DrawIndirectCommand { vertex_count: 6, instance_count: 1, first_vertex: 0, first_instance: 1 },
            ]
        );
        assert_eq!(r.draw_data(frame).unwrap(), rows.as_slice());
    }
}

#[test]
fn records_one_indirect_draw() {
    let device = TestDevice::new(DeviceLimits::default());
    let data = scene();
    let rows = build_draw_data(&data);
    let r = renderer(&device, data, rows).unwrap();
    let mut encoder = device.create_command_encoder().unwrap();
    let mut pass = encoder
        .begin_render_pass(RenderPassDescriptor {
            label: None,
            color_attachments: vec![],
            depth_stencil_attachment: None,
        })
        .unwrap();
    r.fill_command_buffer(pass.as_mut(), 1).unwrap();
    pass.end();

    let recorded = device.recorded.lock().unwrap().clone();
    assert_eq!(recorded.len(), 3);
    assert_eq!(recorded[0], Recorded::SetPipeline);
    let Recorded::BindDescriptorSet { set_index, writes } = &recorded[1] else {
        panic!("expected a descriptor set bind, got {:?}", recorded[1]);
    };
    assert_eq!(*set_index, 0);
    let geometry_id = r.geometry_buffer().id();
    let layout = r.geometry_layout();
    let vertices = writes.iter().find(|w| w.binding == bindings::VERTICES).unwrap();
    assert_eq!((vertices.buffer, vertices.offset, vertices.range), (geometry_id, 0, layout.vertex_bytes));
    let indices = writes.iter().find(|w| w.binding == bindings::INDICES).unwrap();
    assert_eq!(
        (indices.buffer, indices.offset, indices.range),
        (geometry_id, layout.index_offset, layout.index_bytes)
    );
    assert_eq!(writes.len(), 5);
    assert_eq!(
        recorded[2],
        Recorded::DrawIndirect {
            buffer: r.indirect_buffer(1).unwrap().id(),
            offset: 0,
            draw_count: 2,
            stride: 16,
        }
    );
}

#[test]
fn visibility_zeroes_instance_counts() {
    let device = TestDevice::new(DeviceLimits::default());
    let data = container(&[(&TRIANGLE, &[0, 1, 2])]);
    let rows: Vec<DrawData> = (0..5).map(|t| DrawData::for_mesh(0, &data.meshes[0], 0, t)).collect();
    let r = renderer(&device, data, rows).unwrap();
    let visibility = [false, true, true, false, true];
    r.update_indirect_buffers(2, Some(&visibility)).unwrap();
    let cmds = commands(&device, &r, 2);
    assert_eq!(cmds.len(), 5);
    assert_eq!(cmds.iter().map(|c| c.instance_count).sum::<u32>(), 3);
    assert!(cmds.iter().all(|c| c.vertex_count == 3));
    // Other slots keep their commands.
    assert!(commands(&device, &r, 0).iter().all(|c| c.instance_count == 1));

    let err = r.update_indirect_buffers(2, Some(&visibility[..4])).unwrap_err();
    assert!(matches!(err, Error::Visibility { expected: 5, actual: 4 }));
}

#[test]
fn frame_slot_out_of_range() {
    let device = TestDevice::new(DeviceLimits::default());
    let data = scene();
    let rows = build_draw_data(&data);
    let mut r = renderer(&device, data, rows.clone()).unwrap();
    assert!(matches!(
        r.update_indirect_buffers(3, None),
        Err(Error::FrameSlot { index: 3, count: 3 })
    ));
    assert!(matches!(r.update_uniform_buffer(7, IDENTITY, [0.0; 3]), Err(Error::FrameSlot { .. })));
    assert!(matches!(r.update_draw_data_buffer(3, &rows), Err(Error::FrameSlot { .. })));
    assert!(r.draw_data(3).is_err());
}

#[test]
fn draw_data_update_changes_one_slot() {
    let device = TestDevice::new(DeviceLimits::default());
    let mut data = scene();
    // Give the quad a second LOD holding one triangle.
    data.index_data.extend_from_slice(&[0, 1, 2]);
    data.meshes[1].lod_count = 2;
    data.meshes[1].lod_offset[2] = data.meshes[1].lod_offset[1] + 3;
    let rows = build_draw_data(&data);
    let mut r = renderer(&device, data, rows.clone()).unwrap();

    let mut coarse = rows.clone();
    coarse[1].select_lod(&r.mesh_data().meshes[1].clone(), 1);
    r.update_draw_data_buffer(0, &coarse).unwrap();
    r.update_indirect_buffers(0, None).unwrap();
    assert_eq!(commands(&device, &r, 0)[1].vertex_count, 3);
    assert_eq!(commands(&device, &r, 1)[1].vertex_count, 6);

    let uploaded: Vec<DrawData> = bytemuck::pod_collect_to_vec(&device.read(r.frames[0].draw_data_buffer.as_ref()));
    assert_eq!(uploaded, coarse);

    assert!(r.update_draw_data_buffer(0, &coarse[..1]).is_err());
    let mut bad = rows;
    bad[0].mesh_index = 9;
    assert!(matches!(r.update_draw_data_buffer(0, &bad), Err(Error::Format(_))));
}

#[test]
fn uniforms_describe_vertex_layout() {
    let device = TestDevice::new(DeviceLimits::default());
    let data = scene();
    let rows = build_draw_data(&data);
    let r = renderer(&device, data, rows).unwrap();
    let mut view_proj = IDENTITY;
    view_proj[3][2] = -5.0;
    r.update_uniform_buffer(0, view_proj, [1.0, 2.0, 3.0]).unwrap();
    let uniforms: PerFrameData = bytemuck::pod_read_unaligned(&device.read(r.frames[0].uniforms.as_ref()));
    assert_eq!(uniforms.view_proj, view_proj);
    assert_eq!(uniforms.camera_pos, [1.0, 2.0, 3.0, 1.0]);
    assert_eq!(uniforms.vertex_stride, 3);
    assert_eq!(uniforms.uv_offset, ATTRIBUTE_ABSENT);
    assert_eq!(uniforms.normal_offset, ATTRIBUTE_ABSENT);
    assert_eq!(std::mem::size_of::<PerFrameData>(), 96);
}

#[test]
fn transforms_start_as_identity() {
    let device = TestDevice::new(DeviceLimits::default());
    let data = scene();
    let rows = build_draw_data(&data);
    let r = renderer(&device, data, rows).unwrap();
    assert_eq!(r.transform_count(), 2);
    let stored: Vec<Mat4> = bytemuck::pod_collect_to_vec(&device.read(r.frames[1].transforms.as_ref()));
    assert_eq!(stored, vec![IDENTITY; 2]);

    let mut moved = IDENTITY;
    moved[3] = [4.0, 5.0, 6.0, 1.0];
    r.update_transform_buffer(1, &[IDENTITY, moved]).unwrap();
    let stored: Vec<Mat4> = bytemuck::pod_collect_to_vec(&device.read(r.frames[1].transforms.as_ref()));
    assert_eq!(stored[1], moved);
    assert!(r.update_transform_buffer(1, &[IDENTITY; 3]).is_err());
}

#[test]
fn merged_containers_pull_original_vertices() {
    let a = scene();
    let b = container(&[(&QUAD, &[3, 2, 1, 3, 1, 0]), (&TRIANGLE, &[2, 1, 0])]);
    let (rows_a, rows_b) = (build_draw_data(&a), build_draw_data(&b));
    let merged = MeshData::merge(&[&a, &b]).unwrap();
    let rows = merge_draw_data(&[(&a, &rows_a[..]), (&b, &rows_b[..])]).unwrap();

    let device = TestDevice::new(DeviceLimits {
        min_storage_buffer_offset_alignment: 64,
        ..Default::default()
    });
    let r = renderer(&device, merged, rows).unwrap();
    let pulled = pulled_positions(&device, &r, 0);

    let expected: Vec<Vec<[f32; 3]>> = [(&a, 0usize), (&a, 1), (&b, 0), (&b, 1)]
        .iter()
        .map(|&(data, m)| {
            let mesh = &data.meshes[m];
            data.lod_indices(m, 0)
                .unwrap()
                .iter()
                .map(|&i| data.vertex_position(mesh, i).unwrap())
                .collect()
        })
        .collect();
    assert_eq!(pulled, expected);
}

#[test]
fn rejects_inconsistent_input() {
    let device = TestDevice::new(DeviceLimits::default());
    let empty = renderer(&device, MeshData::new(), vec![]);
    assert!(matches!(empty, Err(Error::Format(_))));

    let data = scene();
    assert!(matches!(renderer(&device, data.clone(), vec![]), Err(Error::Format(_))));

    let mut bad_row = build_draw_data(&data);
    bad_row[1].lod = 3;
    assert!(matches!(renderer(&device, data.clone(), bad_row), Err(Error::Format(_))));

    let mut out_of_range = build_draw_data(&data);
    out_of_range[0].vertex_offset = 6;
    assert!(matches!(renderer(&device, data.clone(), out_of_range), Err(Error::Format(_))));

    // Every face of the source was dropped: meshes exist but hold no indices.
    let faceless = container(&[(&TRIANGLE, &[][..])]);
    let rows = build_draw_data(&faceless);
    assert!(matches!(renderer(&device, faceless, rows), Err(Error::Format(_))));

    let mut mixed = data.clone();
    mixed.meshes[1].stream_element_size[0] = 20;
    mixed.vertex_data.extend(std::iter::repeat(0.0).take(8));
    let rows = build_draw_data(&mixed);
    assert!(matches!(renderer(&device, mixed, rows), Err(Error::Format(_))));

    let rows = build_draw_data(&data);
    let no_slots = MultiMeshConfig {
        frames_in_flight: 0,
        ..Default::default()
    };
    let result = MultiMeshRenderer::new(device.clone(), data, rows, &shaders(), &no_slots);
    assert!(matches!(result, Err(Error::FrameSlot { .. })));
}

#[test]
fn device_failures_are_reported() {
    let data = scene();
    let rows = build_draw_data(&data);

    let no_first_instance = TestDevice::new(DeviceLimits {
        draw_indirect_first_instance: false,
        ..Default::default()
    });
    assert!(matches!(
        renderer(&no_first_instance, data.clone(), rows.clone()),
        Err(Error::Device(_))
    ));

    let failing = Arc::new(TestDevice {
        limits: DeviceLimits::default(),
        fail_pipeline: true,
        next_id: AtomicU64::new(1),
        wait_idle_calls: AtomicUsize::new(0),
        recorded: Arc::default(),
    });
    let err = renderer(&failing, data, rows).unwrap_err();
    assert!(matches!(err, Error::Device(ref m) if m.contains("pipeline rejected")));
}

#[test]
fn drop_waits_for_idle() {
    let device = TestDevice::new(DeviceLimits::default());
    let data = scene();
    let rows = build_draw_data(&data);
    let r = renderer(&device, data, rows).unwrap();
    assert_eq!(device.wait_idle_calls.load(Ordering::Relaxed), 0);
    drop(r);
    assert_eq!(device.wait_idle_calls.load(Ordering::Relaxed), 1);
}

#[test]
fn loads_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let mesh_path = dir.path().join("scene.mesh");
    let draw_path = lume_mesh::draw_data_path(&mesh_path);
    let data = scene();
    save_mesh_data(&mesh_path, &data).unwrap();
    save_draw_data(&draw_path, &build_draw_data(&data)).unwrap();

    let device = TestDevice::new(DeviceLimits::default());
    let r = MultiMeshRenderer::from_files(
        device.clone(),
        &mesh_path,
        &draw_path,
        &shaders(),
        &MultiMeshConfig::default(),
    )
    .unwrap();
    assert_eq!(r.mesh_data(), &data);
    assert_eq!(r.max_shapes(), 2);

    let missing = MultiMeshRenderer::from_files(
        device.clone(),
        dir.path().join("missing.mesh"),
        &draw_path,
        &shaders(),
        &MultiMeshConfig::default(),
    );
    assert!(matches!(missing, Err(Error::Io { .. })));
}
