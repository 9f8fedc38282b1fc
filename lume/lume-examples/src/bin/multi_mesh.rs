//! Headless multi-mesh demo: renders a converted container for N frames with one indirect
//! multi-draw per frame, pacing frame slots with fences.
//!
//! cargo run --bin multi_mesh -- scene.mesh --frames 120 --cull-every 3

use clap::Parser;
use glam::{Mat4, Vec3};
use log::{error, info, warn};
use lume_mesh::{draw_data_path, BoundingBox, Error, Result};
use lume_renderer::{MultiMeshConfig, MultiMeshRenderer, MultiMeshShaders};
use lume_rhi::{
    ClearColor, ColorAttachment, CommandBuffer, DepthStencilAttachment, Device, Fence, LoadOp, Queue,
    RenderPassDescriptor, StoreOp, Texture, TextureDescriptor, TextureFormat, TextureUsage,
    VulkanDevice,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const SHADER: &str = include_str!("../../shaders/multi_mesh.wgsl");

#[derive(Parser, Debug)]
#[command(about = "Render a packed mesh container with indirect multi-draw")]
struct Cli {
    /// Mesh container written by meshconvert.
    mesh: PathBuf,
    /// Draw-data table. Defaults to <mesh>.drawdata.
    #[arg(long)]
    draw_data: Option<PathBuf>,
    #[arg(short, long, default_value_t = 60)]
    frames: u32,
    #[arg(long, default_value_t = 3)]
    frames_in_flight: usize,
    /// Hide every K-th instance through the visibility array (0 disables culling).
    #[arg(long, default_value_t = 0)]
    cull_every: usize,
    #[arg(long, default_value_t = 800)]
    width: u32,
    #[arg(long, default_value_t = 600)]
    height: u32,
    /// Longest wait for a frame slot before the frame is skipped.
    #[arg(long, default_value_t = 1_000_000_000)]
    fence_timeout_ns: u64,
}

fn compile_wgsl_to_spirv(
    module: &naga::Module,
    info: &naga::valid::ModuleInfo,
    stage: naga::ShaderStage,
    entry_point: &str,
) -> std::result::Result<Vec<u8>, String> {
    let options = naga::back::spv::Options::default();
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage,
        entry_point: entry_point.to_string(),
    };
    let spv = naga::back::spv::write_vec(module, info, &options, Some(&pipeline_options))
        .map_err(|e| format!("{entry_point}: {e}"))?;
    Ok(spv.iter().flat_map(|w| w.to_le_bytes()).collect())
}

fn shaders() -> Result<MultiMeshShaders> {
    let module = naga::front::wgsl::parse_str(SHADER)
        .map_err(|e| Error::Device(format!("multi_mesh.wgsl: {}", e.emit_to_string(SHADER))))?;
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::default(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|e| Error::Device(format!("multi_mesh.wgsl: {e:?}")))?;
    let vertex = compile_wgsl_to_spirv(&module, &info, naga::ShaderStage::Vertex, "vs_main")?;
    let fragment = compile_wgsl_to_spirv(&module, &info, naga::ShaderStage::Fragment, "fs_main")?;
    Ok(MultiMeshShaders::new(vertex, fragment))
}

/// Box around every mesh of the scene.
fn scene_bounds(boxes: &[BoundingBox]) -> BoundingBox {
    BoundingBox::from_points(boxes.iter().flat_map(|b| [b.min, b.max]))
}

/// Camera orbiting the scene; returns the view-projection matrix and eye position.
fn orbit_camera(bounds: &BoundingBox, frame: u32, aspect: f32) -> (Mat4, Vec3) {
    let center = Vec3::from(bounds.center());
    let radius = (Vec3::from(bounds.extent()).length() * 0.5).max(0.01);
    let angle = frame as f32 * 0.02;
    let eye = center + Vec3::new(angle.sin(), 0.4, angle.cos()) * radius * 2.5;
    let view = Mat4::look_at_rh(eye, center, Vec3::Y);
    let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, radius * 0.01, radius * 10.0);
    // Vulkan clip space has +Y pointing down.
    proj.y_axis.y = -proj.y_axis.y;
    (proj * view, eye)
}

fn visibility(max_shapes: usize, cull_every: usize) -> Option<Vec<bool>> {
    (cull_every > 0).then(|| (0..max_shapes).map(|i| (i + 1) % cull_every != 0).collect())
}

fn run(cli: &Cli) -> Result<()> {
    let device: Arc<dyn Device> = VulkanDevice::new()?;
    let config = MultiMeshConfig {
        frames_in_flight: cli.frames_in_flight,
        ..Default::default()
    };

    let color = device.create_texture(&TextureDescriptor {
        label: Some("multi_mesh_color"),
        size: (cli.width, cli.height),
        format: config.color_format,
        usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
    })?;
    let depth_format = config.depth_format.unwrap_or(TextureFormat::D32Float);
    let depth = device.create_texture(&TextureDescriptor {
        label: Some("multi_mesh_depth"),
        size: (cli.width, cli.height),
        format: depth_format,
        usage: TextureUsage::RENDER_ATTACHMENT,
    })?;

    let draw_data_file = cli.draw_data.clone().unwrap_or_else(|| draw_data_path(&cli.mesh));
    let renderer = MultiMeshRenderer::from_files(
        device.clone(),
        &cli.mesh,
        &draw_data_file,
        &shaders()?,
        &config,
    )?;
    let bounds = scene_bounds(&renderer.mesh_data().boxes);
    let aspect = cli.width as f32 / cli.height.max(1) as f32;
    let hidden = visibility(renderer.max_shapes(), cli.cull_every);
    if let Some(flags) = &hidden {
        info!(
            "culling {} of {} instances",
            flags.iter().filter(|v| !**v).count(),
            flags.len()
        );
    }

    let mut pacing = FramePacing::new(device.as_ref(), renderer.frame_count())?;
    let result = render_frames(
        device.as_ref(),
        &mut pacing,
        &renderer,
        color.as_ref(),
        depth.as_ref(),
        cli,
        &FrameInputs {
            bounds,
            aspect,
            visibility: hidden.as_deref(),
        },
    );
    device.wait_idle()?;
    drop(pacing);
    let (rendered, skipped) = result?;
    info!(
        "rendered {rendered} frames ({skipped} skipped), {} draws per frame",
        renderer.max_shapes()
    );
    Ok(())
}

/// Submission state of the frame slots. Command buffers stay alive until their slot's fence has
/// signaled, and the whole set must outlive the final idle wait.
struct FramePacing {
    queue: Box<dyn Queue>,
    fences: Vec<Box<dyn Fence>>,
    in_flight: Vec<Option<Box<dyn CommandBuffer>>>,
}

impl FramePacing {
    fn new(device: &dyn Device, slots: usize) -> Result<Self> {
        let fences = (0..slots)
            .map(|_| device.create_fence(true))
            .collect::<std::result::Result<Vec<_>, String>>()?;
        Ok(Self {
            queue: device.queue()?,
            fences,
            in_flight: (0..slots).map(|_| None).collect(),
        })
    }

    /// Waits for `slot`'s previous submission. Returns `false` on timeout.
    fn acquire(&mut self, slot: usize, timeout_ns: u64) -> Result<bool> {
        if !self.fences[slot].wait(timeout_ns)? {
            return Ok(false);
        }
        self.fences[slot].reset()?;
        self.in_flight[slot] = None;
        Ok(true)
    }

    fn submit(&mut self, slot: usize, cmd: Box<dyn CommandBuffer>) -> Result<()> {
        self.queue
            .submit(&[cmd.as_ref()], &[], &[], Some(self.fences[slot].as_ref()))?;
        self.in_flight[slot] = Some(cmd);
        Ok(())
    }
}

struct FrameInputs<'a> {
    bounds: BoundingBox,
    aspect: f32,
    visibility: Option<&'a [bool]>,
}

/// Records and submits `cli.frames` frames. Returns how many were rendered and skipped.
fn render_frames(
    device: &dyn Device,
    pacing: &mut FramePacing,
    renderer: &MultiMeshRenderer,
    color: &dyn Texture,
    depth: &dyn Texture,
    cli: &Cli,
    inputs: &FrameInputs<'_>,
) -> Result<(u32, u32)> {
    let mut rendered = 0u32;
    let mut skipped = 0u32;
    for frame in 0..cli.frames {
        let slot = frame as usize % renderer.frame_count();
        if !pacing.acquire(slot, cli.fence_timeout_ns)? {
            warn!("frame {frame}: slot {slot} still busy after {} ns, skipped", cli.fence_timeout_ns);
            skipped += 1;
            continue;
        }

        let (view_proj, eye) = orbit_camera(&inputs.bounds, frame, inputs.aspect);
        renderer.update_uniform_buffer(slot, view_proj.to_cols_array_2d(), eye.to_array())?;
        renderer.update_indirect_buffers(slot, inputs.visibility)?;

        let mut encoder = device.create_command_encoder()?;
        let mut pass = encoder.begin_render_pass(RenderPassDescriptor {
            label: Some("multi_mesh"),
            color_attachments: vec![ColorAttachment {
                texture: color,
                load_op: LoadOp::Clear,
                store_op: StoreOp::Store,
                clear_value: Some(ClearColor {
                    r: 0.05,
                    g: 0.05,
                    b: 0.08,
                    a: 1.0,
                }),
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                texture: depth,
                depth_load_op: LoadOp::Clear,
                depth_store_op: StoreOp::DontCare,
                clear_depth: 1.0,
            }),
        })?;
        renderer.fill_command_buffer(pass.as_mut(), slot)?;
        pass.end();
        pacing.submit(slot, encoder.finish()?)?;
        rendered += 1;
    }
    Ok((rendered, skipped))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
