//! Renderer settings and shader inputs.

use lume_rhi::{CullMode, TextureFormat};

/// Settings of a [`MultiMeshRenderer`](crate::MultiMeshRenderer).
#[derive(Debug, Clone)]
pub struct MultiMeshConfig {
    /// Number of frame slots. Each slot owns its uniform, draw-data, transform and indirect buffers.
    pub frames_in_flight: usize,
    pub color_format: TextureFormat,
    pub depth_format: Option<TextureFormat>,
    pub cull_mode: CullMode,
}

impl Default for MultiMeshConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            color_format: TextureFormat::Rgba8Unorm,
            depth_format: Some(TextureFormat::D32Float),
            cull_mode: CullMode::Back,
        }
    }
}

/// SPIR-V for the vertex-pulling pipeline.
#[derive(Debug, Clone)]
pub struct MultiMeshShaders {
    pub vertex: Vec<u8>,
    pub vertex_entry: String,
    pub fragment: Vec<u8>,
    pub fragment_entry: String,
}

impl MultiMeshShaders {
    /// Shaders with the `vs_main` / `fs_main` entry points.
    pub fn new(vertex: Vec<u8>, fragment: Vec<u8>) -> Self {
        Self {
            vertex,
            vertex_entry: "vs_main".to_string(),
            fragment,
            fragment_entry: "fs_main".to_string(),
        }
    }
}
