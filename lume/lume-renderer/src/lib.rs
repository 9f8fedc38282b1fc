//! Lume Renderer: draws a packed mesh container with one indirect multi-draw per frame.
//!
//! [`MultiMeshRenderer`] owns the GPU copies of the container geometry and, per frame slot, the
//! draw-data table, instance transforms, uniforms and indirect commands. Callers drive frame
//! pacing: a slot may only be updated once the submission that last read it has completed.

pub mod config;
pub mod multi_mesh;

pub use config::{MultiMeshConfig, MultiMeshShaders};
pub use multi_mesh::{
    build_indirect_commands, DrawIndirectCommand, GeometryLayout, Mat4, MultiMeshRenderer,
    PerFrameData, IDENTITY,
};
