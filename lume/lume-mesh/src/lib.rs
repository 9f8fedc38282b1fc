//! Lume mesh container: the packed geometry format shared by the offline converter and the
//! multi-mesh renderer.
//!
//! A container holds every mesh of a scene in two flat arrays (u32 indices, f32 interleaved
//! vertices) plus one fixed-size [`Mesh`] record and one [`BoundingBox`] per mesh. The draw-data
//! table ([`DrawData`]) places mesh instances in the scene and is stored in a separate file.

pub mod draw_data;
pub mod error;
pub mod io;
pub mod mesh_data;
pub mod types;

pub use draw_data::{build_draw_data, merge_draw_data, DrawData};
pub use error::{Error, Result};
pub use io::{
    draw_data_path, load_draw_data, load_mesh_data, read_draw_data, read_mesh_data, save_draw_data,
    save_mesh_data, write_draw_data, write_mesh_data,
};
pub use mesh_data::MeshData;
pub use types::{
    BoundingBox, Mesh, MeshFileHeader, VertexLayout, MAX_LODS, MAX_STREAMS, MESH_FILE_MAGIC,
};
