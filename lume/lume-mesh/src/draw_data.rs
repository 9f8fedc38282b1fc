//! Per-instance draw table consumed by the multi-mesh renderer.

use bytemuck::{Pod, Zeroable};

use crate::mesh_data::{checked_add, MeshData};
use crate::types::Mesh;
use crate::{Error, Result};

/// One placed instance of a mesh.
///
/// `index_offset` is in indices, `vertex_offset` in vertices; the vertex fetched for index value
/// `i` is `i + vertex_offset`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawData {
    pub mesh_index: u32,
    pub material_index: u32,
    pub lod: u32,
    pub index_offset: u32,
    pub vertex_offset: u32,
    pub transform_index: u32,
}

impl DrawData {
    pub fn for_mesh(mesh_index: u32, mesh: &Mesh, lod: u32, transform_index: u32) -> Self {
        let mut row = Self {
            mesh_index,
            material_index: mesh.material_id,
            lod: 0,
            index_offset: mesh.index_offset(),
            vertex_offset: mesh.base_vertex(),
            transform_index,
        };
        row.select_lod(mesh, lod);
        row
    }

    /// Points the row at LOD `lod` of `mesh`, clamped to the coarsest LOD it has.
    pub fn select_lod(&mut self, mesh: &Mesh, lod: u32) {
        let lod = lod.min(mesh.lod_count.saturating_sub(1));
        self.lod = lod;
        self.index_offset = mesh.lod_offset[lod as usize];
    }

    /// Checks that the row names an existing mesh and one of its LODs.
    pub fn validate(&self, meshes: &[Mesh]) -> Result<()> {
        let mesh = meshes.get(self.mesh_index as usize).ok_or_else(|| {
            Error::Format(format!(
                "draw data references mesh {} of {}",
                self.mesh_index,
                meshes.len()
            ))
        })?;
        if self.lod >= mesh.lod_count {
            return Err(Error::Format(format!(
                "draw data requests lod {} of mesh {} with {} lods",
                self.lod, self.mesh_index, mesh.lod_count
            )));
        }
        Ok(())
    }
}

/// Default table for a container: one row per mesh at LOD 0, one transform per mesh.
pub fn build_draw_data(mesh_data: &MeshData) -> Vec<DrawData> {
    mesh_data
        .meshes
        .iter()
        .enumerate()
        .map(|(i, mesh)| DrawData::for_mesh(i as u32, mesh, 0, i as u32))
        .collect()
}

/// Concatenates the tables of containers merged with [`MeshData::merge`], in the same order.
///
/// Mesh and index offsets move by the meshes and indices of the containers before each part, and
/// transform indices by the transforms their tables reference. Vertex offsets stay as they are,
/// since the merge already shifted index values.
pub fn merge_draw_data(parts: &[(&MeshData, &[DrawData])]) -> Result<Vec<DrawData>> {
    let mut rows = Vec::with_capacity(parts.iter().map(|(_, d)| d.len()).sum());
    let mut mesh_total = 0u32;
    let mut index_total = 0u32;
    let mut transform_total = 0u32;
    for (mesh_data, draw_data) in parts {
        for row in draw_data.iter() {
            rows.push(DrawData {
                mesh_index: checked_add(row.mesh_index, mesh_total as u64, "mesh index")?,
                index_offset: checked_add(row.index_offset, index_total as u64, "index offset")?,
                transform_index: checked_add(
                    row.transform_index,
                    transform_total as u64,
                    "transform index",
                )?,
                ..*row
            });
        }
        mesh_total = checked_add(mesh_total, mesh_data.meshes.len() as u64, "mesh count")?;
        index_total = checked_add(index_total, mesh_data.index_data.len() as u64, "index count")?;
        let transforms = draw_data
            .iter()
            .map(|row| row.transform_index as u64 + 1)
            .max()
            .unwrap_or(0);
        transform_total = checked_add(transform_total, transforms, "transform count")?;
    }
    Ok(rows)
}
