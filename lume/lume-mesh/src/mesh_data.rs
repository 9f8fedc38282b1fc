//! In-memory mesh container: shared index and vertex arrays plus per-mesh records.

use log::debug;

use crate::types::{BoundingBox, Mesh, MeshFileHeader, MESH_FILE_MAGIC};
use crate::{Error, Result};

/// Packed geometry of a whole scene.
///
/// Index values are relative to the owning mesh's base vertex. After [`MeshData::merge`] the
/// values of every container past the first are additionally shifted by the vertex count of the
/// containers before it, so the vertex fetched for index `i` of mesh `m` is always
/// `i + m.base_vertex()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub index_data: Vec<u32>,
    pub vertex_data: Vec<f32>,
    pub meshes: Vec<Mesh>,
    pub boxes: Vec<BoundingBox>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header describing the live arrays. Never cached.
    ///
    /// Fails when a count or byte size does not fit the header's u32 fields.
    pub fn header(&self) -> Result<MeshFileHeader> {
        let table_bytes = byte_size(self.meshes.len(), std::mem::size_of::<Mesh>(), "mesh table")?;
        Ok(MeshFileHeader {
            magic_value: MESH_FILE_MAGIC,
            mesh_count: format_u32(self.meshes.len() as u64, "mesh count")?,
            data_block_start_offset: checked_add(
                std::mem::size_of::<MeshFileHeader>() as u32,
                table_bytes as u64,
                "data block offset",
            )?,
            index_data_size: byte_size(self.index_data.len(), std::mem::size_of::<u32>(), "index data")?,
            vertex_data_size: byte_size(
                self.vertex_data.len(),
                std::mem::size_of::<f32>(),
                "vertex data",
            )?,
        })
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Vertices owned by this container, summed over its meshes.
    pub fn vertex_count(&self) -> u64 {
        self.meshes.iter().map(|m| m.vertex_count as u64).sum()
    }

    /// Appends one mesh record with its geometry. The record's offsets must already point at the
    /// current ends of the index and vertex arrays.
    pub fn push_mesh(
        &mut self,
        mesh: Mesh,
        bounding_box: BoundingBox,
        indices: &[u32],
        vertices: &[f32],
    ) {
        self.meshes.push(mesh);
        self.boxes.push(bounding_box);
        self.index_data.extend_from_slice(indices);
        self.vertex_data.extend_from_slice(vertices);
    }

    /// Indices of LOD `lod` of mesh `mesh_index`.
    pub fn lod_indices(&self, mesh_index: usize, lod: u32) -> Option<&[u32]> {
        let mesh = self.meshes.get(mesh_index)?;
        if lod >= mesh.lod_count {
            return None;
        }
        let start = mesh.lod_offset[lod as usize] as usize;
        let end = mesh.lod_offset[lod as usize + 1] as usize;
        self.index_data.get(start..end)
    }

    /// The full interleaved vertex of `mesh` for index value `index`.
    pub fn vertex(&self, mesh: &Mesh, index: u32) -> Option<&[f32]> {
        let stride = mesh.floats_per_vertex() as usize;
        let start = (index as usize + mesh.base_vertex() as usize) * stride;
        self.vertex_data.get(start..start + stride)
    }

    /// Position of `mesh`'s vertex for index value `index`.
    pub fn vertex_position(&self, mesh: &Mesh, index: u32) -> Option<[f32; 3]> {
        match self.vertex(mesh, index)? {
            [x, y, z, ..] => Some([*x, *y, *z]),
            _ => None,
        }
    }

    /// Rebuilds every bounding box from the LOD 0 indices of its mesh.
    pub fn recalculate_bounding_boxes(&mut self) -> Result<()> {
        let mut boxes = Vec::with_capacity(self.meshes.len());
        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            let indices = self.lod_indices(mesh_index, 0).unwrap_or(&[]);
            let points = indices
                .iter()
                .map(|&i| {
                    self.vertex_position(mesh, i).ok_or_else(|| {
                        Error::Format(format!(
                            "mesh {mesh_index}: index {i} is outside the vertex array"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            boxes.push(BoundingBox::from_points(points));
        }
        self.boxes = boxes;
        Ok(())
    }

    /// Checks parallel array lengths, every mesh record, and every index value.
    pub fn validate(&self) -> Result<()> {
        if self.boxes.len() != self.meshes.len() {
            return Err(Error::Format(format!(
                "{} bounding boxes for {} meshes",
                self.boxes.len(),
                self.meshes.len()
            )));
        }
        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            mesh.validate(self.index_data.len(), self.vertex_data.len())
                .map_err(|e| match e {
                    Error::Format(message) => Error::Format(format!("mesh {mesh_index}: {message}")),
                    other => other,
                })?;
            for lod in 0..mesh.lod_count {
                let indices = self.lod_indices(mesh_index, lod).unwrap_or(&[]);
                if let Some(&bad) = indices
                    .iter()
                    .find(|&&i| self.vertex(mesh, i).is_none())
                {
                    return Err(Error::Format(format!(
                        "mesh {mesh_index} lod {lod}: index {bad} is outside the vertex array"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Concatenates `parts` into one container.
    ///
    /// LOD offsets of each part are shifted by the indices of the parts before it, and its index
    /// values by their vertices. Vertex counts, LOD deltas and stream layout are left alone, so
    /// every mesh of every part must share one vertex stride.
    pub fn merge(parts: &[&MeshData]) -> Result<MeshData> {
        let stride = parts
            .iter()
            .find_map(|p| p.meshes.first())
            .map(|m| m.stream_element_size[0]);
        for (part_index, part) in parts.iter().enumerate() {
            if let Some((mesh_index, mesh)) = part
                .meshes
                .iter()
                .enumerate()
                .find(|(_, m)| Some(m.stream_element_size[0]) != stride)
            {
                return Err(Error::Format(format!(
                    "part {part_index} mesh {mesh_index}: vertex stride {} differs from {}",
                    mesh.stream_element_size[0],
                    stride.unwrap_or_default()
                )));
            }
        }

        let mut merged = MeshData {
            index_data: Vec::with_capacity(parts.iter().map(|p| p.index_data.len()).sum()),
            vertex_data: Vec::with_capacity(parts.iter().map(|p| p.vertex_data.len()).sum()),
            meshes: Vec::with_capacity(parts.iter().map(|p| p.meshes.len()).sum()),
            boxes: Vec::with_capacity(parts.iter().map(|p| p.boxes.len()).sum()),
        };
        let mut index_total = 0u32;
        let mut vertex_total = 0u32;
        for part in parts {
            for mesh in &part.meshes {
                let mut mesh = *mesh;
                let lods = (mesh.lod_count as usize).min(crate::MAX_LODS);
                for offset in &mut mesh.lod_offset[..=lods] {
                    *offset = checked_add(*offset, index_total as u64, "lod offset")?;
                }
                merged.meshes.push(mesh);
            }
            merged.boxes.extend_from_slice(&part.boxes);
            for &index in &part.index_data {
                merged
                    .index_data
                    .push(checked_add(index, vertex_total as u64, "index value")?);
            }
            merged.vertex_data.extend_from_slice(&part.vertex_data);
            debug!(
                "merged part with {} meshes at index {index_total}, vertex {vertex_total}",
                part.meshes.len()
            );
            index_total = checked_add(index_total, part.index_data.len() as u64, "index count")?;
            vertex_total = checked_add(vertex_total, part.vertex_count(), "vertex count")?;
        }
        Ok(merged)
    }
}

/// Narrows `value` to one of the format's u32 fields.
pub(crate) fn format_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Format(format!("{what} of {value} does not fit in 32 bits")))
}

/// `base + value`, failing instead of wrapping past `u32::MAX`.
pub(crate) fn checked_add(base: u32, value: u64, what: &str) -> Result<u32> {
    format_u32((base as u64).saturating_add(value), what)
}

fn byte_size(len: usize, element_size: usize, what: &str) -> Result<u32> {
    format_u32((len as u64).saturating_mul(element_size as u64), what)
}
