//! Fixed-layout records of the mesh container file.
//!
//! Every record is `#[repr(C)]` and [`bytemuck::Pod`] so a slice of them is written to and read
//! from disk as raw bytes, with no per-field encoding step.

use bytemuck::{Pod, Zeroable};

use crate::{Error, Result};

/// Maximum number of LOD levels per mesh.
pub const MAX_LODS: usize = 8;
/// Maximum number of vertex streams per mesh.
pub const MAX_STREAMS: usize = 8;
/// Tag at the start of every container file.
pub const MESH_FILE_MAGIC: u32 = 0x1234_5678;

/// Placement of one logical mesh inside the shared index and vertex arrays.
///
/// `lod_offset` holds `lod_count + 1` cumulative offsets (in indices) into the shared index
/// array: LOD `l` spans `lod_offset[l]..lod_offset[l + 1]`. Entries past `lod_count` are zero.
/// `stream_offset` is a byte offset into the shared vertex array.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Mesh {
    pub lod_count: u32,
    pub stream_count: u32,
    /// Opaque reference to material data stored elsewhere.
    pub material_id: u32,
    /// Bytes of all LOD index lists plus the vertex stream of this mesh.
    pub mesh_size: u32,
    pub vertex_count: u32,
    pub lod_offset: [u32; MAX_LODS + 1],
    pub stream_offset: [u64; MAX_STREAMS],
    pub stream_element_size: [u32; MAX_STREAMS],
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            lod_count: 1,
            ..Zeroable::zeroed()
        }
    }
}

impl Mesh {
    /// Number of indices in LOD `lod`. Zero for LODs this mesh does not have.
    pub fn lod_index_count(&self, lod: u32) -> u32 {
        if lod >= self.lod_count || lod as usize >= MAX_LODS {
            return 0;
        }
        let lod = lod as usize;
        self.lod_offset[lod + 1] - self.lod_offset[lod]
    }

    /// First index of LOD 0 in the shared index array.
    pub fn index_offset(&self) -> u32 {
        self.lod_offset[0]
    }

    /// Indices over all LODs of this mesh.
    pub fn total_index_count(&self) -> u32 {
        self.lod_offsets().last().copied().unwrap_or(0) - self.index_offset()
    }

    /// The `lod_count + 1` meaningful entries of `lod_offset`.
    pub fn lod_offsets(&self) -> &[u32] {
        let end = (self.lod_count as usize).min(MAX_LODS) + 1;
        &self.lod_offset[..end]
    }

    /// Floats per vertex in the interleaved stream.
    pub fn floats_per_vertex(&self) -> u32 {
        self.stream_element_size[0] / std::mem::size_of::<f32>() as u32
    }

    /// Index of this mesh's first vertex in the shared vertex array.
    pub fn base_vertex(&self) -> u32 {
        match self.stream_element_size[0] {
            0 => 0,
            size => (self.stream_offset[0] / size as u64) as u32,
        }
    }

    /// Checks the record against the sizes of the arrays it points into.
    /// `index_len` is in indices, `vertex_len` in floats.
    pub fn validate(&self, index_len: usize, vertex_len: usize) -> Result<()> {
        if self.lod_count == 0 || self.lod_count as usize > MAX_LODS {
            return Err(Error::Format(format!(
                "lod count {} outside 1..={MAX_LODS}",
                self.lod_count
            )));
        }
        if self.stream_count == 0 || self.stream_count as usize > MAX_STREAMS {
            return Err(Error::Format(format!(
                "stream count {} outside 1..={MAX_STREAMS}",
                self.stream_count
            )));
        }
        let offsets = self.lod_offsets();
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Format(format!(
                "lod offsets {offsets:?} are not non-decreasing"
            )));
        }
        let end = *offsets.last().unwrap_or(&0) as usize;
        if end > index_len {
            return Err(Error::Format(format!(
                "lod offsets end at {end}, index array holds {index_len}"
            )));
        }
        let vertex_bytes = (vertex_len * std::mem::size_of::<f32>()) as u64;
        for stream in 0..self.stream_count as usize {
            let element_size = self.stream_element_size[stream];
            if element_size == 0 || element_size % 4 != 0 {
                return Err(Error::Format(format!(
                    "stream {stream} element size {element_size} is not a positive multiple of 4"
                )));
            }
            let stream_end =
                self.stream_offset[stream] + self.vertex_count as u64 * element_size as u64;
            if stream_end > vertex_bytes {
                return Err(Error::Format(format!(
                    "stream {stream} ends at byte {stream_end}, vertex array holds {vertex_bytes}"
                )));
            }
        }
        Ok(())
    }
}

/// Axis-aligned bounds of a mesh in object space.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// Tightest box around `points`; a zero box when there are none.
    pub fn from_points(points: impl IntoIterator<Item = [f32; 3]>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::default();
        };
        points.fold(Self::new(first, first), |mut b, p| {
            for axis in 0..3 {
                b.min[axis] = b.min[axis].min(p[axis]);
                b.max[axis] = b.max[axis].max(p[axis]);
            }
            b
        })
    }

    pub fn extent(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    pub fn contains(&self, p: [f32; 3]) -> bool {
        (0..3).all(|axis| self.min[axis] <= p[axis] && p[axis] <= self.max[axis])
    }
}

/// Header at the start of a container file.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshFileHeader {
    pub magic_value: u32,
    pub mesh_count: u32,
    /// Informational only; readers never seek to it.
    pub data_block_start_offset: u32,
    /// Bytes of index data.
    pub index_data_size: u32,
    /// Bytes of vertex data.
    pub vertex_data_size: u32,
}

/// Attributes interleaved per vertex: position, then UV (if present), then normal (if present).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexLayout {
    pub tex_coords: bool,
    pub normals: bool,
}

impl VertexLayout {
    pub const POSITION_FLOATS: u32 = 3;
    pub const UV_FLOATS: u32 = 2;
    pub const NORMAL_FLOATS: u32 = 3;

    pub fn floats_per_vertex(&self) -> u32 {
        Self::POSITION_FLOATS
            + if self.tex_coords { Self::UV_FLOATS } else { 0 }
            + if self.normals { Self::NORMAL_FLOATS } else { 0 }
    }

    pub fn element_size(&self) -> u32 {
        self.floats_per_vertex() * std::mem::size_of::<f32>() as u32
    }

    /// Float offset of the UV pair inside a vertex.
    pub fn uv_offset(&self) -> Option<u32> {
        self.tex_coords.then_some(Self::POSITION_FLOATS)
    }

    /// Float offset of the normal inside a vertex.
    pub fn normal_offset(&self) -> Option<u32> {
        self.normals.then(|| {
            Self::POSITION_FLOATS + if self.tex_coords { Self::UV_FLOATS } else { 0 }
        })
    }

    /// Recovers the layout from a stream element size in bytes (12, 20, 24 or 32).
    pub fn from_element_size(bytes: u32) -> Option<Self> {
        let layout = match bytes / 4 {
            3 => Self { tex_coords: false, normals: false },
            5 => Self { tex_coords: true, normals: false },
            6 => Self { tex_coords: false, normals: true },
            8 => Self { tex_coords: true, normals: true },
            _ => return None,
        };
        (bytes % 4 == 0).then_some(layout)
    }
}
