//! Placement of the vertex and index regions inside the shared geometry buffer.

/// Byte layout of the geometry buffer: vertex floats first, zero padding, then u32 indices
/// starting at a storage-buffer offset the device accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryLayout {
    pub vertex_bytes: u64,
    pub padding: u64,
    pub index_offset: u64,
    pub index_bytes: u64,
}

impl GeometryLayout {
    pub fn new(vertex_bytes: u64, index_bytes: u64, alignment: u64) -> Self {
        let alignment = alignment.max(1);
        let index_offset = vertex_bytes.div_ceil(alignment) * alignment;
        Self {
            vertex_bytes,
            padding: index_offset - vertex_bytes,
            index_offset,
            index_bytes,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.index_offset + self.index_bytes
    }

    /// Buffer contents for this layout.
    pub fn pack(&self, vertices: &[f32], indices: &[u32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.total_size() as usize);
        bytes.extend_from_slice(bytemuck::cast_slice(vertices));
        bytes.resize(self.index_offset as usize, 0);
        bytes.extend_from_slice(bytemuck::cast_slice(indices));
        bytes
    }
}
