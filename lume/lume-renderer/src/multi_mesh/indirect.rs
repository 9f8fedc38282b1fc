//! CPU rebuild of the per-frame indirect command buffer.

use bytemuck::{Pod, Zeroable};
use lume_mesh::{DrawData, Error, Mesh, Result};

/// One non-indexed draw, laid out like `VkDrawIndirectCommand`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

pub const DRAW_INDIRECT_COMMAND_SIZE: u32 = std::mem::size_of::<DrawIndirectCommand>() as u32;

/// One command per draw-data row, in row order.
///
/// Command `i` draws the index slice of the row's LOD and passes `i` as its instance index, which
/// the vertex shader uses to find the row again. Hidden rows keep their command with
/// `instance_count` 0. `visibility`, when given, must have one flag per row.
pub fn build_indirect_commands(
    meshes: &[Mesh],
    rows: &[DrawData],
    visibility: Option<&[bool]>,
) -> Result<Vec<DrawIndirectCommand>> {
    if let Some(flags) = visibility {
        if flags.len() != rows.len() {
            return Err(Error::Visibility {
                expected: rows.len(),
                actual: flags.len(),
            });
        }
    }
    let commands = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let vertex_count = meshes
                .get(row.mesh_index as usize)
                .map_or(0, |mesh| mesh.lod_index_count(row.lod));
            let visible = visibility.map_or(true, |flags| flags[i]);
            DrawIndirectCommand {
                vertex_count,
                instance_count: u32::from(visible),
                first_vertex: 0,
                first_instance: i as u32,
            }
        })
        .collect();
    Ok(commands)
}
