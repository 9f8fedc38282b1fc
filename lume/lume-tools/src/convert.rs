//! Mesh conversion: imported meshes packed into a [`MeshData`] container.

use std::path::Path;

use log::{debug, info, warn};
use lume_mesh::{
    build_draw_data, BoundingBox, DrawData, Error, Mesh, MeshData, Result, VertexLayout, MAX_LODS,
};

use crate::import::{load_obj, ImportedMesh, ImportedScene};
use crate::simplify::{generate_lods_with, LodOptions, Meshopt, SimplifyPass};

/// Switches applied to every mesh of one conversion run.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertOptions {
    pub tex_coords: bool,
    pub normals: bool,
    /// Uniform scale applied to emitted positions. LODs are computed on unscaled positions.
    pub scale: f32,
    pub generate_lods: bool,
    pub lod: LodOptions,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            tex_coords: false,
            normals: false,
            scale: 0.01,
            generate_lods: false,
            lod: LodOptions::default(),
        }
    }
}

impl ConvertOptions {
    pub fn layout(&self) -> VertexLayout {
        VertexLayout {
            tex_coords: self.tex_coords,
            normals: self.normals,
        }
    }
}

/// Running state of a conversion: the container being filled and the next free index and
/// vertex positions in it. Meshes are appended strictly in call order.
#[derive(Debug)]
pub struct ConversionContext {
    options: ConvertOptions,
    data: MeshData,
    index_offset: u32,
    vertex_offset: u32,
}

impl ConversionContext {
    pub fn new(options: ConvertOptions) -> Self {
        Self {
            options,
            data: MeshData::new(),
            index_offset: 0,
            vertex_offset: 0,
        }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Next free position in the shared index array.
    pub fn index_offset(&self) -> u32 {
        self.index_offset
    }

    /// Next free vertex in the shared vertex array.
    pub fn vertex_offset(&self) -> u32 {
        self.vertex_offset
    }

    pub fn mesh_data(&self) -> &MeshData {
        &self.data
    }

    /// Converts one mesh with meshoptimizer LODs. Returns its index in the container.
    pub fn convert_mesh(&mut self, mesh: &ImportedMesh) -> Result<u32> {
        self.convert_mesh_with(&Meshopt, mesh)
    }

    pub fn convert_mesh_with<P: SimplifyPass + ?Sized>(
        &mut self,
        pass: &P,
        mesh: &ImportedMesh,
    ) -> Result<u32> {
        let layout = self.options.layout();
        let element_size = layout.element_size();
        let vertex_count = mesh.positions.len();

        if self.options.normals && mesh.normals.len() != vertex_count {
            return Err(Error::Format(format!(
                "mesh '{}': {} normals for {vertex_count} vertices",
                mesh.name,
                mesh.normals.len()
            )));
        }
        if let Some(tex_coords) = &mesh.tex_coords {
            if tex_coords.len() != vertex_count {
                return Err(Error::Format(format!(
                    "mesh '{}': {} uvs for {vertex_count} vertices",
                    mesh.name,
                    tex_coords.len()
                )));
            }
        }

        let scale = self.options.scale;
        let mut vertices = Vec::with_capacity(vertex_count * layout.floats_per_vertex() as usize);
        for (i, p) in mesh.positions.iter().enumerate() {
            vertices.extend_from_slice(&[p[0] * scale, p[1] * scale, p[2] * scale]);
            if layout.tex_coords {
                let [u, v] = mesh
                    .tex_coords
                    .as_ref()
                    .map_or([0.0, 0.0], |t| t[i]);
                vertices.extend_from_slice(&[u, 1.0 - v]);
            }
            if layout.normals {
                vertices.extend_from_slice(&mesh.normals[i]);
            }
        }

        let mut indices = Vec::with_capacity(mesh.faces.len() * 3);
        let mut skipped = 0usize;
        for face in &mesh.faces {
            if face.len() != 3 {
                skipped += 1;
                continue;
            }
            if let Some(&bad) = face.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(Error::Format(format!(
                    "mesh '{}': face index {bad} with {vertex_count} vertices",
                    mesh.name
                )));
            }
            indices.extend_from_slice(face);
        }
        if skipped > 0 {
            warn!("mesh '{}': skipped {skipped} non-triangle faces", mesh.name);
        }

        let mut lods = if self.options.generate_lods {
            let lod_options = LodOptions {
                max_lods: self.options.lod.max_lods.clamp(1, MAX_LODS),
                ..self.options.lod.clone()
            };
            generate_lods_with(pass, &indices, &mesh.positions, &lod_options)
        } else {
            vec![indices]
        };
        lods.truncate(MAX_LODS);

        let mut record = Mesh {
            lod_count: lods.len() as u32,
            stream_count: 1,
            material_id: mesh.material_index,
            vertex_count: vertex_count as u32,
            ..Default::default()
        };
        let mut cursor = self.index_offset;
        for (lod, list) in lods.iter().enumerate() {
            record.lod_offset[lod] = cursor;
            cursor += list.len() as u32;
        }
        record.lod_offset[lods.len()] = cursor;
        record.stream_offset[0] = self.vertex_offset as u64 * element_size as u64;
        record.stream_element_size[0] = element_size;
        let index_count = cursor - self.index_offset;
        record.mesh_size = index_count * std::mem::size_of::<u32>() as u32
            + vertex_count as u32 * element_size;

        let bounding_box = BoundingBox::from_points(lods[0].iter().map(|&i| {
            let p = mesh.positions[i as usize];
            [p[0] * scale, p[1] * scale, p[2] * scale]
        }));

        let flat: Vec<u32> = lods.concat();
        self.data.push_mesh(record, bounding_box, &flat, &vertices);
        self.index_offset = cursor;
        self.vertex_offset += vertex_count as u32;

        let mesh_index = self.data.meshes.len() as u32 - 1;
        info!(
            "mesh {mesh_index} '{}': {vertex_count} vertices, {} lods",
            mesh.name,
            lods.len()
        );
        for (lod, list) in lods.iter().enumerate() {
            debug!("  lod {lod}: {} indices", list.len());
        }
        Ok(mesh_index)
    }

    /// Converts every mesh of `scene` in order. A scene without meshes is rejected.
    pub fn convert_scene(&mut self, scene: &ImportedScene) -> Result<()> {
        self.convert_scene_with(&Meshopt, scene)
    }

    pub fn convert_scene_with<P: SimplifyPass + ?Sized>(
        &mut self,
        pass: &P,
        scene: &ImportedScene,
    ) -> Result<()> {
        if scene.meshes.is_empty() {
            return Err(Error::UnsupportedScene("scene contains no meshes".into()));
        }
        for (i, mesh) in scene.meshes.iter().enumerate() {
            debug!("converting mesh {}/{}", i + 1, scene.meshes.len());
            self.convert_mesh_with(pass, mesh)?;
        }
        Ok(())
    }

    /// Default draw table of everything converted so far.
    pub fn draw_data(&self) -> Vec<DrawData> {
        build_draw_data(&self.data)
    }

    pub fn finish(self) -> MeshData {
        self.data
    }
}

/// Imports `path` and converts every mesh in it. Returns the container and its default draw table.
pub fn convert_file(path: impl AsRef<Path>, options: ConvertOptions) -> Result<(MeshData, Vec<DrawData>)> {
    let scene = load_obj(path)?;
    let mut context = ConversionContext::new(options);
    context.convert_scene(&scene)?;
    let draw_data = context.draw_data();
    let data = context.finish();
    data.validate()?;
    Ok((data, draw_data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> ImportedMesh {
        let positions = vec![
            [-1.0, -1.0, -1.0],
            [1.0, -1.0, -1.0],
            [1.0, 1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0],
            [1.0, -1.0, 1.0],
            [1.0, 1.0, 1.0],
            [-1.0, 1.0, 1.0],
        ];
        let faces = [
            [0, 2, 1], [0, 3, 2], [4, 5, 6], [4, 6, 7], [0, 1, 5], [0, 5, 4],
            [2, 3, 7], [2, 7, 6], [1, 2, 6], [1, 6, 5], [0, 4, 7], [0, 7, 3],
        ]
        .iter()
        .map(|f| f.to_vec())
        .collect();
        let mut mesh = ImportedMesh {
            name: "cube".into(),
            positions,
            faces,
            ..Default::default()
        };
        mesh.generate_smooth_normals();
        mesh
    }

    fn triangle(name: &str) -> ImportedMesh {
        ImportedMesh {
            name: name.into(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            tex_coords: Some(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 0.25]]),
            faces: vec![vec![0, 1, 2]],
            material_index: 0,
        }
    }

    /// `n x n` quads on the XZ plane.
    fn grid(n: u32) -> ImportedMesh {
        let mut positions = Vec::new();
        for z in 0..=n {
            for x in 0..=n {
                positions.push([x as f32, 0.0, z as f32]);
            }
        }
        let mut faces = Vec::new();
        for z in 0..n {
            for x in 0..n {
                let i = z * (n + 1) + x;
                faces.push(vec![i, i + n + 1, i + 1]);
                faces.push(vec![i + 1, i + n + 1, i + n + 2]);
            }
        }
        ImportedMesh {
            name: "grid".into(),
            positions,
            faces,
            ..Default::default()
        }
    }

    #[test]
    fn cube_without_lods_is_one_lod() {
        let mut context = ConversionContext::new(ConvertOptions::default());
        context.convert_mesh(&cube()).unwrap();
        let data = context.finish();

        assert_eq!(data.meshes.len(), 1);
        let mesh = &data.meshes[0];
        assert_eq!(mesh.lod_count, 1);
        assert_eq!(mesh.lod_offsets(), [0, 36]);
        assert_eq!(mesh.vertex_count, 8);
        assert_eq!(mesh.stream_element_size[0], 12);
        assert_eq!(mesh.mesh_size, 36 * 4 + 8 * 12);
        assert_eq!(data.vertex_data.len(), 24);
        assert_eq!(data.vertex_data[..3], [-0.01, -0.01, -0.01]);
        assert_eq!(data.boxes[0].max, [0.01, 0.01, 0.01]);
        data.validate().unwrap();
    }

    #[test]
    fn sequential_meshes_share_cursors() {
        let mut context = ConversionContext::new(ConvertOptions::default());
        context.convert_mesh(&triangle("a")).unwrap();
        assert_eq!((context.index_offset(), context.vertex_offset()), (3, 3));
        context.convert_mesh(&triangle("b")).unwrap();

        let rows = context.draw_data();
        let data = context.finish();
        assert_eq!(data.index_data, [0, 1, 2, 0, 1, 2]);
        assert_eq!(data.meshes[1].lod_offsets(), [3, 6]);
        assert_eq!(data.meshes[1].stream_offset[0], 3 * 12);
        assert_eq!(rows[1].vertex_offset, 3);
        assert_eq!(rows[1].index_offset, 3);
    }

    #[test]
    fn full_vertex_layout_flips_v() {
        let options = ConvertOptions {
            tex_coords: true,
            normals: true,
            scale: 2.0,
            ..Default::default()
        };
        let mut context = ConversionContext::new(options);
        context.convert_mesh(&triangle("t")).unwrap();
        let data = context.finish();

        assert_eq!(data.meshes[0].stream_element_size[0], 32);
        assert_eq!(data.vertex_data.len(), 24);
        // Vertex 2: position, uv, normal.
        assert_eq!(data.vertex_data[16..24], [0.0, 2.0, 0.0, 0.0, 0.75, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn missing_uvs_are_zero_filled() {
        let options = ConvertOptions {
            tex_coords: true,
            ..Default::default()
        };
        let mut mesh = triangle("t");
        mesh.tex_coords = None;
        let mut context = ConversionContext::new(options);
        context.convert_mesh(&mesh).unwrap();
        assert_eq!(context.mesh_data().vertex_data[3..5], [0.0, 1.0]);
    }

    #[test]
    fn non_triangles_skipped_and_bad_input_rejected() {
        let mut mesh = triangle("t");
        mesh.faces.push(vec![0, 1]);
        mesh.faces.push(vec![0, 1, 2, 0]);
        let mut context = ConversionContext::new(ConvertOptions::default());
        context.convert_mesh(&mesh).unwrap();
        assert_eq!(context.mesh_data().index_data.len(), 3);

        let mut bad = triangle("bad");
        bad.faces.push(vec![0, 1, 3]);
        assert!(matches!(context.convert_mesh(&bad), Err(Error::Format(_))));

        let mut no_normals = triangle("flat");
        no_normals.normals.clear();
        let mut context = ConversionContext::new(ConvertOptions {
            normals: true,
            ..Default::default()
        });
        assert!(matches!(context.convert_mesh(&no_normals), Err(Error::Format(_))));
    }

    #[test]
    fn empty_scene_is_unsupported() {
        let mut context = ConversionContext::new(ConvertOptions::default());
        let result = context.convert_scene(&ImportedScene::default());
        assert!(matches!(result, Err(Error::UnsupportedScene(_))));
    }

    #[test]
    fn generated_lods_pack_contiguously() {
        let options = ConvertOptions {
            generate_lods: true,
            ..Default::default()
        };
        let scene = ImportedScene {
            meshes: vec![triangle("first"), grid(40)],
        };
        let mut context = ConversionContext::new(options);
        context.convert_scene(&scene).unwrap();
        let data = context.finish();
        data.validate().unwrap();

        assert_eq!(data.meshes[0].lod_count, 1);
        let grid = &data.meshes[1];
        assert!(grid.lod_count >= 2);
        assert_eq!(grid.index_offset(), 3);
        assert_eq!(grid.lod_index_count(0), 40 * 40 * 6);
        assert!(grid.lod_offsets().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*grid.lod_offsets().last().unwrap() as usize, data.index_data.len());
    }
}
