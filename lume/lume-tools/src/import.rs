//! Scene import: OBJ files through `tobj`, flattened into the converter's input form.

use std::path::Path;

use log::{debug, info};
use lume_mesh::{Error, Result};

/// One importer mesh: per-vertex attributes plus a face list referencing them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportedMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    /// Empty, or one normal per position.
    pub normals: Vec<[f32; 3]>,
    /// UV set 0, one pair per position when present.
    pub tex_coords: Option<Vec<[f32; 2]>>,
    /// Vertex indices per face. Faces that are not triangles are skipped by the converter.
    pub faces: Vec<Vec<u32>>,
    pub material_index: u32,
}

impl ImportedMesh {
    /// Replaces the normals with smooth, area-weighted vertex normals built from the triangles.
    pub fn generate_smooth_normals(&mut self) {
        let mut normals = vec![[0.0f32; 3]; self.positions.len()];
        for face in self.faces.iter().filter(|f| f.len() == 3) {
            let [a, b, c] = [face[0] as usize, face[1] as usize, face[2] as usize];
            let (Some(pa), Some(pb), Some(pc)) =
                (self.positions.get(a), self.positions.get(b), self.positions.get(c))
            else {
                continue;
            };
            let e1 = sub(*pb, *pa);
            let e2 = sub(*pc, *pa);
            // The cross product's length is twice the triangle area.
            let n = cross(e1, e2);
            for i in [a, b, c] {
                for axis in 0..3 {
                    normals[i][axis] += n[axis];
                }
            }
        }
        for n in &mut normals {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            if len > f32::EPSILON {
                *n = [n[0] / len, n[1] / len, n[2] / len];
            }
        }
        self.normals = normals;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportedScene {
    pub meshes: Vec<ImportedMesh>,
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn from_tobj(model: tobj::Model) -> ImportedMesh {
    let mesh = model.mesh;
    let positions: Vec<[f32; 3]> = mesh
        .positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect();
    let normals: Vec<[f32; 3]> = mesh
        .normals
        .chunks_exact(3)
        .map(|n| [n[0], n[1], n[2]])
        .collect();
    let tex_coords = (!mesh.texcoords.is_empty()).then(|| {
        mesh.texcoords
            .chunks_exact(2)
            .map(|t| [t[0], t[1]])
            .collect::<Vec<_>>()
    });

    // Without arities every face is a triangle.
    let faces = if mesh.face_arities.is_empty() {
        mesh.indices.chunks(3).map(<[u32]>::to_vec).collect()
    } else {
        let mut faces = Vec::with_capacity(mesh.face_arities.len());
        let mut start = 0usize;
        for &arity in &mesh.face_arities {
            let end = (start + arity as usize).min(mesh.indices.len());
            faces.push(mesh.indices[start..end].to_vec());
            start = end;
        }
        faces
    };

    let mut imported = ImportedMesh {
        name: model.name,
        normals: if normals.len() == positions.len() {
            normals
        } else {
            Vec::new()
        },
        positions,
        tex_coords,
        faces,
        material_index: mesh.material_id.unwrap_or(0) as u32,
    };
    if imported.normals.is_empty() {
        debug!("{}: generating smooth normals", imported.name);
        imported.generate_smooth_normals();
    }
    imported
}

/// Loads an OBJ file as triangulated, single-index meshes with normals.
pub fn load_obj(path: impl AsRef<Path>) -> Result<ImportedScene> {
    let path = path.as_ref();
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) = tobj::load_obj(path, &options).map_err(|e| {
        Error::UnsupportedScene(format!("unable to load '{}': {e}", path.display()))
    })?;
    let models: Vec<_> = models
        .into_iter()
        .filter(|m| !m.mesh.indices.is_empty())
        .collect();
    if models.is_empty() {
        return Err(Error::UnsupportedScene(format!(
            "'{}' contains no meshes",
            path.display()
        )));
    }
    let scene = ImportedScene {
        meshes: models.into_iter().map(from_tobj).collect(),
    };
    info!("loaded '{}': {} meshes", path.display(), scene.meshes.len());
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_OBJ: &str = "\
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn loads_and_triangulates_obj() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        std::fs::write(&path, QUAD_OBJ).unwrap();

        let scene = load_obj(&path).unwrap();
        assert_eq!(scene.meshes.len(), 1);
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.faces.len(), 2);
        assert!(mesh.faces.iter().all(|f| f.len() == 3));
        assert_eq!(mesh.tex_coords.as_ref().map(Vec::len), Some(4));
        // No normals in the file: generated, facing +Z.
        assert_eq!(mesh.normals.len(), 4);
        for n in &mesh.normals {
            assert!((n[2] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn empty_or_missing_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.obj");
        std::fs::write(&empty, "# nothing\n").unwrap();
        assert!(matches!(load_obj(&empty), Err(Error::UnsupportedScene(_))));
        assert!(matches!(
            load_obj(dir.path().join("missing.obj")),
            Err(Error::UnsupportedScene(_))
        ));
    }

    #[test]
    fn smooth_normals_average_adjacent_faces() {
        let mut mesh = ImportedMesh {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            faces: vec![vec![0, 1, 2], vec![0, 3, 1]],
            ..Default::default()
        };
        mesh.generate_smooth_normals();
        let shared = mesh.normals[0];
        let inv = 1.0 / 2f32.sqrt();
        assert!((shared[0]).abs() < 1e-6);
        assert!((shared[1] - inv).abs() < 1e-6);
        assert!((shared[2] - inv).abs() < 1e-6);
        assert_eq!(mesh.normals[2], [0.0, 0.0, 1.0]);
    }
}
