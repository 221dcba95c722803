//! Host-facing mesh buffer
//!
//! [`MeshBuffer`] is the flat, engine-neutral representation handed across
//! the library boundary: positions plus optional per-vertex attributes and a
//! triangle index list.

use meshreduce_core::{Point3f, TriangleMesh, Vector3f};
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

/// Indexed triangle list with optional per-vertex attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshBuffer {
    pub positions: Vec<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<[f32; 3]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uvs: Option<Vec<[f32; 2]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<[u8; 3]>>,
    /// Three indices per triangle
    pub indices: Vec<u32>,
}

impl MeshBuffer {
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            ..Default::default()
        }
    }

    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<[f32; 2]>) -> Self {
        self.uvs = Some(uvs);
        self
    }

    pub fn with_colors(mut self, colors: Vec<[u8; 3]>) -> Self {
        self.colors = Some(colors);
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    /// Iterate over triangles as index triples.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Check the buffer can be imported.
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.indices.len() % 3 != 0 {
            return Err(ImportError::NonTriangularFace {
                index_count: self.indices.len(),
            });
        }

        let vertex_count = self.positions.len();
        if let Some(found) = self.normals.as_ref().map(Vec::len) {
            check_attribute("normals", vertex_count, found)?;
        }
        if let Some(found) = self.uvs.as_ref().map(Vec::len) {
            check_attribute("uvs", vertex_count, found)?;
        }
        if let Some(found) = self.colors.as_ref().map(Vec::len) {
            check_attribute("colors", vertex_count, found)?;
        }

        if let Some(vertex) = self
            .positions
            .iter()
            .position(|p| !p.iter().all(|c| c.is_finite()))
        {
            return Err(ImportError::NonFinitePosition { vertex });
        }

        for (triangle, tri) in self.triangles().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(ImportError::DanglingIndex {
                    triangle,
                    index,
                    vertex_count,
                });
            }
        }

        Ok(())
    }

    /// Convert to the workspace mesh type.
    pub fn to_triangle_mesh(&self) -> TriangleMesh {
        let vertices = self
            .positions
            .iter()
            .map(|p| Point3f::new(p[0], p[1], p[2]))
            .collect();
        let faces = self
            .triangles()
            .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
            .collect();

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        mesh.normals = self
            .normals
            .as_ref()
            .map(|ns| ns.iter().map(|n| Vector3f::new(n[0], n[1], n[2])).collect());
        mesh.uvs = self.uvs.clone();
        mesh.colors = self.colors.clone();
        mesh
    }
}

fn check_attribute(attribute: &'static str, expected: usize, found: usize) -> Result<(), ImportError> {
    if expected == found {
        Ok(())
    } else {
        Err(ImportError::AttributeLengthMismatch {
            attribute,
            expected,
            found,
        })
    }
}

impl TryFrom<&TriangleMesh> for MeshBuffer {
    type Error = ImportError;

    fn try_from(mesh: &TriangleMesh) -> Result<Self, Self::Error> {
        let mut indices = Vec::with_capacity(mesh.faces.len() * 3);
        for &index in mesh.faces.iter().flatten() {
            let index = u32::try_from(index).map_err(|_| ImportError::IndexOverflow { index })?;
            indices.push(index);
        }

        Ok(Self {
            positions: mesh.vertices.iter().map(|p| [p.x, p.y, p.z]).collect(),
            normals: mesh
                .normals
                .as_ref()
                .map(|ns| ns.iter().map(|n| [n.x, n.y, n.z]).collect()),
            uvs: mesh.uvs.clone(),
            colors: mesh.colors.clone(),
            indices,
        })
    }
}
