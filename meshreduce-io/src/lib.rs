//! Mesh file readers and writers
//!
//! This crate loads and saves [`TriangleMesh`] values as Wavefront OBJ, PLY or
//! binary glTF (GLB).
//! Polygons with more than three corners are fan-triangulated on read.
//! Normals, texture coordinates and colors are carried through whenever the
//! format can hold them.

pub mod error;
pub mod glb;
pub mod obj;
pub mod ply;

pub use error::*;
pub use glb::{GlbReader, GlbWriter};
pub use obj::{ObjReader, ObjWriter};
pub use ply::{PlyReader, PlyWriter};

use std::path::Path;

use meshreduce_core::{Error, Result, TriangleMesh};

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()>;
}

/// Mesh file formats known to [`read_mesh`] and [`write_mesh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Obj,
    Ply,
    Glb,
}

impl MeshFormat {
    /// Detect the format from a file extension, ignoring case.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "obj" => Some(Self::Obj),
            "ply" => Some(Self::Ply),
            "glb" => Some(Self::Glb),
            _ => None,
        }
    }

    fn detect(path: &Path) -> Result<Self> {
        Self::from_path(path).ok_or_else(|| {
            IoError::UnknownFormat {
                extension: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("(none)")
                    .to_string(),
            }
            .into()
        })
    }
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    match MeshFormat::detect(path)? {
        MeshFormat::Obj => ObjReader::read_mesh(path),
        MeshFormat::Ply => PlyReader::read_mesh(path),
        MeshFormat::Glb => GlbReader::read_mesh(path),
    }
}

/// Auto-detect format and write mesh
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match MeshFormat::detect(path)? {
        MeshFormat::Obj => ObjWriter::write_mesh(mesh, path),
        MeshFormat::Ply => PlyWriter::write_mesh(mesh, path),
        MeshFormat::Glb => GlbWriter::write_mesh(mesh, path),
    }
}

/// Fan-triangulate one polygon, checking its corners against `vertex_count`.
///
/// Polygons with fewer than three corners are skipped.
pub(crate) fn push_polygon(
    corners: &[usize],
    vertex_count: usize,
    faces: &mut Vec<[usize; 3]>,
) -> std::result::Result<(), IoError> {
    if let Some(&bad) = corners.iter().find(|&&c| c >= vertex_count) {
        return Err(IoError::invalid(format!(
            "face references vertex {bad} but only {vertex_count} vertices exist"
        )));
    }
    if corners.len() < 3 {
        return Ok(());
    }
    for i in 1..corners.len() - 1 {
        faces.push([corners[0], corners[i], corners[i + 1]]);
    }
    Ok(())
}

/// Turn an I/O failure while opening `path` into the workspace error.
pub(crate) fn open_error(path: &Path, error: std::io::Error) -> Error {
    IoError::opening(path, error).into()
}
