//! OBJ format support
//!
//! Reading goes through the `obj` crate. Every distinct `position/uv/normal`
//! tuple referenced by a face becomes one output vertex, so texture seams
//! survive as split vertices and unreferenced positions are dropped.
//! Writing emits `v`, `vt`, `vn` and `f` lines; OBJ has no standard slot
//! for vertex colors, so they are not written.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use meshreduce_core::{Point3f, Result, TriangleMesh, Vector3f};
use obj::{IndexTuple, ObjData};

use crate::error::IoError;
use crate::{open_error, push_polygon, MeshReader, MeshWriter};

pub struct ObjReader;
pub struct ObjWriter;

/// Position, texture and normal index of one face corner
type Corner = (usize, Option<usize>, Option<usize>);

impl MeshReader for ObjReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| open_error(path, e))?;
        let data = ObjData::load_buf(BufReader::new(file))
            .map_err(|e| IoError::parse(format!("failed to read OBJ: {e}")))?;
        Ok(obj_data_to_mesh(&data)?)
    }
}

fn obj_data_to_mesh(data: &ObjData) -> std::result::Result<TriangleMesh, IoError> {
    let mut slots: HashMap<Corner, usize> = HashMap::new();
    let mut corners: Vec<Corner> = Vec::new();
    let mut faces = Vec::new();

    let polygons = data
        .objects
        .iter()
        .flat_map(|object| &object.groups)
        .flat_map(|group| &group.polys);
    for polygon in polygons {
        let mut indices = Vec::with_capacity(polygon.0.len());
        for IndexTuple(p, t, n) in &polygon.0 {
            let corner = (*p, *t, *n);
            let slot = *slots.entry(corner).or_insert_with(|| {
                corners.push(corner);
                corners.len() - 1
            });
            indices.push(slot);
        }
        push_polygon(&indices, corners.len(), &mut faces)?;
    }

    let lookup = |table: &str, len: usize, index: usize| {
        if index < len {
            Ok(index)
        } else {
            Err(IoError::invalid(format!(
                "{table} index {} is out of range ({len} defined)",
                index + 1
            )))
        }
    };

    let mut vertices = Vec::with_capacity(corners.len());
    for &(p, _, _) in &corners {
        let [x, y, z] = data.position[lookup("position", data.position.len(), p)?];
        vertices.push(Point3f::new(x, y, z));
    }

    // An attribute is kept only when every corner references it
    let uvs = corners
        .iter()
        .map(|&(_, t, _)| t)
        .collect::<Option<Vec<usize>>>()
        .map(|ts| {
            ts.into_iter()
                .map(|t| Ok(data.texture[lookup("texture", data.texture.len(), t)?]))
                .collect::<std::result::Result<Vec<_>, IoError>>()
        })
        .transpose()?;
    let normals = corners
        .iter()
        .map(|&(_, _, n)| n)
        .collect::<Option<Vec<usize>>>()
        .map(|ns| {
            ns.into_iter()
                .map(|n| {
                    let [x, y, z] = data.normal[lookup("normal", data.normal.len(), n)?];
                    Ok(Vector3f::new(x, y, z))
                })
                .collect::<std::result::Result<Vec<_>, IoError>>()
        })
        .transpose()?;

    let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
    if let Some(uvs) = uvs.filter(|u| !u.is_empty()) {
        mesh.set_uvs(uvs);
    }
    if let Some(normals) = normals.filter(|n| !n.is_empty()) {
        mesh.set_normals(normals);
    }
    Ok(mesh)
}

impl MeshWriter for ObjWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_obj(mesh, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn write_obj<W: Write>(mesh: &TriangleMesh, writer: &mut W) -> std::io::Result<()> {
    if mesh.colors.is_some() {
        tracing::warn!("OBJ output does not keep vertex colors");
    }

    writeln!(writer, "# Generated by meshreduce")?;
    writeln!(writer, "# {} vertices, {} faces", mesh.vertex_count(), mesh.face_count())?;

    for v in &mesh.vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }
    if let Some(uvs) = &mesh.uvs {
        for [u, v] in uvs {
            writeln!(writer, "vt {u} {v}")?;
        }
    }
    if let Some(normals) = &mesh.normals {
        for n in normals {
            writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
        }
    }

    let uvs = mesh.uvs.is_some();
    let normals = mesh.normals.is_some();
    for face in &mesh.faces {
        write!(writer, "f")?;
        for &i in face {
            let i = i + 1;
            match (uvs, normals) {
                (true, true) => write!(writer, " {i}/{i}/{i}")?,
                (true, false) => write!(writer, " {i}/{i}")?,
                (false, true) => write!(writer, " {i}//{i}")?,
                (false, false) => write!(writer, " {i}")?,
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}
