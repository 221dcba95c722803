//! PLY format support
//!
//! Vertices carry `x y z`, optionally `nx ny nz` and `red green blue`.
//! Faces are read from `vertex_indices` (or `vertex_index`) and written as
//! `vertex_indices`. Files are written as ASCII.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use meshreduce_core::{Point3f, Result, Rgb, TriangleMesh, Vector3f};
use ply_rs::{
    parser::Parser,
    ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    },
    writer::Writer,
};

use crate::error::IoError;
use crate::{open_error, push_polygon, MeshReader, MeshWriter};

pub struct PlyReader;
pub struct PlyWriter;

impl MeshReader for PlyReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| open_error(path, e))?;
        let mut reader = BufReader::new(file);

        let parser = Parser::<DefaultElement>::new();
        let ply = parser
            .read_ply(&mut reader)
            .map_err(|e| IoError::parse(format!("failed to read PLY: {e}")))?;

        let empty = Vec::new();
        let vertex_elements = ply.payload.get("vertex").unwrap_or(&empty);

        let mut vertices = Vec::with_capacity(vertex_elements.len());
        for vertex in vertex_elements {
            let x = extract_property_value(vertex, "x")?;
            let y = extract_property_value(vertex, "y")?;
            let z = extract_property_value(vertex, "z")?;
            vertices.push(Point3f::new(x, y, z));
        }

        let mut faces = Vec::new();
        if let Some(face_elements) = ply.payload.get("face") {
            faces.reserve(face_elements.len());
            for face in face_elements {
                let indices = extract_face_indices(face)?;
                push_polygon(&indices, vertices.len(), &mut faces)?;
            }
        }

        // Optional attributes only count when every vertex has them
        let normals: Option<Vec<Vector3f>> = vertex_elements
            .iter()
            .map(|vertex| {
                Some(Vector3f::new(
                    extract_property_value(vertex, "nx").ok()?,
                    extract_property_value(vertex, "ny").ok()?,
                    extract_property_value(vertex, "nz").ok()?,
                ))
            })
            .collect();
        let colors: Option<Vec<Rgb>> = vertex_elements
            .iter()
            .map(|vertex| {
                Some([
                    extract_color_channel(vertex, "red")?,
                    extract_color_channel(vertex, "green")?,
                    extract_color_channel(vertex, "blue")?,
                ])
            })
            .collect();

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        if let Some(normals) = normals.filter(|n| !n.is_empty()) {
            mesh.set_normals(normals);
        }
        if let Some(colors) = colors.filter(|c| !c.is_empty()) {
            mesh.set_colors(colors);
        }

        Ok(mesh)
    }
}

impl MeshWriter for PlyWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = Encoding::Ascii;
        ply.header.comments.push("Generated by meshreduce".to_string());

        let mut vertex_element = ElementDef::new("vertex".to_string());
        vertex_element.count = mesh.vertices.len();
        let mut scalar = |name: &str, kind: ScalarType| {
            vertex_element
                .properties
                .add(PropertyDef::new(name.to_string(), PropertyType::Scalar(kind)));
        };
        for name in ["x", "y", "z"] {
            scalar(name, ScalarType::Float);
        }
        if mesh.normals.is_some() {
            for name in ["nx", "ny", "nz"] {
                scalar(name, ScalarType::Float);
            }
        }
        if mesh.colors.is_some() {
            for name in ["red", "green", "blue"] {
                scalar(name, ScalarType::UChar);
            }
        }
        ply.header.elements.add(vertex_element);

        let mut face_element = ElementDef::new("face".to_string());
        face_element.count = mesh.faces.len();
        face_element.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        ply.header.elements.add(face_element);

        if mesh.uvs.is_some() {
            tracing::warn!("PLY output does not keep texture coordinates");
        }

        let mut vertices = Vec::with_capacity(mesh.vertices.len());
        for (i, vertex) in mesh.vertices.iter().enumerate() {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(vertex.x));
            element.insert("y".to_string(), Property::Float(vertex.y));
            element.insert("z".to_string(), Property::Float(vertex.z));

            if let Some(normal) = mesh.normals.as_ref().and_then(|n| n.get(i)) {
                element.insert("nx".to_string(), Property::Float(normal.x));
                element.insert("ny".to_string(), Property::Float(normal.y));
                element.insert("nz".to_string(), Property::Float(normal.z));
            }
            if let Some(&[r, g, b]) = mesh.colors.as_ref().and_then(|c| c.get(i)) {
                element.insert("red".to_string(), Property::UChar(r));
                element.insert("green".to_string(), Property::UChar(g));
                element.insert("blue".to_string(), Property::UChar(b));
            }

            vertices.push(element);
        }
        ply.payload.insert("vertex".to_string(), vertices);

        let mut faces = Vec::with_capacity(mesh.faces.len());
        for face in &mesh.faces {
            let indices = face
                .iter()
                .map(|&i| {
                    i32::try_from(i).map_err(|_| {
                        IoError::invalid(format!("vertex index {i} does not fit a PLY int"))
                    })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let mut element = DefaultElement::new();
            element.insert("vertex_indices".to_string(), Property::ListInt(indices));
            faces.push(element);
        }
        ply.payload.insert("face".to_string(), faces);

        Writer::new().write_ply(&mut writer, &mut ply)?;
        writer.flush()?;

        Ok(())
    }
}

/// Extract a property value as f32 from a PLY element
fn extract_property_value(element: &DefaultElement, name: &str) -> std::result::Result<f32, IoError> {
    match element.get(name) {
        Some(Property::Float(val)) => Ok(*val),
        Some(Property::Double(val)) => Ok(*val as f32),
        Some(Property::Int(val)) => Ok(*val as f32),
        Some(Property::UInt(val)) => Ok(*val as f32),
        _ => Err(IoError::parse(format!("property '{name}' not found or invalid type"))),
    }
}

/// Extract an 8-bit color channel; float channels are read as `[0, 1]`.
fn extract_color_channel(element: &DefaultElement, name: &str) -> Option<u8> {
    match element.get(name)? {
        Property::UChar(val) => Some(*val),
        Property::Float(val) => Some((val.clamp(0.0, 1.0) * 255.0).round() as u8),
        Property::Double(val) => Some((val.clamp(0.0, 1.0) * 255.0).round() as u8),
        _ => None,
    }
}

/// Extract face indices from a PLY face element
fn extract_face_indices(element: &DefaultElement) -> std::result::Result<Vec<usize>, IoError> {
    let negative = |idx: i64| IoError::invalid(format!("negative vertex index {idx}"));
    match element.get("vertex_indices").or_else(|| element.get("vertex_index")) {
        Some(Property::ListInt(indices)) => indices
            .iter()
            .map(|&idx| usize::try_from(idx).map_err(|_| negative(idx.into())))
            .collect(),
        Some(Property::ListUInt(indices)) => Ok(indices.iter().map(|&idx| idx as usize).collect()),
        Some(Property::ListUShort(indices)) => Ok(indices.iter().map(|&idx| usize::from(idx)).collect()),
        Some(Property::ListUChar(indices)) => Ok(indices.iter().map(|&idx| usize::from(idx)).collect()),
        _ => Err(IoError::parse("face indices not found")),
    }
}
