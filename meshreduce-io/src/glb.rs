//! Binary glTF (GLB) support
//!
//! Reading goes through the `gltf` crate. Every triangle primitive of every
//! mesh is merged into one [`TriangleMesh`]; node transforms are not applied.
//! `NORMAL`, `TEXCOORD_0` and `COLOR_0` are kept when every primitive has them.
//!
//! Writing produces a single mesh with one primitive, a JSON chunk and a BIN
//! chunk holding float attributes and `u16` or `u32` indices.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use gltf::buffer::Source;
use gltf::mesh::Mode;
use meshreduce_core::{Point3f, Result, Rgb, TriangleMesh, Vector3f};
use serde_json::{json, Value};

use crate::error::IoError;
use crate::{open_error, push_polygon, MeshReader, MeshWriter};

const GLB_MAGIC: &[u8; 4] = b"glTF";
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const UNSIGNED_SHORT: u32 = 5123;
const UNSIGNED_INT: u32 = 5125;
const FLOAT: u32 = 5126;

pub struct GlbReader;
pub struct GlbWriter;

impl MeshReader for GlbReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| open_error(path, e))?;
        Ok(parse_glb(&bytes)?)
    }
}

fn parse_glb(bytes: &[u8]) -> std::result::Result<TriangleMesh, IoError> {
    let document = gltf::Gltf::from_slice(bytes)
        .map_err(|e| IoError::parse(format!("failed to read GLB: {e}")))?;
    let blob = document.blob.as_deref();

    let mut vertices: Vec<Point3f> = Vec::new();
    let mut faces = Vec::new();
    let mut normals: Option<Vec<Vector3f>> = Some(Vec::new());
    let mut uvs: Option<Vec<[f32; 2]>> = Some(Vec::new());
    let mut colors: Option<Vec<Rgb>> = Some(Vec::new());

    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                tracing::warn!(
                    mesh = mesh.index(),
                    mode = ?primitive.mode(),
                    "skipping non-triangle primitive"
                );
                continue;
            }
            let reader = primitive.reader(move |buffer| match buffer.source() {
                Source::Bin => blob,
                Source::Uri(_) => None,
            });

            let base = vertices.len();
            let positions = reader
                .read_positions()
                .ok_or_else(|| IoError::invalid("primitive has no readable POSITION data"))?;
            vertices.extend(positions.map(|[x, y, z]| Point3f::new(x, y, z)));
            let count = vertices.len() - base;

            normals = normals.zip(reader.read_normals()).map(|(mut all, read)| {
                all.extend(read.map(|[x, y, z]| Vector3f::new(x, y, z)));
                all
            });
            uvs = uvs.zip(reader.read_tex_coords(0)).map(|(mut all, read)| {
                all.extend(read.into_f32());
                all
            });
            colors = colors.zip(reader.read_colors(0)).map(|(mut all, read)| {
                all.extend(read.into_rgb_u8());
                all
            });

            let indices: Vec<usize> = match reader.read_indices() {
                Some(read) => read.into_u32().map(|i| base + i as usize).collect(),
                None => (base..base + count).collect(),
            };
            if indices.len() % 3 != 0 {
                return Err(IoError::invalid(format!(
                    "triangle primitive has {} indices, not a multiple of 3",
                    indices.len()
                )));
            }
            for corners in indices.chunks_exact(3) {
                push_polygon(corners, vertices.len(), &mut faces)?;
            }
        }
    }

    // Attribute streams shorter than POSITION are dropped like missing ones
    let full = |len: usize| len == vertices.len() && len > 0;
    let normals = normals.filter(|n| full(n.len()));
    let uvs = uvs.filter(|u| full(u.len()));
    let colors = colors.filter(|c| full(c.len()));

    let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
    if let Some(normals) = normals {
        mesh.set_normals(normals);
    }
    if let Some(uvs) = uvs {
        mesh.set_uvs(uvs);
    }
    if let Some(colors) = colors {
        mesh.set_colors(colors);
    }
    Ok(mesh)
}

impl MeshWriter for GlbWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let bytes = build_glb(mesh)?;
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }
}

/// Binary payload plus the buffer views and accessors that describe it
#[derive(Default)]
struct BinBuilder {
    binary: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl BinBuilder {
    fn view(&mut self, bytes: Vec<u8>, target: u32) -> usize {
        while self.binary.len() % 4 != 0 {
            self.binary.push(0);
        }
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": self.binary.len(),
            "byteLength": bytes.len(),
            "target": target,
        }));
        self.binary.extend(bytes);
        self.views.len() - 1
    }

    fn accessor(&mut self, mut accessor: Value, view: usize) -> usize {
        accessor["bufferView"] = json!(view);
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    /// Float vertex attribute with `N` components per vertex.
    fn floats<const N: usize>(&mut self, values: impl Iterator<Item = [f32; N]>, kind: &str) -> usize {
        let mut bytes = Vec::new();
        let mut count = 0usize;
        for value in values {
            bytes.extend(value.iter().flat_map(|c| c.to_le_bytes()));
            count += 1;
        }
        let view = self.view(bytes, ARRAY_BUFFER);
        self.accessor(
            json!({ "componentType": FLOAT, "count": count, "type": kind }),
            view,
        )
    }
}

fn build_glb(mesh: &TriangleMesh) -> std::result::Result<Vec<u8>, IoError> {
    let mut document = json!({
        "asset": { "version": "2.0", "generator": "meshreduce" },
        "scene": 0,
    });
    let mut bin = BinBuilder::default();

    if mesh.faces.is_empty() {
        document["scenes"] = json!([{ "nodes": [] }]);
    } else {
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for vertex in &mesh.vertices {
            for (axis, value) in [vertex.x, vertex.y, vertex.z].into_iter().enumerate() {
                min[axis] = min[axis].min(value);
                max[axis] = max[axis].max(value);
            }
        }
        let position = bin.floats(mesh.vertices.iter().map(|v| [v.x, v.y, v.z]), "VEC3");
        bin.accessors[position]["min"] = json!(min);
        bin.accessors[position]["max"] = json!(max);

        let mut attributes = json!({ "POSITION": position });
        if let Some(normals) = &mesh.normals {
            attributes["NORMAL"] = json!(bin.floats(normals.iter().map(|n| [n.x, n.y, n.z]), "VEC3"));
        }
        if let Some(uvs) = &mesh.uvs {
            attributes["TEXCOORD_0"] = json!(bin.floats(uvs.iter().copied(), "VEC2"));
        }
        if let Some(colors) = &mesh.colors {
            let unit = |c: u8| f32::from(c) / 255.0;
            let colors = colors.iter().map(|&[r, g, b]| [unit(r), unit(g), unit(b)]);
            attributes["COLOR_0"] = json!(bin.floats(colors, "VEC3"));
        }

        let indices = mesh
            .faces
            .iter()
            .flatten()
            .map(|&i| {
                u32::try_from(i)
                    .map_err(|_| IoError::invalid(format!("vertex index {i} does not fit a GLB index")))
            })
            .collect::<std::result::Result<Vec<u32>, _>>()?;
        let largest = indices.iter().copied().max().unwrap_or(0);
        let (bytes, component_type): (Vec<u8>, u32) = match u16::try_from(largest) {
            Ok(_) => (
                indices.iter().flat_map(|&i| (i as u16).to_le_bytes()).collect(),
                UNSIGNED_SHORT,
            ),
            Err(_) => (indices.iter().flat_map(|&i| i.to_le_bytes()).collect(), UNSIGNED_INT),
        };
        let view = bin.view(bytes, ELEMENT_ARRAY_BUFFER);
        let index_accessor = bin.accessor(
            json!({ "componentType": component_type, "count": indices.len(), "type": "SCALAR" }),
            view,
        );

        while bin.binary.len() % 4 != 0 {
            bin.binary.push(0);
        }
        document["buffers"] = json!([{ "byteLength": bin.binary.len() }]);
        document["bufferViews"] = Value::Array(std::mem::take(&mut bin.views));
        document["accessors"] = Value::Array(std::mem::take(&mut bin.accessors));
        document["meshes"] = json!([{
            "primitives": [{ "attributes": attributes, "indices": index_accessor, "mode": 4 }]
        }]);
        document["nodes"] = json!([{ "mesh": 0 }]);
        document["scenes"] = json!([{ "nodes": [0] }]);
    }

    let mut json_chunk = serde_json::to_vec(&document)
        .map_err(|e| IoError::invalid(format!("failed to encode glTF JSON: {e}")))?;
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }

    let mut total = 12 + 8 + json_chunk.len();
    if !bin.binary.is_empty() {
        total += 8 + bin.binary.len();
    }
    let length = |n: usize| {
        u32::try_from(n).map_err(|_| IoError::invalid("mesh is too large for a GLB container"))
    };

    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(GLB_MAGIC);
    glb.extend_from_slice(&GLB_VERSION.to_le_bytes());
    glb.extend_from_slice(&length(total)?.to_le_bytes());
    glb.extend_from_slice(&length(json_chunk.len())?.to_le_bytes());
    glb.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    glb.extend_from_slice(&json_chunk);
    if !bin.binary.is_empty() {
        glb.extend_from_slice(&length(bin.binary.len())?.to_le_bytes());
        glb.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        glb.extend_from_slice(&bin.binary);
    }
    Ok(glb)
}
