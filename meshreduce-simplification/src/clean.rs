//! Input mesh cleaning
//!
//! Welds exactly coincident vertices and drops faces that would only get in
//! the way of reduction: repeated indices, zero area and repeated vertex sets.

use std::collections::{HashMap, HashSet};
use std::fmt;

use meshreduce_core::Point3d;

use crate::adapter::MeshBuffer;
use crate::error::ImportError;
use crate::mesh_store::plane_of;

/// What [`clean_buffer`] removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub duplicate_vertices: usize,
    pub degenerate_faces: usize,
    pub zero_area_faces: usize,
    pub duplicate_faces: usize,
    pub unreferenced_vertices: usize,
}

impl CleanReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "welded {} vertices, removed {} degenerate, {} zero-area and {} duplicate faces, {} unreferenced vertices",
            self.duplicate_vertices,
            self.degenerate_faces,
            self.zero_area_faces,
            self.duplicate_faces,
            self.unreferenced_vertices
        )
    }
}

/// Bit pattern identifying a vertex and its attributes; `-0.0` folds to `0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WeldKey(Vec<u32>);

impl WeldKey {
    fn of(buffer: &MeshBuffer, v: usize) -> Self {
        let mut bits: Vec<u32> = buffer.positions[v].iter().map(|c| (c + 0.0).to_bits()).collect();
        if let Some(normals) = &buffer.normals {
            bits.extend(normals[v].iter().map(|c| (c + 0.0).to_bits()));
        }
        if let Some(uvs) = &buffer.uvs {
            bits.extend(uvs[v].iter().map(|c| (c + 0.0).to_bits()));
        }
        if let Some(colors) = &buffer.colors {
            bits.extend(colors[v].iter().map(|&c| u32::from(c)));
        }
        Self(bits)
    }
}

/// Clean a buffer ahead of import.
///
/// Vertices are only welded when their positions and all attributes match
/// exactly, so attribute seams survive.
pub fn clean_buffer(buffer: &MeshBuffer, area_epsilon: f64) -> Result<(MeshBuffer, CleanReport), ImportError> {
    buffer.validate()?;
    let mut report = CleanReport::default();

    // Weld
    let mut welded: HashMap<WeldKey, u32> = HashMap::new();
    let mut first_of = Vec::new();
    let weld: Vec<u32> = (0..buffer.vertex_count())
        .map(|v| {
            *welded.entry(WeldKey::of(buffer, v)).or_insert_with(|| {
                first_of.push(v);
                (first_of.len() - 1) as u32
            })
        })
        .collect();
    report.duplicate_vertices = buffer.vertex_count() - first_of.len();

    // Faces
    let position = |i: u32| {
        let p = buffer.positions[first_of[i as usize]];
        Point3d::new(p[0].into(), p[1].into(), p[2].into())
    };
    let mut seen = HashSet::new();
    let mut faces = Vec::with_capacity(buffer.triangle_count());
    for tri in buffer.triangles() {
        let [a, b, c] = tri.map(|i| weld[i as usize]);
        if a == b || b == c || c == a {
            report.degenerate_faces += 1;
            continue;
        }
        let (_, area) = plane_of(&position(a), &position(b), &position(c));
        if area <= area_epsilon {
            report.zero_area_faces += 1;
            continue;
        }
        let mut key = [a, b, c];
        key.sort_unstable();
        if !seen.insert(key) {
            report.duplicate_faces += 1;
            continue;
        }
        faces.push([a, b, c]);
    }

    // Drop unreferenced
    let mut remap: Vec<Option<u32>> = vec![None; first_of.len()];
    let mut order = Vec::with_capacity(first_of.len());
    for &v in faces.iter().flatten() {
        if remap[v as usize].is_none() {
            remap[v as usize] = Some(order.len() as u32);
            order.push(first_of[v as usize]);
        }
    }
    report.unreferenced_vertices = first_of.len() - order.len();

    let indices = faces
        .iter()
        .flatten()
        .filter_map(|&v| remap[v as usize])
        .collect();
    let cleaned = MeshBuffer {
        positions: order.iter().map(|&v| buffer.positions[v]).collect(),
        normals: buffer
            .normals
            .as_ref()
            .map(|ns| order.iter().map(|&v| ns[v]).collect()),
        uvs: buffer
            .uvs
            .as_ref()
            .map(|uvs| order.iter().map(|&v| uvs[v]).collect()),
        colors: buffer
            .colors
            .as_ref()
            .map(|cs| order.iter().map(|&v| cs[v]).collect()),
        indices,
    };

    Ok((cleaned, report))
}
