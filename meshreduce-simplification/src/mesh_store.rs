//! Mutable indexed triangle store
//!
//! Vertices and triangles live in arena vectors and are tombstoned rather than
//! removed, so indices stay stable for the whole reduction. Each vertex keeps
//! the list of live triangles that reference it; collapses update these lists
//! eagerly. Dense output is produced only by [`MeshStore::compact`].

use std::collections::{BTreeSet, HashSet};

use itertools::Itertools;
use meshreduce_core::{Point3d, Vector3d, Vector3f};

use crate::adapter::MeshBuffer;
use crate::error::{CollapseError, ImportError};

/// A vertex slot
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub position: Point3d,
    /// Bumped every time the vertex or its neighbourhood changes
    pub generation: u32,
    pub live: bool,
    /// Touches an edge used by exactly one live triangle
    pub boundary: bool,
}

/// A triangle slot with cached plane and area
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub vertices: [usize; 3],
    pub live: bool,
    /// Unit normal, zero when the triangle has no area
    pub normal: Vector3d,
    /// Plane offset: `normal . p + distance = 0`
    pub distance: f64,
    pub area: f64,
}

impl Triangle {
    fn new(vertices: [usize; 3], positions: [&Point3d; 3]) -> Self {
        let mut triangle = Self {
            vertices,
            live: true,
            normal: Vector3d::zeros(),
            distance: 0.0,
            area: 0.0,
        };
        triangle.set_geometry(positions);
        triangle
    }

    fn set_geometry(&mut self, [p0, p1, p2]: [&Point3d; 3]) {
        let (normal, area) = plane_of(p0, p1, p2);
        self.normal = normal;
        self.area = area;
        self.distance = -normal.dot(&p0.coords);
    }

    pub fn contains(&self, v: usize) -> bool {
        self.vertices.contains(&v)
    }

    /// The vertex that is neither `a` nor `b`.
    pub fn apex(&self, a: usize, b: usize) -> Option<usize> {
        self.vertices.iter().copied().find(|&v| v != a && v != b)
    }
}

/// Unit normal and area of a triangle.
pub fn plane_of(p0: &Point3d, p1: &Point3d, p2: &Point3d) -> (Vector3d, f64) {
    let n = (p1 - p0).cross(&(p2 - p0));
    let len = n.norm();
    if len > 0.0 && len.is_finite() {
        (n / len, 0.5 * len)
    } else {
        (Vector3d::zeros(), 0.0)
    }
}

/// Shape quality of a triangle, 1 for equilateral and 0 for degenerate.
pub fn triangle_quality(p0: &Point3d, p1: &Point3d, p2: &Point3d) -> f64 {
    let (_, area) = plane_of(p0, p1, p2);
    let edge_sq = (p1 - p0).norm_squared() + (p2 - p1).norm_squared() + (p0 - p2).norm_squared();
    if edge_sq > 0.0 {
        4.0 * 3f64.sqrt() * area / edge_sq
    } else {
        0.0
    }
}

/// Geometric limits enforced by [`MeshStore::collapse_edge`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseGuard {
    /// Minimum cosine between a surviving triangle's old and new normal
    pub min_normal_cos: f64,
    /// Enforce the link condition and reject duplicate faces
    pub preserve_topology: bool,
    /// Surviving triangles must keep more area than this
    pub area_epsilon: f64,
}

impl Default for CollapseGuard {
    fn default() -> Self {
        Self {
            min_normal_cos: 85f64.to_radians().cos(),
            preserve_topology: true,
            area_epsilon: 1e-12,
        }
    }
}

/// Outcome of a successful collapse
#[derive(Debug, Clone, PartialEq)]
pub struct CollapseSummary {
    pub kept: usize,
    pub removed: usize,
    /// Triangles tombstoned by the collapse
    pub triangles_removed: usize,
    /// One-ring of the kept vertex after the collapse
    pub ring: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
struct Attributes {
    normals: Option<Vec<[f32; 3]>>,
    uvs: Option<Vec<[f32; 2]>>,
    colors: Option<Vec<[u8; 3]>>,
}

/// Indexed triangle soup with vertex to triangle incidence
#[derive(Debug, Clone)]
pub struct MeshStore {
    vertices: Vec<Vertex>,
    triangles: Vec<Triangle>,
    incidence: Vec<Vec<usize>>,
    attributes: Attributes,
    live_vertices: usize,
    live_triangles: usize,
    guard: CollapseGuard,
}

impl MeshStore {
    /// Build a store from a validated buffer.
    pub fn import(buffer: &MeshBuffer) -> Result<Self, ImportError> {
        buffer.validate()?;

        let vertices: Vec<Vertex> = buffer
            .positions
            .iter()
            .map(|p| Vertex {
                position: Point3d::new(p[0].into(), p[1].into(), p[2].into()),
                generation: 0,
                live: true,
                boundary: false,
            })
            .collect();

        let mut incidence = vec![Vec::new(); vertices.len()];
        let mut triangles = Vec::with_capacity(buffer.triangle_count());
        for (t, tri) in buffer.triangles().enumerate() {
            let ids = tri.map(|i| i as usize);
            for v in ids.iter().copied().unique() {
                incidence[v].push(t);
            }
            triangles.push(Triangle::new(
                ids,
                ids.map(|v| &vertices[v].position),
            ));
        }

        let mut store = Self {
            live_vertices: vertices.len(),
            live_triangles: triangles.len(),
            vertices,
            triangles,
            incidence,
            attributes: Attributes {
                normals: buffer.normals.clone(),
                uvs: buffer.uvs.clone(),
                colors: buffer.colors.clone(),
            },
            guard: CollapseGuard::default(),
        };
        store.refresh_all_boundary_flags();
        Ok(store)
    }

    pub fn with_guard(mut self, guard: CollapseGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn guard(&self) -> &CollapseGuard {
        &self.guard
    }

    // ------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------

    pub fn vertex(&self, v: usize) -> &Vertex {
        &self.vertices[v]
    }

    pub fn triangle(&self, t: usize) -> &Triangle {
        &self.triangles[t]
    }

    pub fn position(&self, v: usize) -> Point3d {
        self.vertices[v].position
    }

    pub fn generation(&self, v: usize) -> u32 {
        self.vertices[v].generation
    }

    pub fn is_live_vertex(&self, v: usize) -> bool {
        self.vertices.get(v).is_some_and(|vertex| vertex.live)
    }

    /// Number of vertex slots, live or not
    pub fn vertex_slots(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangle slots, live or not
    pub fn triangle_slots(&self) -> usize {
        self.triangles.len()
    }

    pub fn live_vertex_count(&self) -> usize {
        self.live_vertices
    }

    pub fn live_triangle_count(&self) -> usize {
        self.live_triangles
    }

    pub fn live_triangles(&self) -> impl Iterator<Item = usize> + '_ {
        self.triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.live)
            .map(|(i, _)| i)
    }

    /// Live triangles incident to `v`.
    pub fn neighbors(&self, v: usize) -> &[usize] {
        &self.incidence[v]
    }

    /// Live vertices sharing a triangle with `v`, sorted.
    pub fn vertex_neighbors(&self, v: usize) -> Vec<usize> {
        self.incidence[v]
            .iter()
            .flat_map(|&t| self.triangles[t].vertices)
            .filter(|&u| u != v)
            .sorted_unstable()
            .dedup()
            .collect()
    }

    /// Live triangles containing both `a` and `b`.
    pub fn edge_triangles(&self, a: usize, b: usize) -> Vec<usize> {
        self.incidence[a]
            .iter()
            .copied()
            .filter(|&t| self.triangles[t].contains(b))
            .collect()
    }

    pub fn is_boundary_edge(&self, a: usize, b: usize) -> bool {
        self.edge_triangles(a, b).len() == 1
    }

    pub fn is_boundary_vertex(&self, v: usize) -> bool {
        self.vertices[v].boundary
    }

    /// Edges `(min, max)` incident to `v`, sorted.
    pub fn incident_edges(&self, v: usize) -> Vec<(usize, usize)> {
        self.vertex_neighbors(v)
            .into_iter()
            .map(|u| (v.min(u), v.max(u)))
            .collect()
    }

    /// Every live edge `(min, max)`, sorted.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.live_triangles()
            .flat_map(|t| {
                let [a, b, c] = self.triangles[t].vertices;
                [(a, b), (b, c), (c, a)]
            })
            .filter(|(a, b)| a != b)
            .map(|(a, b)| (a.min(b), a.max(b)))
            .sorted_unstable()
            .dedup()
            .collect()
    }

    /// Texture coordinate of `v`, if the mesh carries them.
    pub fn uv(&self, v: usize) -> Option<[f32; 2]> {
        self.attributes.uvs.as_ref().map(|uvs| uvs[v])
    }

    /// Projection of `target` onto the edge from `keep` (0) to `remove` (1),
    /// clamped to the edge. Attributes are blended with this parameter.
    pub fn edge_parameter(&self, keep: usize, remove: usize, target: &Point3d) -> f64 {
        let pk = self.vertices[keep].position;
        let edge = self.vertices[remove].position - pk;
        let len_sq = edge.norm_squared();
        if len_sq > 0.0 {
            ((target - pk).dot(&edge) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Worst quality of the triangles around `a` and `b` that survive a
    /// collapse of the edge to `target`; 1 when none survive.
    pub fn min_quality_after(&self, a: usize, b: usize, target: &Point3d) -> f64 {
        self.surviving_triangles(a, b)
            .map(|t| {
                let [p0, p1, p2] = self.moved_positions(t, a, b, target);
                triangle_quality(&p0, &p1, &p2)
            })
            .fold(1.0, f64::min)
    }

    fn surviving_triangles(&self, a: usize, b: usize) -> impl Iterator<Item = usize> + '_ {
        self.incidence[a]
            .iter()
            .chain(&self.incidence[b])
            .copied()
            .filter(move |&t| !(self.triangles[t].contains(a) && self.triangles[t].contains(b)))
    }

    fn moved_positions(&self, t: usize, a: usize, b: usize, target: &Point3d) -> [Point3d; 3] {
        self.triangles[t].vertices.map(|v| {
            if v == a || v == b {
                *target
            } else {
                self.vertices[v].position
            }
        })
    }

    // ------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------

    /// Merge `remove` into `keep` and move `keep` to `target`.
    ///
    /// On error the store is left unchanged.
    pub fn collapse_edge(
        &mut self,
        keep: usize,
        remove: usize,
        target: Point3d,
    ) -> Result<CollapseSummary, CollapseError> {
        if !self.is_live_vertex(keep) || !self.is_live_vertex(remove) {
            return Err(CollapseError::DeadVertex);
        }
        if keep == remove {
            return Err(CollapseError::NotAnEdge);
        }
        let edge_tris = self.edge_triangles(keep, remove);
        if edge_tris.is_empty() {
            return Err(CollapseError::NotAnEdge);
        }

        if self.guard.preserve_topology {
            self.check_topology(keep, remove, &edge_tris)?;
        }
        self.check_geometry(keep, remove, &target)?;

        let coincident = self.coincident_after_merge(keep, remove, &edge_tris);
        let triangles_removed = edge_tris.len() + coincident.len();
        for &t in &edge_tris {
            self.kill_triangle(t);
        }

        let moved = std::mem::take(&mut self.incidence[remove]);
        for &t in &moved {
            for v in self.triangles[t].vertices.iter_mut() {
                if *v == remove {
                    *v = keep;
                }
            }
            self.incidence[keep].push(t);
        }

        for t in coincident {
            self.kill_triangle(t);
        }

        self.interpolate_attributes(keep, remove, &target);
        self.vertices[keep].position = target;
        self.vertices[remove].live = false;
        self.live_vertices -= 1;

        for i in 0..self.incidence[keep].len() {
            let t = self.incidence[keep][i];
            self.refresh_triangle(t);
        }

        let ring = self.vertex_neighbors(keep);
        for v in [keep, remove].into_iter().chain(ring.iter().copied()) {
            let vertex = &mut self.vertices[v];
            vertex.generation = vertex.generation.wrapping_add(1);
        }
        self.refresh_boundary_flags(std::iter::once(keep).chain(ring.iter().copied()));
        self.vertices[remove].boundary = false;

        Ok(CollapseSummary {
            kept: keep,
            removed: remove,
            triangles_removed,
            ring,
        })
    }

    /// Live triangles a collapse of `remove` into `keep` would tombstone:
    /// those on the edge plus any that would coincide afterwards.
    pub fn removal_count(&self, keep: usize, remove: usize) -> usize {
        let edge_tris = self.edge_triangles(keep, remove);
        edge_tris.len() + self.coincident_after_merge(keep, remove, &edge_tris).len()
    }

    /// Off-edge triangles whose vertex set repeats an earlier one once
    /// `remove` is renamed to `keep`.
    fn coincident_after_merge(&self, keep: usize, remove: usize, edge_tris: &[usize]) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.incidence[keep]
            .iter()
            .chain(&self.incidence[remove])
            .copied()
            .filter(|t| !edge_tris.contains(t))
            .filter(|&t| {
                let merged = self.triangles[t]
                    .vertices
                    .map(|v| if v == remove { keep } else { v });
                !seen.insert(face_key(merged))
            })
            .collect()
    }

    fn check_topology(&self, keep: usize, remove: usize, edge_tris: &[usize]) -> Result<(), CollapseError> {
        if edge_tris.len() > 2 {
            return Err(CollapseError::NonManifold);
        }

        let apexes: BTreeSet<usize> = edge_tris
            .iter()
            .filter_map(|&t| self.triangles[t].apex(keep, remove))
            .collect();
        let keep_ring: BTreeSet<usize> = self.vertex_neighbors(keep).into_iter().collect();
        let common: BTreeSet<usize> = self
            .vertex_neighbors(remove)
            .into_iter()
            .filter(|v| keep_ring.contains(v))
            .collect();
        if common != apexes {
            return Err(CollapseError::NonManifold);
        }

        // Faces that would coincide after the merge
        let keep_faces: HashSet<[usize; 3]> = self.incidence[keep]
            .iter()
            .filter(|t| !edge_tris.contains(t))
            .map(|&t| face_key(self.triangles[t].vertices))
            .collect();
        let creates_duplicate = self.incidence[remove]
            .iter()
            .filter(|t| !edge_tris.contains(t))
            .any(|&t| {
                let merged = self.triangles[t]
                    .vertices
                    .map(|v| if v == remove { keep } else { v });
                keep_faces.contains(&face_key(merged))
            });
        if creates_duplicate {
            return Err(CollapseError::NonManifold);
        }

        Ok(())
    }

    fn check_geometry(&self, keep: usize, remove: usize, target: &Point3d) -> Result<(), CollapseError> {
        for t in self.surviving_triangles(keep, remove) {
            let [p0, p1, p2] = self.moved_positions(t, keep, remove, target);
            let (normal, area) = plane_of(&p0, &p1, &p2);
            if area <= self.guard.area_epsilon {
                return Err(CollapseError::QualityViolation);
            }
            let old = &self.triangles[t].normal;
            if old.norm_squared() > 0.0 && old.dot(&normal) < self.guard.min_normal_cos {
                return Err(CollapseError::QualityViolation);
            }
        }
        Ok(())
    }

    /// Tombstone live triangles with a repeated index or area at most
    /// `area_epsilon`. Returns how many were removed.
    pub fn tombstone_degenerate_triangles(&mut self, area_epsilon: f64) -> usize {
        let degenerate: Vec<usize> = self
            .live_triangles()
            .filter(|&t| {
                let tri = &self.triangles[t];
                let [a, b, c] = tri.vertices;
                a == b || b == c || c == a || tri.area <= area_epsilon
            })
            .collect();
        for &t in &degenerate {
            self.kill_triangle(t);
        }
        if !degenerate.is_empty() {
            self.refresh_all_boundary_flags();
        }
        degenerate.len()
    }

    fn kill_triangle(&mut self, t: usize) {
        if !self.triangles[t].live {
            return;
        }
        self.triangles[t].live = false;
        self.live_triangles -= 1;
        for v in self.triangles[t].vertices {
            self.incidence[v].retain(|&x| x != t);
        }
    }

    fn refresh_triangle(&mut self, t: usize) {
        let vertices = self.triangles[t].vertices;
        let positions = vertices.map(|v| &self.vertices[v].position);
        self.triangles[t].set_geometry(positions);
    }

    fn refresh_boundary_flags(&mut self, vertices: impl Iterator<Item = usize>) {
        for v in vertices {
            let boundary = self
                .vertex_neighbors(v)
                .into_iter()
                .any(|u| self.is_boundary_edge(v, u));
            self.vertices[v].boundary = boundary;
        }
    }

    fn refresh_all_boundary_flags(&mut self) {
        self.refresh_boundary_flags(0..self.vertices.len());
    }

    fn interpolate_attributes(&mut self, keep: usize, remove: usize, target: &Point3d) {
        let t = self.edge_parameter(keep, remove, target) as f32;
        let lerp = |a: f32, b: f32| a + (b - a) * t;

        if let Some(normals) = self.attributes.normals.as_mut() {
            let (a, b) = (normals[keep], normals[remove]);
            let blended = Vector3f::new(lerp(a[0], b[0]), lerp(a[1], b[1]), lerp(a[2], b[2]));
            if let Some(n) = blended.try_normalize(f32::EPSILON) {
                normals[keep] = [n.x, n.y, n.z];
            }
        }
        if let Some(uvs) = self.attributes.uvs.as_mut() {
            let (a, b) = (uvs[keep], uvs[remove]);
            uvs[keep] = [lerp(a[0], b[0]), lerp(a[1], b[1])];
        }
        if let Some(colors) = self.attributes.colors.as_mut() {
            let (a, b) = (colors[keep], colors[remove]);
            colors[keep] = std::array::from_fn(|i| {
                lerp(f32::from(a[i]), f32::from(b[i])).round().clamp(0.0, 255.0) as u8
            });
        }
    }

    // ------------------------------------------------------------
    // Export
    // ------------------------------------------------------------

    /// Dense copy of the live mesh plus the old to new vertex remap.
    ///
    /// Vertices no live triangle references are dropped.
    pub fn compact(&self) -> (MeshBuffer, Vec<Option<u32>>) {
        let mut remap = vec![None; self.vertices.len()];
        let mut order = Vec::with_capacity(self.live_vertices);
        for (v, vertex) in self.vertices.iter().enumerate() {
            if vertex.live && !self.incidence[v].is_empty() {
                remap[v] = Some(order.len() as u32);
                order.push(v);
            }
        }

        let mut indices = Vec::with_capacity(self.live_triangles * 3);
        for t in self.live_triangles() {
            for v in self.triangles[t].vertices {
                indices.extend(remap[v]);
            }
        }

        let positions = order
            .iter()
            .map(|&v| {
                let p = self.vertices[v].position;
                [p.x as f32, p.y as f32, p.z as f32]
            })
            .collect();
        let buffer = MeshBuffer {
            positions,
            normals: select(&self.attributes.normals, &order),
            uvs: select(&self.attributes.uvs, &order),
            colors: select(&self.attributes.colors, &order),
            indices,
        };
        (buffer, remap)
    }
}

fn select<T: Copy>(values: &Option<Vec<T>>, order: &[usize]) -> Option<Vec<T>> {
    values
        .as_ref()
        .map(|values| order.iter().map(|&v| values[v]).collect())
}

/// Vertex set of a face, independent of winding.
fn face_key(mut vertices: [usize; 3]) -> [usize; 3] {
    vertices.sort_unstable();
    vertices
}
