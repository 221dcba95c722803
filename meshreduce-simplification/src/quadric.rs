//! Quadric error metrics
//!
//! Each vertex carries the sum of the squared-distance quadrics of the planes
//! of its incident triangles. The cost of collapsing an edge is the combined
//! quadric evaluated at the merged position.

use std::ops::{Add, AddAssign};

use meshreduce_core::{Matrix3, Point3d, Vector3, Vector3d};

use crate::error::NumericDegeneracy;
use crate::mesh_store::MeshStore;

/// Symmetric 4x4 error quadric stored as its upper triangle.
///
/// Coefficient order: `aa ab ac ad bb bc bd cc cd dd` for the plane
/// `ax + by + cz + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quadric {
    coefficients: [f64; 10],
}

impl Quadric {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Squared distance to the plane `normal . p + distance = 0`.
    pub fn from_plane(normal: &Vector3d, distance: f64) -> Self {
        let (a, b, c, d) = (normal.x, normal.y, normal.z, distance);
        Self {
            coefficients: [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ],
        }
    }

    pub fn scaled(mut self, weight: f64) -> Self {
        for c in self.coefficients.iter_mut() {
            *c *= weight;
        }
        self
    }

    pub fn coefficients(&self) -> &[f64; 10] {
        &self.coefficients
    }

    /// `vᵀ Q v` for `v = (p, 1)`.
    pub fn evaluate(&self, p: &Point3d) -> f64 {
        let [aa, ab, ac, ad, bb, bc, bd, cc, cd, dd] = self.coefficients;
        let (x, y, z) = (p.x, p.y, p.z);
        aa * x * x
            + 2.0 * ab * x * y
            + 2.0 * ac * x * z
            + 2.0 * ad * x
            + bb * y * y
            + 2.0 * bc * y * z
            + 2.0 * bd * y
            + cc * z * z
            + 2.0 * cd * z
            + dd
    }

    /// Position minimizing the quadric.
    ///
    /// `tolerance` is relative: the determinant of the 3x3 block is compared
    /// against the cube of its largest diagonal entry.
    pub fn minimizer(&self, tolerance: f64) -> Result<Point3d, NumericDegeneracy> {
        let [aa, ab, ac, ad, bb, bc, bd, cc, cd, _] = self.coefficients;
        let a = Matrix3::new(aa, ab, ac, ab, bb, bc, ac, bc, cc);

        let scale = aa.abs().max(bb.abs()).max(cc.abs());
        if scale <= 0.0 || !scale.is_finite() {
            return Err(NumericDegeneracy);
        }
        if (a.determinant() / (scale * scale * scale)).abs() < tolerance {
            return Err(NumericDegeneracy);
        }

        let rhs = Vector3::new(-ad, -bd, -cd);
        let solution = a.lu().solve(&rhs).ok_or(NumericDegeneracy)?;
        if solution.iter().all(|c| c.is_finite()) {
            Ok(Point3d::from(solution))
        } else {
            Err(NumericDegeneracy)
        }
    }
}

impl Add for Quadric {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Self) {
        for (c, r) in self.coefficients.iter_mut().zip(rhs.coefficients) {
            *c += r;
        }
    }
}

/// Knobs of the cost function
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadricSettings {
    pub area_weighting: bool,
    /// Weight of boundary constraint planes; `None` adds none
    pub boundary_weight: Option<f64>,
    pub singular_tolerance: f64,
    /// Worst post-collapse triangle quality below which cost is scaled up; 0 disables
    pub quality_threshold: f64,
    /// Smallest quality the penalty divides by
    pub quality_floor: f64,
    pub optimal_placement: bool,
    /// Weight of the uv stretch term; 0 disables it
    pub texture_weight: f64,
}

impl Default for QuadricSettings {
    fn default() -> Self {
        Self {
            area_weighting: true,
            boundary_weight: None,
            singular_tolerance: 1e-10,
            quality_threshold: 0.3,
            quality_floor: 1e-6,
            optimal_placement: true,
            texture_weight: 1.0,
        }
    }
}

/// How the merged position was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Optimal,
    Midpoint,
    EndpointA,
    EndpointB,
}

/// Cost of collapsing one edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCost {
    /// Priority used for ordering, including the quality penalty
    pub cost: f64,
    /// Raw quadric error at `position`
    pub error: f64,
    pub position: Point3d,
    pub placement: Placement,
}

impl EdgeCost {
    /// Whether the optimal solve was attempted and failed.
    pub fn is_fallback(&self, settings: &QuadricSettings) -> bool {
        settings.optimal_placement && self.placement != Placement::Optimal
    }
}

/// Evaluate a combined quadric for the edge `a`-`b`.
pub fn cost_of(quadric: &Quadric, a: &Point3d, b: &Point3d, settings: &QuadricSettings) -> EdgeCost {
    let optimal = if settings.optimal_placement {
        quadric.minimizer(settings.singular_tolerance).ok()
    } else {
        None
    };

    let (position, placement) = match optimal {
        Some(p) => (p, Placement::Optimal),
        None => [
            (nalgebra::center(a, b), Placement::Midpoint),
            (*a, Placement::EndpointA),
            (*b, Placement::EndpointB),
        ]
        .into_iter()
        .min_by(|x, y| quadric.evaluate(&x.0).total_cmp(&quadric.evaluate(&y.0)))
        .unwrap_or((*a, Placement::EndpointA)),
    };

    let error = quadric.evaluate(&position).max(0.0);
    EdgeCost {
        cost: error,
        error,
        position,
        placement,
    }
}

/// Quadric of a live triangle's plane.
pub fn quadric_from_triangle(store: &MeshStore, t: usize, area_weighting: bool) -> Quadric {
    let triangle = store.triangle(t);
    if triangle.area <= 0.0 {
        return Quadric::zero();
    }
    let q = Quadric::from_plane(&triangle.normal, triangle.distance);
    if area_weighting {
        q.scaled(triangle.area)
    } else {
        q
    }
}

/// Constraint plane through a boundary edge, perpendicular to its only face.
fn boundary_quadric(store: &MeshStore, a: usize, b: usize, weight: f64, area_weighting: bool) -> Quadric {
    let Some(&t) = store.edge_triangles(a, b).first() else {
        return Quadric::zero();
    };
    let pa = store.position(a);
    let edge = store.position(b) - pa;
    let Some(normal) = edge.cross(&store.triangle(t).normal).try_normalize(f64::EPSILON) else {
        return Quadric::zero();
    };

    let weight = if area_weighting {
        weight * edge.norm_squared()
    } else {
        weight
    };
    Quadric::from_plane(&normal, -normal.dot(&pa.coords)).scaled(weight)
}

/// Squared uv displacement of both endpoints when `a`-`b` collapses to
/// `target`, with uvs blended as the store blends them. Weighted by the area
/// of the edge's triangles when `area_weighting` is set; zero without uvs.
pub fn texture_stretch(store: &MeshStore, a: usize, b: usize, target: &Point3d, area_weighting: bool) -> f64 {
    let (Some(ua), Some(ub)) = (store.uv(a), store.uv(b)) else {
        return 0.0;
    };
    let du = f64::from(ub[0] - ua[0]);
    let dv = f64::from(ub[1] - ua[1]);
    let s = store.edge_parameter(a, b, target);
    // a moves by s, b by 1 - s along the uv edge
    let stretch = (s * s + (1.0 - s) * (1.0 - s)) * (du * du + dv * dv);

    if area_weighting {
        let area: f64 = store
            .edge_triangles(a, b)
            .iter()
            .map(|&t| store.triangle(t).area)
            .sum();
        stretch * area
    } else {
        stretch
    }
}

/// Sum of the quadrics of `v`'s live triangles, plus boundary constraints.
pub fn quadric_for_vertex(store: &MeshStore, v: usize, settings: &QuadricSettings) -> Quadric {
    let mut q = store
        .neighbors(v)
        .iter()
        .map(|&t| quadric_from_triangle(store, t, settings.area_weighting))
        .fold(Quadric::zero(), Add::add);

    if let Some(weight) = settings.boundary_weight.filter(|w| *w > 0.0) {
        if store.is_boundary_vertex(v) {
            for u in store.vertex_neighbors(v) {
                if store.is_boundary_edge(v, u) {
                    q += boundary_quadric(store, v, u, weight, settings.area_weighting);
                }
            }
        }
    }
    q
}

/// Per-vertex quadrics for a whole store
#[derive(Debug, Clone)]
pub struct QuadricTable {
    quadrics: Vec<Quadric>,
    settings: QuadricSettings,
}

impl QuadricTable {
    /// A table with no vertices, to be replaced by [`QuadricTable::build`].
    pub fn empty(settings: QuadricSettings) -> Self {
        Self {
            quadrics: Vec::new(),
            settings,
        }
    }

    pub fn build(store: &MeshStore, settings: QuadricSettings) -> Self {
        let quadrics = (0..store.vertex_slots())
            .map(|v| {
                if store.is_live_vertex(v) {
                    quadric_for_vertex(store, v, &settings)
                } else {
                    Quadric::zero()
                }
            })
            .collect();
        Self { quadrics, settings }
    }

    pub fn settings(&self) -> &QuadricSettings {
        &self.settings
    }

    pub fn get(&self, v: usize) -> &Quadric {
        &self.quadrics[v]
    }

    /// Fold `remove`'s quadric into `keep`.
    pub fn merge(&mut self, keep: usize, remove: usize) {
        let q = std::mem::take(&mut self.quadrics[remove]);
        self.quadrics[keep] += q;
    }

    /// Cost of collapsing `a`-`b` into `a`, including the uv stretch term
    /// and the triangle quality penalty.
    pub fn cost_of_edge(&self, store: &MeshStore, a: usize, b: usize) -> EdgeCost {
        let combined = self.quadrics[a] + self.quadrics[b];
        let mut cost = cost_of(&combined, &store.position(a), &store.position(b), &self.settings);

        if self.settings.texture_weight > 0.0 {
            cost.cost += self.settings.texture_weight
                * texture_stretch(store, a, b, &cost.position, self.settings.area_weighting);
        }

        let threshold = self.settings.quality_threshold;
        if threshold > 0.0 {
            let quality = store.min_quality_after(a, b, &cost.position);
            if quality < threshold {
                cost.cost *= threshold / quality.max(self.settings.quality_floor);
            }
        }
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MeshBuffer;
    use approx::assert_relative_eq;

    fn axis_planes_through(p: Point3d) -> Quadric {
        Quadric::from_plane(&Vector3d::x(), -p.x)
            + Quadric::from_plane(&Vector3d::y(), -p.y)
            + Quadric::from_plane(&Vector3d::z(), -p.z)
    }

    fn grid(n: usize) -> MeshStore {
        MeshStore::import(&grid_buffer(n)).unwrap()
    }

    /// Grid whose uvs are the positions scaled by `scale`.
    fn textured_grid(n: usize, scale: f32) -> MeshStore {
        let buffer = grid_buffer(n);
        let uvs = buffer
            .positions
            .iter()
            .map(|p| [p[0] * scale, p[1] * scale])
            .collect();
        MeshStore::import(&buffer.with_uvs(uvs)).unwrap()
    }

    fn grid_buffer(n: usize) -> MeshBuffer {
        let mut positions = Vec::new();
        for j in 0..n {
            for i in 0..n {
                positions.push([i as f32, j as f32, 0.0]);
            }
        }
        let mut indices = Vec::new();
        for j in 0..n - 1 {
            for i in 0..n - 1 {
                let v = (j * n + i) as u32;
                let n = n as u32;
                indices.extend([v, v + 1, v + n + 1, v, v + n + 1, v + n]);
            }
        }
        MeshBuffer::new(positions, indices)
    }

    #[test]
    fn test_plane_quadric_is_squared_distance() {
        let q = Quadric::from_plane(&Vector3d::z(), -2.0);
        assert_relative_eq!(q.evaluate(&Point3d::new(5.0, -3.0, 5.0)), 9.0);
        assert_relative_eq!(q.evaluate(&Point3d::new(1.0, 1.0, 2.0)), 0.0);
        assert_relative_eq!(q.scaled(2.0).evaluate(&Point3d::origin()), 8.0);
    }

    #[test]
    fn test_minimizer_of_three_planes() {
        let q = axis_planes_through(Point3d::new(1.0, 2.0, 3.0));
        let p = q.minimizer(1e-10).unwrap();
        assert_relative_eq!(p, Point3d::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        assert_relative_eq!(q.evaluate(&p), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_minimizer_singular() {
        let q = Quadric::from_plane(&Vector3d::z(), 0.0);
        assert_eq!(q.minimizer(1e-10), Err(NumericDegeneracy));
        assert_eq!(Quadric::zero().minimizer(1e-10), Err(NumericDegeneracy));
    }

    #[test]
    fn test_fallback_picks_cheapest_candidate() {
        // Plane x = 1: endpoint b lies on it
        let q = Quadric::from_plane(&Vector3d::x(), -1.0);
        let a = Point3d::new(0.0, 0.0, 0.0);
        let b = Point3d::new(1.0, 0.0, 0.0);
        let cost = cost_of(&q, &a, &b, &QuadricSettings::default());
        assert_eq!(cost.placement, Placement::EndpointB);
        assert_eq!(cost.position, b);
        assert_relative_eq!(cost.cost, 0.0);
        assert!(cost.is_fallback(&QuadricSettings::default()));
    }

    #[test]
    fn test_fallback_prefers_midpoint_on_ties() {
        let q = Quadric::from_plane(&Vector3d::z(), 0.0);
        let a = Point3d::new(0.0, 0.0, 0.0);
        let b = Point3d::new(2.0, 0.0, 0.0);
        let cost = cost_of(&q, &a, &b, &QuadricSettings::default());
        assert_eq!(cost.placement, Placement::Midpoint);
        assert_eq!(cost.position, Point3d::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_optimal_placement_can_be_disabled() {
        let q = axis_planes_through(Point3d::new(0.5, 0.0, 0.0));
        let settings = QuadricSettings {
            optimal_placement: false,
            ..Default::default()
        };
        let cost = cost_of(&q, &Point3d::origin(), &Point3d::new(1.0, 0.0, 0.0), &settings);
        assert_eq!(cost.placement, Placement::Midpoint);
        assert!(!cost.is_fallback(&settings));
    }

    #[test]
    fn test_cost_is_never_negative() {
        let q = axis_planes_through(Point3d::new(1.0, 1.0, 1.0)).scaled(1e8);
        let cost = cost_of(&q, &Point3d::origin(), &Point3d::new(2.0, 2.0, 2.0), &QuadricSettings::default());
        assert!(cost.cost >= 0.0);
        assert!(cost.error >= 0.0);
    }

    #[test]
    fn test_planar_patch_costs_nothing() {
        let store = grid(5);
        let table = QuadricTable::build(&store, QuadricSettings::default());
        for (a, b) in store.edges() {
            let cost = table.cost_of_edge(&store, a, b);
            assert!(cost.error.abs() < 1e-9, "edge ({a}, {b}) costs {}", cost.error);
            assert!(cost.position.z.abs() < 1e-9);
        }
    }

    #[test]
    fn test_area_weighting() {
        let store = grid(2);
        let weighted = quadric_from_triangle(&store, 0, true);
        let plain = quadric_from_triangle(&store, 0, false);
        let p = Point3d::new(0.0, 0.0, 1.0);
        assert_relative_eq!(plain.evaluate(&p), 1.0);
        assert_relative_eq!(weighted.evaluate(&p), 0.5);
    }

    #[test]
    fn test_boundary_constraints() {
        let store = grid(3);
        let free = QuadricSettings::default();
        let constrained = QuadricSettings {
            boundary_weight: Some(1.0),
            ..Default::default()
        };
        // Corner vertex: moving it off the mesh edge costs only with constraints
        let off_edge = Point3d::new(-1.0, 0.0, 0.0);
        let corner = 0;
        assert_relative_eq!(quadric_for_vertex(&store, corner, &free).evaluate(&off_edge), 0.0);
        assert!(quadric_for_vertex(&store, corner, &constrained).evaluate(&Point3d::new(0.0, -1.0, 0.0)) > 0.0);

        // Interior vertex gets no boundary planes
        let centre = 4;
        assert_eq!(
            quadric_for_vertex(&store, centre, &free),
            quadric_for_vertex(&store, centre, &constrained)
        );
    }

    #[test]
    fn test_merge_moves_quadric() {
        let store = grid(3);
        let mut table = QuadricTable::build(&store, QuadricSettings::default());
        let expected = *table.get(3) + *table.get(4);
        table.merge(3, 4);
        assert_eq!(*table.get(3), expected);
        assert_eq!(*table.get(4), Quadric::zero());
    }

    #[test]
    fn test_quality_penalty() {
        let store = grid(3);
        let plain = QuadricTable::build(
            &store,
            QuadricSettings {
                quality_threshold: 0.0,
                boundary_weight: Some(1.0),
                ..Default::default()
            },
        );
        let penalised = QuadricTable::build(
            &store,
            QuadricSettings {
                quality_threshold: 1.0,
                boundary_weight: Some(1.0),
                ..Default::default()
            },
        );
        // Corner edge whose collapse moves off the boundary lines
        let a = plain.cost_of_edge(&store, 0, 4);
        let b = penalised.cost_of_edge(&store, 0, 4);
        assert_eq!(a.error, b.error);
        assert!(b.cost >= a.cost);

        // A floor of 1 caps the penalty factor at threshold / 1
        let floored = QuadricTable::build(
            &store,
            QuadricSettings {
                quality_threshold: 1.0,
                quality_floor: 1.0,
                boundary_weight: Some(1.0),
                ..Default::default()
            },
        );
        assert_relative_eq!(floored.cost_of_edge(&store, 0, 4).cost, a.cost);
    }

    #[test]
    fn test_texture_stretch() {
        let store = textured_grid(3, 0.5);
        // Edge 3-4 runs along x with a uv length of 0.5 and two unit-area halves
        let midpoint = Point3d::new(0.5, 1.0, 0.0);
        assert_relative_eq!(texture_stretch(&store, 3, 4, &midpoint, true), 0.125);
        assert_relative_eq!(texture_stretch(&store, 3, 4, &store.position(3), false), 0.25);
        assert_eq!(texture_stretch(&grid(3), 3, 4, &midpoint, true), 0.0);
    }

    #[test]
    fn test_texture_weight_raises_cost() {
        let store = textured_grid(3, 0.5);
        let settings = |texture_weight| QuadricSettings {
            quality_threshold: 0.0,
            texture_weight,
            ..Default::default()
        };
        let plain = QuadricTable::build(&store, settings(0.0)).cost_of_edge(&store, 3, 4);
        let textured = QuadricTable::build(&store, settings(2.0)).cost_of_edge(&store, 3, 4);

        // Flat grid: no geometric error, midpoint placement
        assert_eq!(plain.placement, Placement::Midpoint);
        assert_eq!(textured.position, plain.position);
        assert_eq!(textured.error, plain.error);
        assert_relative_eq!(textured.cost - plain.cost, 0.25, epsilon = 1e-12);
    }
}
