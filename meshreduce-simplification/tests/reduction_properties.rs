//! End-to-end properties of mesh reduction

use std::collections::HashMap;

use meshreduce_simplification::{
    clean_buffer, reduce_mesh, reduce_mesh_with_cancellation, CancellationToken, DecimationEngine,
    ImportError, MeshBuffer, MeshStore, ReductionConfig, SimplifyError, Termination,
};

fn cube() -> MeshBuffer {
    MeshBuffer::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ],
        vec![
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 1, 2, 6, 1, 6, 5, 2, 3, 7, 2, 7,
            6, 3, 0, 4, 3, 4, 7,
        ],
    )
}

fn grid(size: u32, height: impl Fn(f32, f32) -> f32) -> MeshBuffer {
    let mut positions = Vec::new();
    for y in 0..size {
        for x in 0..size {
            let fx = x as f32 / (size - 1) as f32;
            let fy = y as f32 / (size - 1) as f32;
            positions.push([x as f32, y as f32, height(fx, fy)]);
        }
    }
    let mut indices = Vec::new();
    for y in 0..size - 1 {
        for x in 0..size - 1 {
            let tl = y * size + x;
            let tr = tl + 1;
            let bl = tl + size;
            let br = bl + 1;
            indices.extend([tl, bl, tr, tr, bl, br]);
        }
    }
    MeshBuffer::new(positions, indices)
}

fn flat(_: f32, _: f32) -> f32 {
    0.0
}

fn dome(fx: f32, fy: f32) -> f32 {
    use std::f32::consts::PI;
    (fx * PI).sin() * (fy * PI).sin() * 2.0
}

/// Number of live triangles on each undirected edge.
fn edge_use(mesh: &MeshBuffer) -> HashMap<(u32, u32), usize> {
    let mut uses = HashMap::new();
    for [a, b, c] in mesh.triangles() {
        for (u, v) in [(a, b), (b, c), (c, a)] {
            *uses.entry((u.min(v), u.max(v))).or_insert(0) += 1;
        }
    }
    uses
}

fn assert_well_formed(mesh: &MeshBuffer) {
    assert!(mesh.validate().is_ok());
    for [a, b, c] in mesh.triangles() {
        assert!(a != b && b != c && c != a, "repeated index in [{a}, {b}, {c}]");
    }
}

#[test]
fn cube_reduces_to_four_closed_triangles() {
    let output = reduce_mesh(&cube(), &ReductionConfig::with_target_triangles(4)).unwrap();

    assert_eq!(output.report.termination, Termination::TargetReached);
    assert_eq!(output.mesh.triangle_count(), 4);
    assert_well_formed(&output.mesh);
    let uses = edge_use(&output.mesh);
    assert_eq!(uses.len(), 6);
    assert!(uses.values().all(|&n| n == 2), "holes in {uses:?}");
}

#[test]
fn counts_stay_between_target_and_input() {
    let cases = [
        (grid(6, flat), ReductionConfig::with_target_triangles(25)),
        (grid(6, flat), ReductionConfig::with_target_triangles(25).preserve_boundary_edges(false)),
        (grid(8, dome), ReductionConfig::with_target_ratio(0.5)),
        (grid(8, dome), ReductionConfig::with_target_triangles(10).preserve_boundary_edges(false)),
        (grid(11, flat), ReductionConfig::with_target_triangles(100)),
    ];

    for (input, config) in cases {
        let target = config.resolve_target(input.triangle_count()).unwrap();
        let output = reduce_mesh(&input, &config).unwrap();
        let after = output.mesh.triangle_count();

        assert!(after <= input.triangle_count());
        assert!(after >= target, "{after} triangles is below the target {target}");
        if output.report.termination == Termination::TargetReached {
            assert_eq!(after, target);
        }
        assert_eq!(output.report.triangles_before, input.triangle_count());
        assert_eq!(output.report.triangles_after, after);
        assert_well_formed(&output.mesh);
    }
}

#[test]
fn planar_grid_reaches_its_target() {
    let output = reduce_mesh(&grid(11, flat), &ReductionConfig::with_target_triangles(100)).unwrap();
    assert_eq!(output.report.termination, Termination::TargetReached);
    assert_eq!(output.mesh.triangle_count(), 100);
    assert!(output.report.max_error < 1e-9);
    assert!(output.mesh.positions.iter().all(|p| p[2] == 0.0));
    // Interior quadrics of a plane cannot be solved
    assert!(output.report.counters.numeric_fallbacks > 0);
}

#[test]
fn free_topology_never_undershoots() {
    let inputs = [cube(), grid(6, dome)];
    for input in inputs {
        for target in 1..input.triangle_count() {
            let config = ReductionConfig::with_target_triangles(target)
                .preserve_topology(false)
                .preserve_boundary_edges(false)
                .normal_flip_angle(180.0)
                .quality_threshold(0.0);
            let output = reduce_mesh(&input, &config).unwrap();
            let after = output.mesh.triangle_count();
            assert!(after >= target, "{after} triangles is below the target {target}");
            assert_eq!(output.report.triangles_after, after);
            assert_well_formed(&output.mesh);
        }
    }
}

#[test]
fn quality_violations_do_not_stop_the_job() {
    let input = grid(8, dome);
    let config = ReductionConfig::with_target_ratio(0.5)
        .preserve_boundary_edges(false)
        .normal_flip_angle(2.0);
    let output = reduce_mesh(&input, &config).unwrap();

    let counters = output.report.counters;
    assert!(counters.quality_violations > 0);
    assert!(counters.collapses > 0);
    assert!(output.mesh.triangle_count() < input.triangle_count());
    assert_well_formed(&output.mesh);
}

#[test]
fn locked_boundary_can_exhaust_the_queue() {
    // 16 interior vertices; the last collapse would undershoot the target
    let output = reduce_mesh(&grid(6, flat), &ReductionConfig::with_target_triangles(25)).unwrap();
    assert_eq!(output.report.termination, Termination::QueueExhausted);
    assert_eq!(output.mesh.triangle_count(), 26);
    assert!(output.report.counters.overshoot_skips > 0);
}

#[test]
fn boundary_stays_open_and_intact() {
    let input = grid(8, dome);
    let before: usize = edge_use(&input).values().filter(|&&n| n == 1).count();
    let output = reduce_mesh(&input, &ReductionConfig::with_target_ratio(0.5)).unwrap();
    let after: usize = edge_use(&output.mesh).values().filter(|&&n| n == 1).count();
    assert_eq!(before, after);
}

#[test]
fn unreducible_mesh_comes_back_unchanged() {
    let tetrahedron = MeshBuffer::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.5, 1.0, 0.0],
            [0.5, 0.5, 1.0],
        ],
        vec![0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3],
    );
    let output = reduce_mesh(&tetrahedron, &ReductionConfig::with_target_triangles(2)).unwrap();
    assert_eq!(output.mesh, tetrahedron);
    assert_eq!(output.report.termination, Termination::QueueExhausted);

    // A second pass over a fully reduced mesh changes nothing either
    let first = reduce_mesh(&grid(6, flat), &ReductionConfig::with_target_triangles(25)).unwrap();
    let second = reduce_mesh(&first.mesh, &ReductionConfig::with_target_triangles(25)).unwrap();
    assert_eq!(second.mesh, first.mesh);
    assert!(!second.report.was_reduced());
}

#[test]
fn export_then_import_keeps_topology() {
    let output = reduce_mesh(&grid(8, dome), &ReductionConfig::with_target_ratio(0.4)).unwrap();

    let store = MeshStore::import(&output.mesh).unwrap();
    assert_eq!(store.live_triangle_count(), output.mesh.triangle_count());
    assert_eq!(store.live_vertex_count(), output.mesh.vertex_count());

    let (exported, remap) = store.compact();
    assert_eq!(exported, output.mesh);
    assert!(remap.iter().enumerate().all(|(i, r)| *r == Some(i as u32)));
}

#[test]
fn zero_area_triangle_is_dropped_during_seeding() {
    let mut input = grid(4, flat);
    // Sliver on top of an existing edge
    input.positions.push([0.5, 0.0, 0.0]);
    input.indices.extend([0, 1, 16]);

    let output = reduce_mesh(&input, &ReductionConfig::with_target_ratio(1.0)).unwrap();
    assert_eq!(output.report.counters.degenerate_input_triangles, 1);
    assert_eq!(output.mesh.triangle_count(), 18);
    assert_eq!(output.mesh.vertex_count(), 16);
    assert!(output.report.max_error == 0.0);
}

#[test]
fn cleaning_runs_before_import() {
    let mut input = grid(4, flat);
    input.indices.extend([0, 0, 1]);

    // Without cleaning the repeated index is still dropped during seeding
    let raw = reduce_mesh(&input, &ReductionConfig::with_target_ratio(1.0)).unwrap();
    assert_eq!(raw.report.counters.degenerate_input_triangles, 1);

    let cleaned = reduce_mesh(&input, &ReductionConfig::with_target_ratio(1.0).clean_input(true)).unwrap();
    assert_eq!(cleaned.report.counters.degenerate_input_triangles, 0);
    assert_eq!(cleaned.report.triangles_before, 18);

    let (buffer, report) = clean_buffer(&input, 1e-12).unwrap();
    assert_eq!(report.degenerate_faces, 1);
    assert_eq!(buffer.triangle_count(), 18);
}

#[test]
fn attributes_follow_the_reduction() {
    let input = grid(7, dome);
    let n = input.vertex_count();
    let input = input
        .with_normals(vec![[0.0, 0.0, 1.0]; n])
        .with_uvs(input_uvs(7))
        .with_colors(vec![[10, 20, 30]; n]);

    let output = reduce_mesh(&input, &ReductionConfig::with_target_ratio(0.5)).unwrap();
    let m = output.mesh.vertex_count();
    assert!(m < n);
    assert_eq!(output.mesh.normals.as_ref().map(Vec::len), Some(m));
    assert_eq!(output.mesh.uvs.as_ref().map(Vec::len), Some(m));
    assert_eq!(output.mesh.colors, Some(vec![[10, 20, 30]; m]));

    for uv in output.mesh.uvs.iter().flatten() {
        assert!((0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1]));
    }
    assert!(output.mesh.validate().is_ok());
}

fn input_uvs(size: u32) -> Vec<[f32; 2]> {
    let mut uvs = Vec::new();
    for y in 0..size {
        for x in 0..size {
            uvs.push([x as f32 / (size - 1) as f32, y as f32 / (size - 1) as f32]);
        }
    }
    uvs
}

#[test]
fn import_errors_abort_the_job() {
    let mut bad = cube();
    bad.indices[5] = 42;
    assert!(matches!(
        reduce_mesh(&bad, &ReductionConfig::default()),
        Err(SimplifyError::Import(ImportError::DanglingIndex { index: 42, .. }))
    ));

    let bad = cube().with_colors(vec![[0, 0, 0]; 3]);
    assert!(matches!(
        reduce_mesh(&bad, &ReductionConfig::default()),
        Err(SimplifyError::Import(ImportError::AttributeLengthMismatch { .. }))
    ));
}

#[test]
fn cancellation_returns_a_valid_mesh() {
    let token = CancellationToken::new();
    token.cancel();
    let input = grid(8, dome);
    let output =
        reduce_mesh_with_cancellation(&input, &ReductionConfig::with_target_ratio(0.2), &token)
            .unwrap();
    assert_eq!(output.report.termination, Termination::Canceled);
    assert_eq!(output.mesh, input);
}

#[test]
fn cancellation_mid_run_returns_a_valid_mesh() {
    let input = grid(8, dome);
    let config = ReductionConfig::with_target_ratio(0.2).preserve_boundary_edges(false);
    let token = CancellationToken::new();
    let mut engine = DecimationEngine::new(MeshStore::import(&input).unwrap(), &config)
        .unwrap()
        .with_cancellation(token.clone());

    while engine.counters().collapses < 10 {
        assert_eq!(engine.step(), None);
    }
    token.cancel();
    let output = engine.run();

    assert_eq!(output.report.termination, Termination::Canceled);
    assert_eq!(output.report.counters.collapses, 10);
    let after = output.mesh.triangle_count();
    assert!(after < input.triangle_count());
    assert!(after > config.resolve_target(input.triangle_count()).unwrap());
    assert_well_formed(&output.mesh);
    assert!(edge_use(&output.mesh).values().all(|&n| n <= 2));
}

#[test]
fn error_ceiling_limits_the_damage() {
    let input = grid(8, dome);
    let config = ReductionConfig::with_target_ratio(0.1).error_ceiling(1e-3);
    let output = reduce_mesh(&input, &config).unwrap();

    assert!(output.report.max_error <= 1e-3);
    if output.report.termination != Termination::ErrorCeiling {
        assert_eq!(output.report.termination, Termination::QueueExhausted);
    }
    assert_well_formed(&output.mesh);
}

#[test]
fn reduction_is_deterministic() {
    let input = grid(9, dome);
    let config = ReductionConfig::with_target_ratio(0.3).preserve_boundary_edges(false);
    let a = reduce_mesh(&input, &config).unwrap();
    let b = reduce_mesh(&input, &config).unwrap();
    assert_eq!(a, b);
}
