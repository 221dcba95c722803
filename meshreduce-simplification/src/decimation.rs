//! Iterative edge-collapse decimation
//!
//! The engine seeds a queue with the cost of every eligible edge, then
//! repeatedly collapses the cheapest one until the target is met, the queue
//! runs dry, the error ceiling is hit or the job is canceled.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapter::MeshBuffer;
use crate::candidate_queue::{Candidate, CandidateQueue, EdgeKey, Stamp};
use crate::clean::clean_buffer;
use crate::config::ReductionConfig;
use crate::error::{CollapseError, SimplifyResult};
use crate::mesh_store::{CollapseGuard, CollapseSummary, MeshStore};
use crate::quadric::{QuadricSettings, QuadricTable};
use crate::report::{CollapseCounters, ReductionOutput, ReductionReport, Termination};

/// Phase of a [`DecimationEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle,
    Seeding,
    Reducing,
    Finalizing,
    Done,
}

/// Cooperative cancellation flag, checked between collapses
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Edge-collapse state machine over a single [`MeshStore`]
#[derive(Debug)]
pub struct DecimationEngine {
    store: MeshStore,
    quadrics: QuadricTable,
    queue: CandidateQueue,
    config: ReductionConfig,
    state: EngineState,
    target: usize,
    triangles_before: usize,
    counters: CollapseCounters,
    max_error: f64,
    termination: Option<Termination>,
    cancel: CancellationToken,
}

impl DecimationEngine {
    /// Prepare a job. The target is resolved against the store's live triangles.
    pub fn new(store: MeshStore, config: &ReductionConfig) -> SimplifyResult<Self> {
        let triangles_before = store.live_triangle_count();
        let target = config.resolve_target(triangles_before)?;

        let guard = CollapseGuard {
            min_normal_cos: config.normal_flip_cos(),
            preserve_topology: config.preserve_topology,
            area_epsilon: config.degenerate_area_epsilon,
        };
        let settings = QuadricSettings {
            area_weighting: config.area_weighting,
            boundary_weight: (!config.preserve_boundary_edges).then_some(config.boundary_weight),
            singular_tolerance: config.singular_tolerance,
            quality_threshold: config.quality_threshold,
            quality_floor: config.quality_floor,
            optimal_placement: config.optimal_placement,
            texture_weight: config.texture_weight,
        };

        Ok(Self {
            store: store.with_guard(guard),
            quadrics: QuadricTable::empty(settings),
            queue: CandidateQueue::new(),
            config: config.clone(),
            state: EngineState::Idle,
            target,
            triangles_before,
            counters: CollapseCounters::default(),
            max_error: 0.0,
            termination: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Resolved triangle target
    pub fn target(&self) -> usize {
        self.target
    }

    pub fn store(&self) -> &MeshStore {
        &self.store
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn counters(&self) -> &CollapseCounters {
        &self.counters
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Drop degenerate input, build quadrics and queue every eligible edge.
    pub fn seed(&mut self) {
        if self.state != EngineState::Idle {
            return;
        }
        self.state = EngineState::Seeding;

        let degenerate = self
            .store
            .tombstone_degenerate_triangles(self.config.degenerate_area_epsilon);
        if degenerate > 0 {
            warn!(count = degenerate, "Removed zero-area input triangles");
        }
        self.counters.degenerate_input_triangles = degenerate;

        self.quadrics = QuadricTable::build(&self.store, *self.quadrics.settings());
        for (a, b) in self.store.edges() {
            self.enqueue(EdgeKey::new(a, b));
        }

        debug!(
            edges = self.queue.len(),
            triangles = self.store.live_triangle_count(),
            "Seeded collapse queue"
        );
    }

    /// Collapse edges until a stop condition holds.
    pub fn reduce(&mut self) -> Termination {
        if let Some(termination) = self.termination {
            return termination;
        }
        self.seed();
        self.state = EngineState::Reducing;

        info!(
            triangles = self.store.live_triangle_count(),
            target = self.target,
            "Starting mesh reduction"
        );

        let termination = loop {
            if let Some(termination) = self.step() {
                break termination;
            }
        };

        info!(
            triangles = self.store.live_triangle_count(),
            collapses = self.counters.collapses,
            ineligible = self.queue.ineligible_count(),
            termination = %termination,
            "Mesh reduction stopped"
        );
        termination
    }

    /// Run one pass of the collapse loop: a single pop, discard or collapse.
    ///
    /// Returns the termination once a stop condition holds; later calls keep
    /// returning it.
    pub fn step(&mut self) -> Option<Termination> {
        if self.termination.is_some() {
            return self.termination;
        }
        self.seed();
        self.state = EngineState::Reducing;

        if self.store.live_triangle_count() <= self.target {
            return self.stop(Termination::TargetReached);
        }
        if self.cancel.is_canceled() {
            return self.stop(Termination::Canceled);
        }
        let Some(candidate) = self.queue.peek_min() else {
            return self.stop(Termination::QueueExhausted);
        };
        if self.is_stale(&candidate) {
            self.queue.pop_min();
            self.discard_stale(candidate);
            return None;
        }
        // The cheapest fresh candidate stays queued when it breaks the ceiling
        if self
            .config
            .error_ceiling
            .is_some_and(|ceiling| candidate.cost > ceiling)
        {
            return self.stop(Termination::ErrorCeiling);
        }
        self.queue.pop_min();
        self.try_collapse(candidate);
        None
    }

    fn stop(&mut self, termination: Termination) -> Option<Termination> {
        self.termination = Some(termination);
        Some(termination)
    }

    /// Compact the store into the output mesh and report.
    pub fn finalize(&mut self) -> ReductionOutput {
        let termination = self.reduce();
        self.state = EngineState::Finalizing;

        let (mesh, _) = self.store.compact();
        let report = ReductionReport {
            triangles_before: self.triangles_before,
            triangles_after: mesh.triangle_count(),
            max_error: self.max_error,
            termination,
            counters: self.counters,
        };
        debug!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            "Built final reduced mesh"
        );

        self.state = EngineState::Done;
        ReductionOutput { mesh, report }
    }

    /// Seed, reduce and finalize.
    pub fn run(mut self) -> ReductionOutput {
        self.finalize()
    }

    fn is_stale(&self, candidate: &Candidate) -> bool {
        let edge = candidate.edge;
        !self.store.is_live_vertex(edge.a)
            || !self.store.is_live_vertex(edge.b)
            || candidate.stamp != Stamp::of(&self.store, edge)
    }

    /// Drop a popped stale candidate, re-queueing its edge if it still exists
    /// and nothing fresh replaces it.
    fn discard_stale(&mut self, candidate: Candidate) {
        self.counters.stale_discards += 1;

        let edge = candidate.edge;
        if !self.store.is_live_vertex(edge.a) || !self.store.is_live_vertex(edge.b) {
            return;
        }
        let current = Stamp::of(&self.store, edge);
        if !self.queue.contains_fresh(edge, current)
            && !self.store.edge_triangles(edge.a, edge.b).is_empty()
        {
            self.enqueue(edge);
        }
    }

    fn try_collapse(&mut self, candidate: Candidate) {
        let EdgeKey { a, b } = candidate.edge;

        if self.store.edge_triangles(a, b).is_empty() {
            self.counters.stale_discards += 1;
            return;
        }
        // Never drop below the target in one step
        let removed = self.store.removal_count(a, b);
        if self.store.live_triangle_count().saturating_sub(removed) < self.target {
            self.counters.overshoot_skips += 1;
            return;
        }

        match self.store.collapse_edge(a, b, candidate.position) {
            Ok(summary) => {
                self.quadrics.merge(a, b);
                self.counters.collapses += 1;
                self.max_error = self.max_error.max(candidate.error);
                self.reseed(&summary);
            }
            Err(CollapseError::QualityViolation) => {
                debug!(a, b, "Collapse rejected: quality violation");
                self.counters.quality_violations += 1;
                self.queue.mark_ineligible(candidate.edge);
            }
            Err(CollapseError::NonManifold) => {
                debug!(a, b, "Collapse rejected: non-manifold");
                self.counters.non_manifold_rejections += 1;
                self.queue.mark_ineligible(candidate.edge);
            }
            Err(CollapseError::DeadVertex | CollapseError::NotAnEdge) => {
                self.counters.stale_discards += 1;
            }
        }
    }

    /// Requeue every edge touching the merged vertex or its one-ring.
    fn reseed(&mut self, summary: &CollapseSummary) {
        let edges: BTreeSet<EdgeKey> = std::iter::once(summary.kept)
            .chain(summary.ring.iter().copied())
            .flat_map(|v| self.store.incident_edges(v))
            .map(EdgeKey::from)
            .collect();
        for edge in edges {
            self.enqueue(edge);
        }
    }

    fn enqueue(&mut self, edge: EdgeKey) -> bool {
        if self.queue.is_ineligible(edge) {
            return false;
        }
        if self.config.preserve_boundary_edges
            && (self.store.is_boundary_vertex(edge.a) || self.store.is_boundary_vertex(edge.b))
        {
            return false;
        }

        let cost = self.quadrics.cost_of_edge(&self.store, edge.a, edge.b);
        if cost.is_fallback(self.quadrics.settings()) {
            self.counters.numeric_fallbacks += 1;
        }
        let stamp = Stamp::of(&self.store, edge);
        self.queue.push(Candidate::new(edge, stamp, cost))
    }
}

/// Reduce a mesh buffer in one call.
pub fn reduce_mesh(buffer: &MeshBuffer, config: &ReductionConfig) -> SimplifyResult<ReductionOutput> {
    reduce_mesh_with_cancellation(buffer, config, &CancellationToken::new())
}

/// Reduce a mesh buffer, stopping early once `token` is canceled.
///
/// A canceled job still returns a valid, partially reduced mesh.
pub fn reduce_mesh_with_cancellation(
    buffer: &MeshBuffer,
    config: &ReductionConfig,
    token: &CancellationToken,
) -> SimplifyResult<ReductionOutput> {
    config.validate()?;

    let input = if config.clean_input {
        let (cleaned, report) = clean_buffer(buffer, config.degenerate_area_epsilon)?;
        debug!(%report, "Cleaned input mesh");
        Cow::Owned(cleaned)
    } else {
        Cow::Borrowed(buffer)
    };

    let store = MeshStore::import(&input)?;
    let engine = DecimationEngine::new(store, config)?.with_cancellation(token.clone());
    Ok(engine.run())
}
