//! Min-cost collapse candidate queue with lazy invalidation
//!
//! Entries are keyed by edge and the generation stamp of its endpoints, so a
//! vertex update never has to search the queue. Stale entries stay queued
//! until they are popped and recognised by the caller.

use std::cmp::Ordering;
use std::collections::HashSet;

use meshreduce_core::Point3d;
use priority_queue::PriorityQueue;

use crate::mesh_store::MeshStore;
use crate::quadric::{EdgeCost, Placement};

/// Undirected edge with `a < b`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub a: usize,
    pub b: usize,
}

impl EdgeKey {
    pub fn new(u: usize, v: usize) -> Self {
        Self {
            a: u.min(v),
            b: u.max(v),
        }
    }
}

impl From<(usize, usize)> for EdgeKey {
    fn from((u, v): (usize, usize)) -> Self {
        Self::new(u, v)
    }
}

/// Generations of an edge's endpoints when its cost was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stamp {
    pub a: u32,
    pub b: u32,
}

impl Stamp {
    /// Current stamp of `edge` in `store`.
    pub fn of(store: &MeshStore, edge: EdgeKey) -> Self {
        Self {
            a: store.generation(edge.a),
            b: store.generation(edge.b),
        }
    }
}

/// A queued edge collapse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub edge: EdgeKey,
    pub stamp: Stamp,
    pub cost: f64,
    /// Raw quadric error, without the quality penalty
    pub error: f64,
    pub position: Point3d,
    pub placement: Placement,
}

impl Candidate {
    pub fn new(edge: EdgeKey, stamp: Stamp, cost: EdgeCost) -> Self {
        Self {
            edge,
            stamp,
            cost: cost.cost,
            error: cost.error,
            position: cost.position,
            placement: cost.placement,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EntryKey {
    edge: EdgeKey,
    stamp: Stamp,
}

/// Orders candidates so the max-heap yields the cheapest first, then the
/// lowest vertex pair.
#[derive(Debug, Clone, Copy)]
struct Priority(Candidate);

impl Priority {
    fn rank(&self, other: &Self) -> Ordering {
        self.0
            .cost
            .total_cmp(&other.0.cost)
            .then_with(|| self.0.edge.cmp(&other.0.edge))
            .then_with(|| self.0.stamp.cmp(&other.0.stamp))
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank(self)
    }
}

/// Priority queue of collapse candidates
#[derive(Debug, Clone, Default)]
pub struct CandidateQueue {
    queue: PriorityQueue<EntryKey, Priority>,
    ineligible: HashSet<EdgeKey>,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a candidate. Returns `false` if its edge is ineligible.
    ///
    /// Pushing the same edge and stamp twice replaces the earlier entry.
    pub fn push(&mut self, candidate: Candidate) -> bool {
        if self.ineligible.contains(&candidate.edge) {
            return false;
        }
        let key = EntryKey {
            edge: candidate.edge,
            stamp: candidate.stamp,
        };
        self.queue.push(key, Priority(candidate));
        true
    }

    pub fn pop_min(&mut self) -> Option<Candidate> {
        self.queue.pop().map(|(_, Priority(candidate))| candidate)
    }

    /// The candidate [`pop_min`](Self::pop_min) would return, left in place.
    pub fn peek_min(&self) -> Option<Candidate> {
        self.queue.peek().map(|(_, Priority(candidate))| *candidate)
    }

    /// Whether an entry for `edge` with exactly this stamp is queued.
    pub fn contains_fresh(&self, edge: EdgeKey, stamp: Stamp) -> bool {
        self.queue.get_priority(&EntryKey { edge, stamp }).is_some()
    }

    /// Never queue `edge` again.
    pub fn mark_ineligible(&mut self, edge: EdgeKey) {
        self.ineligible.insert(edge);
    }

    pub fn is_ineligible(&self, edge: EdgeKey) -> bool {
        self.ineligible.contains(&edge)
    }

    pub fn ineligible_count(&self) -> usize {
        self.ineligible.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
