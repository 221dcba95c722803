//! Reduction results and statistics

// Triangle counts don't overflow in practice
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use crate::adapter::MeshBuffer;

/// Why the reduction loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Live triangle count reached the target
    TargetReached,
    /// No viable candidate left
    QueueExhausted,
    /// Cheapest remaining collapse exceeds the error ceiling
    ErrorCeiling,
    /// Cancellation was requested
    Canceled,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TargetReached => "target reached",
            Self::QueueExhausted => "queue exhausted",
            Self::ErrorCeiling => "error ceiling",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Event counters collected during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollapseCounters {
    pub collapses: usize,
    pub quality_violations: usize,
    pub non_manifold_rejections: usize,
    /// Cost evaluations where the optimal position could not be solved
    pub numeric_fallbacks: usize,
    pub stale_discards: usize,
    /// Candidates skipped because the collapse would undershoot the target
    pub overshoot_skips: usize,
    /// Zero-area input triangles removed during seeding
    pub degenerate_input_triangles: usize,
}

impl CollapseCounters {
    /// Collapses refused by the quality or topology checks.
    pub fn rejections(&self) -> usize {
        self.quality_violations + self.non_manifold_rejections
    }
}

/// Summary of a reduction job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionReport {
    /// Live triangles at the start of reduction
    pub triangles_before: usize,
    pub triangles_after: usize,
    /// Largest quadric error of any performed collapse
    pub max_error: f64,
    pub termination: Termination,
    #[serde(flatten)]
    pub counters: CollapseCounters,
}

impl ReductionReport {
    /// Get the reduction ratio (after / before).
    #[must_use]
    pub fn reduction_ratio(&self) -> f64 {
        if self.triangles_before == 0 {
            1.0
        } else {
            self.triangles_after as f64 / self.triangles_before as f64
        }
    }

    /// Get the percentage of triangles removed.
    #[must_use]
    pub fn reduction_percent(&self) -> f64 {
        (1.0 - self.reduction_ratio()) * 100.0
    }

    /// Check if any collapse happened.
    #[must_use]
    pub const fn was_reduced(&self) -> bool {
        self.counters.collapses > 0
    }
}

impl std::fmt::Display for ReductionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Reduction: {} → {} triangles ({:.1}% reduction, {} collapses, {} rejected, max error {:.3e}, {})",
            self.triangles_before,
            self.triangles_after,
            self.reduction_percent(),
            self.counters.collapses,
            self.counters.rejections(),
            self.max_error,
            self.termination
        )
    }
}

/// Reduced mesh and its report
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionOutput {
    pub mesh: MeshBuffer,
    pub report: ReductionReport,
}
