//! Error taxonomy for mesh reduction
//!
//! Only [`ImportError`] and configuration errors abort a job. Collapse
//! rejections and numeric degeneracies are handled inside the reduction loop
//! and only show up in the report counters.

use thiserror::Error;

/// Malformed input topology; fatal, raised before seeding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("index buffer length {index_count} is not a multiple of 3")]
    NonTriangularFace { index_count: usize },

    #[error("triangle {triangle} references vertex {index}, but the mesh has {vertex_count} vertices")]
    DanglingIndex {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("{attribute} has {found} entries, expected {expected}")]
    AttributeLengthMismatch {
        attribute: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("vertex {vertex} has a non-finite position")]
    NonFinitePosition { vertex: usize },

    #[error("vertex index {index} does not fit in 32 bits")]
    IndexOverflow { index: usize },
}

/// Why a single edge collapse was refused. The mesh is left untouched.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollapseError {
    #[error("collapse would flip or flatten a neighbouring triangle")]
    QualityViolation,

    #[error("collapse would produce non-manifold topology")]
    NonManifold,

    #[error("edge endpoint is no longer live")]
    DeadVertex,

    #[error("vertices do not share a live triangle")]
    NotAnEdge,
}

/// The quadric's 3x3 system could not be solved within tolerance.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("quadric system is singular")]
pub struct NumericDegeneracy;

/// Top-level error for a reduction job
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimplifyError {
    #[error("import failed: {0}")]
    Import(#[from] ImportError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for reduction jobs
pub type SimplifyResult<T> = std::result::Result<T, SimplifyError>;

impl From<SimplifyError> for meshreduce_core::Error {
    fn from(e: SimplifyError) -> Self {
        match e {
            SimplifyError::Import(e) => e.into(),
            SimplifyError::InvalidConfig(msg) => meshreduce_core::Error::Configuration(msg),
        }
    }
}

impl From<ImportError> for meshreduce_core::Error {
    fn from(e: ImportError) -> Self {
        meshreduce_core::Error::InvalidData(e.to_string())
    }
}
