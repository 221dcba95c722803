//! Mesh simplification by quadric error edge collapse
//!
//! This crate reduces the triangle count of a mesh while keeping its shape:
//! - [`MeshStore`]: indexed triangle store with tombstoned vertices and triangles
//! - [`quadric`]: per-vertex error quadrics and edge collapse costs
//! - [`CandidateQueue`]: min-cost queue with generation-stamped entries
//! - [`DecimationEngine`]: the collapse loop
//! - [`MeshBuffer`]: the flat mesh format accepted and produced by the engine
//!
//! ```
//! use meshreduce_simplification::{reduce_mesh, MeshBuffer, ReductionConfig};
//!
//! let quad = MeshBuffer::new(
//!     vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
//!     vec![0, 1, 2, 0, 2, 3],
//! );
//! let output = reduce_mesh(&quad, &ReductionConfig::with_target_triangles(1)).unwrap();
//! assert!(output.mesh.triangle_count() <= 2);
//! ```

pub mod adapter;
pub mod batch;
pub mod candidate_queue;
pub mod clean;
pub mod config;
pub mod decimation;
pub mod error;
pub mod mesh_store;
pub mod quadric;
pub mod quadric_error;
pub mod report;

pub use adapter::*;
pub use batch::*;
pub use candidate_queue::*;
pub use clean::*;
pub use config::*;
pub use decimation::*;
pub use error::*;
pub use mesh_store::*;
pub use quadric::*;
pub use quadric_error::*;
pub use report::*;

use meshreduce_core::{Result, TriangleMesh};

/// Simplify a mesh by reducing the number of faces/vertices
pub trait MeshSimplifier {
    /// Simplify mesh with target reduction ratio (0.0 = no reduction, 1.0 = maximum reduction)
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh>;
}
