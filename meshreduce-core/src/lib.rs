//! Core data structures and traits for meshreduce
//!
//! This crate provides the mesh type shared by the reduction engine, the file
//! adapters and the command-line driver, together with the workspace error type.

pub mod point;
pub mod mesh;
pub mod traits;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Point3, Vector3};
