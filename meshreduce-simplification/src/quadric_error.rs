//! Quadric error decimation

use meshreduce_core::{Error, Result, TriangleMesh};

use crate::adapter::MeshBuffer;
use crate::config::ReductionConfig;
use crate::decimation::reduce_mesh;
use crate::report::ReductionReport;
use crate::MeshSimplifier;

/// Quadric error decimation simplifier
///
/// Every option except the target comes from `config`; the target is derived
/// from the reduction ratio passed to [`MeshSimplifier::simplify`].
#[derive(Debug, Clone, Default)]
pub struct QuadricErrorSimplifier {
    pub config: ReductionConfig,
}

impl QuadricErrorSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReductionConfig) -> Self {
        Self { config }
    }

    /// Simplify and also return the reduction report.
    pub fn simplify_with_report(
        &self,
        mesh: &TriangleMesh,
        reduction_ratio: f32,
    ) -> Result<(TriangleMesh, ReductionReport)> {
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&reduction_ratio) {
            return Err(Error::InvalidData(
                "Reduction ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        let target = ((1.0 - reduction_ratio) * mesh.faces.len() as f32) as usize;
        let config = ReductionConfig {
            target_triangle_count: Some(target),
            target_ratio: None,
            ..self.config.clone()
        };

        let buffer = MeshBuffer::try_from(mesh)?;
        let output = reduce_mesh(&buffer, &config)?;
        Ok((output.mesh.to_triangle_mesh(), output.report))
    }
}

impl MeshSimplifier for QuadricErrorSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        if reduction_ratio == 0.0 && !mesh.is_empty() {
            return Ok(mesh.clone());
        }
        self.simplify_with_report(mesh, reduction_ratio)
            .map(|(mesh, _)| mesh)
    }
}
