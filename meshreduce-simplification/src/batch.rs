//! Parallel reduction of independent meshes
//!
//! Each job owns its own store, quadrics and queue, so jobs share nothing but
//! the configuration and the cancellation flag.

use rayon::prelude::*;
use tracing::info;

use crate::adapter::MeshBuffer;
use crate::config::ReductionConfig;
use crate::decimation::{reduce_mesh_with_cancellation, CancellationToken};
use crate::error::SimplifyResult;
use crate::report::ReductionOutput;

/// Reduce every buffer with the same configuration on the rayon pool.
///
/// Results are returned in input order; one failing job does not affect the others.
pub fn reduce_batch(
    buffers: &[MeshBuffer],
    config: &ReductionConfig,
) -> Vec<SimplifyResult<ReductionOutput>> {
    reduce_batch_with_cancellation(buffers, config, &CancellationToken::new())
}

/// Like [`reduce_batch`], with one token shared by every job.
pub fn reduce_batch_with_cancellation(
    buffers: &[MeshBuffer],
    config: &ReductionConfig,
    token: &CancellationToken,
) -> Vec<SimplifyResult<ReductionOutput>> {
    info!(jobs = buffers.len(), "Starting batch reduction");

    buffers
        .par_iter()
        .map(|buffer| reduce_mesh_with_cancellation(buffer, config, token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimplifyError;
    use crate::report::Termination;

    fn grid(n: u32) -> MeshBuffer {
        let mut positions = Vec::new();
        for y in 0..n {
            for x in 0..n {
                positions.push([x as f32, y as f32, 0.0]);
            }
        }
        let mut indices = Vec::new();
        for y in 0..n - 1 {
            for x in 0..n - 1 {
                let tl = y * n + x;
                let bl = tl + n;
                indices.extend([tl, bl, tl + 1, tl + 1, bl, bl + 1]);
            }
        }
        MeshBuffer::new(positions, indices)
    }

    #[test]
    fn test_batch_matches_sequential() {
        let buffers = vec![grid(4), grid(6), grid(11)];
        let config = ReductionConfig::with_target_ratio(0.5);

        let batch = reduce_batch(&buffers, &config);
        assert_eq!(batch.len(), 3);
        for (buffer, result) in buffers.iter().zip(&batch) {
            let sequential = crate::decimation::reduce_mesh(buffer, &config).unwrap();
            assert_eq!(result.as_ref().unwrap(), &sequential);
        }
    }

    #[test]
    fn test_failures_stay_per_job() {
        let mut broken = grid(3);
        broken.indices.push(0);
        let results = reduce_batch(&[grid(3), broken], &ReductionConfig::default());
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SimplifyError::Import(_))));
    }

    #[test]
    fn test_canceled_batch() {
        let token = CancellationToken::new();
        token.cancel();
        let results = reduce_batch_with_cancellation(
            &[grid(5), grid(6)],
            &ReductionConfig::with_target_ratio(0.25),
            &token,
        );
        for result in results {
            assert_eq!(result.unwrap().report.termination, Termination::Canceled);
        }
    }
}
