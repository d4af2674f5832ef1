//! Row-cyclic distributed Gauss-Jordan elimination.
//!
//! Pivot step `p` is owned by participant `p mod size`. The owner normalises
//! its pivot row (forward and reverse halves) and broadcasts both halves;
//! then every participant, the owner included, eliminates column `p` from
//! each of its local rows except the pivot row itself. After `N` steps every
//! reverse shard holds its rows of the inverse, still distributed
//! row-cyclically.
//!
//! There are no row exchanges. A pivot whose magnitude is below the
//! tolerance fails the step; nonsingular but ill-conditioned matrices may
//! lose accuracy.
//!
//! Before each broadcast every participant takes part in an agreement round,
//! so a singular pivot on the owner aborts the whole group instead of leaving
//! the others blocked in the broadcast.

use std::sync::Arc;
use std::time::Instant;

use ndarray::{ArrayView1, ArrayViewMut1};
use rowcycle_compute::{ClusterContext, ComputeBackend, SerialBackend};

use super::{check_tolerance, SolverError, PIVOT_TOLERANCE};
use crate::partition::{local_index, owner_of, ShardGeometry};
use crate::redistribute::agree;
use crate::types::InversionTask;

/// The distributed eliminator.
///
/// Holds the intra-participant backend used for the two data-parallel
/// regions of every pivot step, and the pivot tolerance.
#[derive(Clone)]
pub struct DistributedSolver {
    backend: Arc<dyn ComputeBackend>,
    tolerance: f64,
}

impl DistributedSolver {
    pub fn new(backend: Arc<dyn ComputeBackend>) -> Self {
        Self {
            backend,
            tolerance: PIVOT_TOLERANCE,
        }
    }

    /// Override the smallest accepted pivot magnitude. NaN, infinite and
    /// negative values are rejected.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, SolverError> {
        self.tolerance = check_tolerance(tolerance)?;
        Ok(self)
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Transform the scattered shards of `task` in place into the scattered
    /// inverse.
    ///
    /// Collective: every participant of `ctx` must call this with its own
    /// scattered task.
    pub fn invert(
        &self,
        ctx: &ClusterContext,
        task: &mut InversionTask,
    ) -> Result<(), SolverError> {
        let geometry = agree(ctx, check_layout(task), "elimination setup")?;
        let n = geometry.cols;
        let size = ctx.size();
        let me = ctx.index();
        let comm = ctx.comm();

        log::info!(
            "Participant {me}: eliminating {n}x{n} with {} local rows ({})",
            geometry.exact_rows,
            self.backend.device_info().name
        );
        let started = Instant::now();

        let mut pivot_forward = vec![0.0; n];
        let mut pivot_reverse = vec![0.0; n];
        let mut cursor = 0;

        for step in 0..n {
            let owner = owner_of(step, size);
            let owns_pivot = owner == me;
            let (mut forward, mut reverse) = task.shards_mut();

            let local = if owns_pivot {
                debug_assert_eq!(cursor, local_index(step, size));
                let pivot = forward[[cursor, step]];
                if pivot.is_finite() && pivot.abs() >= self.tolerance {
                    Ok(Some(pivot))
                } else {
                    log::warn!("Participant {me}: pivot {pivot:e} at step {step} is singular");
                    Err(SolverError::SingularPivot { step, value: pivot })
                }
            } else {
                Ok(None)
            };
            let pivot = agree(ctx, local, &format!("elimination step {step}"))?;

            if let Some(pivot) = pivot {
                self.backend
                    .normalize_row(forward.row_mut(cursor), reverse.row_mut(cursor), pivot);
                forward[[cursor, step]] = 1.0;
                ArrayViewMut1::from(&mut pivot_forward[..]).assign(&forward.row(cursor));
                ArrayViewMut1::from(&mut pivot_reverse[..]).assign(&reverse.row(cursor));
            }

            comm.broadcast(owner, &mut pivot_forward)?;
            comm.broadcast(owner, &mut pivot_reverse)?;

            let skip = owns_pivot.then_some(cursor);
            log::trace!(
                "Participant {me}: step {step} eliminating {} rows",
                forward.nrows() - usize::from(owns_pivot)
            );
            self.backend.eliminate_rows(
                forward.view_mut(),
                reverse.view_mut(),
                ArrayView1::from(&pivot_forward[..]),
                ArrayView1::from(&pivot_reverse[..]),
                step,
                skip,
            );

            if owns_pivot {
                cursor += 1;
            }
            log::debug!("Participant {me}: step {}/{n} done (owner {owner})", step + 1);
        }

        log::info!(
            "Participant {me}: elimination finished in {:.3?}",
            started.elapsed()
        );
        Ok(())
    }
}

impl Default for DistributedSolver {
    fn default() -> Self {
        Self::new(Arc::new(SerialBackend))
    }
}

impl std::fmt::Debug for DistributedSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedSolver")
            .field("backend", &self.backend.device_info().name)
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

/// The shard buffers must cover the geometry scatter recorded.
fn check_layout(task: &InversionTask) -> Result<ShardGeometry, SolverError> {
    let geometry = task.geometry().ok_or(SolverError::NotScattered)?;
    for shard in [&task.forward, &task.reverse] {
        if shard.ncols() != geometry.cols || shard.nrows() < geometry.exact_rows {
            return Err(SolverError::ShapeMismatch {
                expected: (geometry.rows, geometry.cols),
                found: shard.dim(),
            });
        }
    }
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowcycle_compute::LocalCluster;

    #[test]
    fn test_unscattered_task_fails_everywhere() {
        let results = LocalCluster::new(3)
            .run(|comm| -> Result<(), SolverError> {
                let ctx = ClusterContext::join(comm)?;
                let mut task = if ctx.is_root() {
                    InversionTask::root(ndarray::Array2::eye(3))
                } else {
                    InversionTask::participant()
                };
                DistributedSolver::default().invert(&ctx, &mut task)
            })
            .unwrap();
        for outcome in results {
            assert!(matches!(outcome, Err(SolverError::NotScattered)));
        }
    }

    #[test]
    fn test_builder_sets_tolerance() {
        let solver = DistributedSolver::default().with_tolerance(1e-9).unwrap();
        assert_eq!(solver.tolerance(), 1e-9);
        assert_eq!(solver.backend().device_info().name, "Serial");
        assert_eq!(DistributedSolver::default().with_tolerance(0.0).unwrap().tolerance(), 0.0);
    }

    #[test]
    fn test_builder_rejects_unusable_tolerance() {
        for bad in [f64::NAN, f64::INFINITY, -1.0] {
            assert!(matches!(
                DistributedSolver::default().with_tolerance(bad),
                Err(SolverError::InvalidTolerance(_))
            ));
        }
    }
}
