//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over how one participant executes
//! the arithmetic of a pivot step (plain loops or a local thread pool) so
//! that the elimination algorithm in `rowcycle-core` is written once.
//!
//! Each pivot step has exactly two data-parallel regions:
//!
//! - **Normalisation** of the pivot row, partitioned by column.
//! - **Elimination** of every other local row, partitioned by row.
//!
//! Both regions touch disjoint elements per worker, so implementations need
//! no locking beyond the join at the end of the region.

use ndarray::{ArrayView1, ArrayViewMut1, ArrayViewMut2};
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Serial,
    Cpu,
}

/// Abstraction over intra-process execution strategies.
///
/// Implementations must compute every element with the same expression as
/// [`normalize_kernel`] and [`eliminate_kernel`] so that serial and parallel
/// runs agree bit for bit.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Divide every element of the forward and reverse pivot rows by `pivot`.
    fn normalize_row(
        &self,
        forward: ArrayViewMut1<'_, f64>,
        reverse: ArrayViewMut1<'_, f64>,
        pivot: f64,
    );

    /// Eliminate `column` from every row of the local shard except `skip`.
    ///
    /// For each row `i`, `factor = forward[i][column] / pivot_forward[column]`
    /// and the scaled pivot rows are subtracted from `forward[i]` and
    /// `reverse[i]`.
    fn eliminate_rows(
        &self,
        forward: ArrayViewMut2<'_, f64>,
        reverse: ArrayViewMut2<'_, f64>,
        pivot_forward: ArrayView1<'_, f64>,
        pivot_reverse: ArrayView1<'_, f64>,
        column: usize,
        skip: Option<usize>,
    );
}

/// Normalise one element pair.
#[inline]
pub fn normalize_kernel(forward: &mut f64, reverse: &mut f64, pivot: f64) {
    *forward /= pivot;
    *reverse /= pivot;
}

/// Eliminate `column` from a single row pair.
#[inline]
pub fn eliminate_kernel(
    mut forward: ArrayViewMut1<'_, f64>,
    mut reverse: ArrayViewMut1<'_, f64>,
    pivot_forward: ArrayView1<'_, f64>,
    pivot_reverse: ArrayView1<'_, f64>,
    column: usize,
) {
    let factor = forward[column] / pivot_forward[column];
    forward.scaled_add(-factor, &pivot_forward);
    reverse.scaled_add(-factor, &pivot_reverse);
}
