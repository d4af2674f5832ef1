//! The per-participant inversion task bundle.
//!
//! An [`InversionTask`] moves through three states:
//!
//! 1. **Prepared**: the root holds the full source matrix and its identity
//!    augmentation; every other participant holds nothing.
//! 2. **Scattered** (after [`scatter`](crate::redistribute::scatter)): every
//!    participant holds its padded forward and reverse shards plus the shard
//!    geometry. The eliminator mutates the shards in place.
//! 3. Consumed by [`gather`](crate::redistribute::gather), which returns the
//!    reassembled inverse at the root.

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};

use crate::matrix::identity;
use crate::partition::ShardGeometry;

/// Forward and reverse matrices of one participant, plus shard geometry.
#[derive(Debug, Clone)]
pub struct InversionTask {
    /// Source rows, eliminated in place.
    pub(crate) forward: Array2<f64>,
    /// Identity rows, transformed into inverse rows in lockstep.
    pub(crate) reverse: Array2<f64>,
    /// Set by scatter.
    pub(crate) geometry: Option<ShardGeometry>,
}

impl InversionTask {
    /// Task for the root: `matrix` plus an identity augmentation of matching
    /// order.
    ///
    /// Shape validation happens collectively during scatter so that every
    /// participant fails together.
    pub fn root(matrix: Array2<f64>) -> Self {
        let reverse = identity(matrix.nrows());
        Self::with_augmentation(matrix, reverse)
    }

    /// Task for the root with an explicit augmentation matrix.
    pub fn with_augmentation(forward: Array2<f64>, reverse: Array2<f64>) -> Self {
        Self {
            forward,
            reverse,
            geometry: None,
        }
    }

    /// Empty task for a non-root participant; scatter fills it in.
    pub fn participant() -> Self {
        Self {
            forward: Array2::zeros((0, 0)),
            reverse: Array2::zeros((0, 0)),
            geometry: None,
        }
    }

    /// Root task when `matrix` is given, participant task otherwise.
    pub fn from_input(matrix: Option<Array2<f64>>) -> Self {
        match matrix {
            Some(matrix) => Self::root(matrix),
            None => Self::participant(),
        }
    }

    /// Shard geometry, once scattered.
    pub fn geometry(&self) -> Option<ShardGeometry> {
        self.geometry
    }

    pub fn is_scattered(&self) -> bool {
        self.geometry.is_some()
    }

    /// Order of the matrix being inverted, once scattered.
    pub fn order(&self) -> Option<usize> {
        self.geometry.map(|g| g.cols)
    }

    /// Exact number of rows this participant returns during gather.
    pub fn local_rows(&self) -> usize {
        self.geometry.map_or(0, |g| g.exact_rows)
    }

    /// The owned rows of the forward shard (padding excluded).
    pub fn forward_shard(&self) -> ArrayView2<'_, f64> {
        self.forward.slice(s![..self.local_rows(), ..])
    }

    /// The owned rows of the reverse shard (padding excluded).
    pub fn reverse_shard(&self) -> ArrayView2<'_, f64> {
        self.reverse.slice(s![..self.local_rows(), ..])
    }

    /// Mutable owned rows of both shards, for the eliminator.
    pub(crate) fn shards_mut(&mut self) -> (ArrayViewMut2<'_, f64>, ArrayViewMut2<'_, f64>) {
        let rows = self.local_rows();
        (
            self.forward.slice_mut(s![..rows, ..]),
            self.reverse.slice_mut(s![..rows, ..]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_root_task_carries_identity() {
        let task = InversionTask::root(array![[2.0, 1.0], [1.0, 3.0]]);
        assert_eq!(task.reverse, identity(2));
        assert!(!task.is_scattered());
        assert_eq!(task.local_rows(), 0);
        assert_eq!(task.order(), None);
    }

    #[test]
    fn test_shard_views_exclude_padding() {
        let mut task = InversionTask::participant();
        task.forward = Array2::from_elem((3, 4), 1.0);
        task.reverse = Array2::from_elem((3, 4), 2.0);
        task.geometry = Some(ShardGeometry {
            rows: 3,
            cols: 4,
            exact_rows: 2,
        });

        assert_eq!(task.forward_shard().dim(), (2, 4));
        assert_eq!(task.reverse_shard().dim(), (2, 4));
        let (forward, reverse) = task.shards_mut();
        assert_eq!(forward.dim(), (2, 4));
        assert_eq!(reverse.dim(), (2, 4));
        assert_eq!(task.order(), Some(4));
    }
}
