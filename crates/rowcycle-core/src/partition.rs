//! Row-cyclic partitioning.
//!
//! Global row `i` belongs to participant `i mod size` and sits at local index
//! `i div size` inside that participant's shard. Everything here is a pure
//! function of `(total_rows, size, owner)`, so every participant derives the
//! same geometry from the same inputs without negotiating.

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};

/// Shard dimensions for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardGeometry {
    /// Uniform upper bound on rows per shard, `ceil(total_rows / size)`.
    /// Shard buffers are allocated with this many rows.
    pub rows: usize,
    /// Columns, identical for every shard.
    pub cols: usize,
    /// Rows this participant actually owns; the leading rows of its buffer.
    pub exact_rows: usize,
}

impl ShardGeometry {
    /// Geometry of `owner`'s shard of a `total_rows × cols` matrix.
    pub fn for_owner(total_rows: usize, cols: usize, size: usize, owner: usize) -> Self {
        Self {
            rows: upper_bound_rows(total_rows, size),
            cols,
            exact_rows: shard_row_count(total_rows, size, owner),
        }
    }

    /// Number of meaningful elements in the shard buffer.
    pub fn exact_len(&self) -> usize {
        self.exact_rows * self.cols
    }

    /// Number of elements in the (padded) shard buffer.
    pub fn buffer_len(&self) -> usize {
        self.rows * self.cols
    }
}

/// `ceil(total_rows / size)`.
///
/// # Panics
/// Panics if `size` is zero.
pub fn upper_bound_rows(total_rows: usize, size: usize) -> usize {
    assert!(size > 0, "Group size must be positive");
    total_rows.div_ceil(size)
}

/// Rows assigned to `owner`.
///
/// For `total_rows = size * k + r`, owners `[0, r)` hold `k + 1` rows and
/// owners `[r, size)` hold `k`.
///
/// # Panics
/// Panics if `size` is zero.
pub fn shard_row_count(total_rows: usize, size: usize, owner: usize) -> usize {
    assert!(size > 0, "Group size must be positive");
    total_rows / size + usize::from(owner < total_rows % size)
}

/// Participant owning global row `row`.
pub fn owner_of(row: usize, size: usize) -> usize {
    row % size
}

/// Position of global row `row` inside its owner's shard.
pub fn local_index(row: usize, size: usize) -> usize {
    row / size
}

/// Global index of local row `local` of `owner`'s shard.
pub fn global_index(local: usize, owner: usize, size: usize) -> usize {
    owner + local * size
}

/// Copy of every row `i` with `i mod size == owner`, in ascending order.
pub fn extract_shard(matrix: ArrayView2<'_, f64>, owner: usize, size: usize) -> Array2<f64> {
    let rows = shard_row_count(matrix.nrows(), size, owner);
    let mut shard = Array2::zeros((rows, matrix.ncols()));
    copy_strided_rows(matrix, owner, size, shard.view_mut());
    shard
}

/// Copy `owner`'s rows of `matrix` into the leading rows of `dest`.
///
/// `dest` may be taller than the shard (a padded buffer); the extra rows are
/// left untouched.
pub(crate) fn copy_strided_rows(
    matrix: ArrayView2<'_, f64>,
    owner: usize,
    size: usize,
    mut dest: ArrayViewMut2<'_, f64>,
) {
    if owner >= matrix.nrows() {
        return;
    }
    let strided = matrix.slice(s![owner..;size, ..]);
    dest.slice_mut(s![..strided.nrows(), ..]).assign(&strided);
}

/// Write the rows of `shard` back into `dest` at `owner`'s strided positions.
///
/// Only the rows `owner` actually holds in `dest` are written; padding rows
/// at the end of `shard` are ignored.
///
/// # Panics
/// Panics if the column counts differ or `shard` holds fewer rows than the
/// owner's share of `dest`.
pub fn place_shard(
    dest: &mut Array2<f64>,
    shard: ArrayView2<'_, f64>,
    owner: usize,
    size: usize,
) {
    assert_eq!(dest.ncols(), shard.ncols(), "Column count must match");
    let rows = shard_row_count(dest.nrows(), size, owner);
    if rows == 0 {
        return;
    }
    dest.slice_mut(s![owner..;size, ..])
        .assign(&shard.slice(s![..rows, ..]));
}
