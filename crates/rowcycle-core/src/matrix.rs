//! Dense matrix helpers over [`ndarray::Array2<f64>`].
//!
//! The matrix type itself is `Array2<f64>`: row-major, contiguous, owned by
//! whichever component produced it last. This module adds the handful of
//! operations the inversion pipeline and its tests rely on.

use ndarray::{Array2, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::solver::SolverError;

/// Absolute per-element tolerance of [`approx_eq`].
pub const EQ_TOLERANCE: f64 = 1e-6;

/// The `n × n` identity matrix.
pub fn identity(n: usize) -> Array2<f64> {
    Array2::eye(n)
}

/// Element-wise comparison within [`EQ_TOLERANCE`].
///
/// Matrices of different shapes are never equal.
pub fn approx_eq(left: ArrayView2<'_, f64>, right: ArrayView2<'_, f64>) -> bool {
    left.dim() == right.dim()
        && left
            .iter()
            .zip(right.iter())
            .all(|(a, b)| (a - b).abs() <= EQ_TOLERANCE)
}

/// Largest absolute element-wise difference, or `None` on shape mismatch.
pub fn max_abs_diff(left: ArrayView2<'_, f64>, right: ArrayView2<'_, f64>) -> Option<f64> {
    if left.dim() != right.dim() {
        return None;
    }
    Some(
        left.iter()
            .zip(right.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max),
    )
}

/// Owned transpose: element `[i][j]` of the input lands at `[j][i]`.
pub fn transpose(matrix: ArrayView2<'_, f64>) -> Array2<f64> {
    let (rows, cols) = matrix.dim();
    Array2::from_shape_fn((cols, rows), |(i, j)| matrix[[j, i]])
}

/// Matrix product with dimension checking.
pub fn dot(
    left: ArrayView2<'_, f64>,
    right: ArrayView2<'_, f64>,
) -> Result<Array2<f64>, SolverError> {
    if left.ncols() != right.nrows() {
        return Err(SolverError::ShapeMismatch {
            expected: (left.ncols(), right.ncols()),
            found: right.dim(),
        });
    }
    Ok(left.dot(&right))
}

/// Size in bytes of the binary file representation: two dimension words
/// followed by the payload.
pub fn byte_size(matrix: ArrayView2<'_, f64>) -> usize {
    2 * std::mem::size_of::<u64>() + matrix.len() * std::mem::size_of::<f64>()
}

/// Matrix with entries drawn uniformly from `[0, 1)`, reproducible from
/// `seed`.
pub fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((rows, cols), || rng.gen_range(0.0..1.0))
}

/// Random strictly diagonally dominant `n × n` matrix.
///
/// Strict diagonal dominance survives every step of Gauss-Jordan elimination,
/// so these matrices never hit a near-zero pivot without row exchanges.
pub fn diagonally_dominant(n: usize, seed: u64) -> Array2<f64> {
    let mut matrix = random_matrix(n, n, seed);
    for i in 0..n {
        let off_diagonal: f64 = matrix.row(i).iter().map(|v| v.abs()).sum::<f64>()
            - matrix[[i, i]].abs();
        matrix[[i, i]] = off_diagonal + 1.0 + matrix[[i, i]];
    }
    matrix
}

/// Zero-filled matrix whose allocation failure is reported instead of
/// aborting the process.
pub(crate) fn try_zeros(rows: usize, cols: usize) -> Result<Array2<f64>, SolverError> {
    let len = rows.checked_mul(cols).ok_or(SolverError::Resource {
        bytes: usize::MAX,
        reason: format!("{rows}x{cols} elements overflow the address space"),
    })?;
    let mut data: Vec<f64> = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| SolverError::Resource {
            bytes: len.saturating_mul(std::mem::size_of::<f64>()),
            reason: e.to_string(),
        })?;
    data.resize(len, 0.0);
    Array2::from_shape_vec((rows, cols), data).map_err(|e| SolverError::Resource {
        bytes: len.saturating_mul(std::mem::size_of::<f64>()),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_transpose_swaps_indices() {
        let m = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let t = transpose(m.view());
        assert_eq!(t, array![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]);
        assert_eq!(transpose(t.view()), m);
    }

    #[test]
    fn test_approx_eq_tolerance_and_shape() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let mut b = a.clone();
        b[[1, 1]] += 5e-7;
        assert!(approx_eq(a.view(), b.view()));
        b[[1, 1]] += 1e-5;
        assert!(!approx_eq(a.view(), b.view()));
        assert!(!approx_eq(a.view(), identity(3).view()));
    }

    #[test]
    fn test_dot_rejects_incompatible_shapes() {
        let a = random_matrix(2, 3, 1);
        let b = random_matrix(2, 3, 2);
        assert!(matches!(
            dot(a.view(), b.view()),
            Err(SolverError::ShapeMismatch { .. })
        ));
        assert_eq!(dot(a.view(), transpose(b.view()).view()).unwrap().dim(), (2, 2));
    }

    #[test]
    fn test_random_matrix_is_reproducible() {
        let a = random_matrix(4, 5, 42);
        let b = random_matrix(4, 5, 42);
        assert_eq!(a, b);
        assert!(a.iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_diagonally_dominant_rows() {
        let m = diagonally_dominant(6, 7);
        for i in 0..6 {
            let off: f64 = (0..6).filter(|&j| j != i).map(|j| m[[i, j]].abs()).sum();
            assert!(m[[i, i]].abs() > off);
        }
    }

    #[test]
    fn test_byte_size_counts_header() {
        let m = Array2::<f64>::zeros((3, 4));
        assert_eq!(byte_size(m.view()), 16 + 96);
    }

    #[test]
    fn test_try_zeros_reports_overflow() {
        assert!(matches!(
            try_zeros(usize::MAX, 2),
            Err(SolverError::Resource { .. })
        ));
        assert_eq!(try_zeros(2, 3).unwrap(), Array2::<f64>::zeros((2, 3)));
    }
}
