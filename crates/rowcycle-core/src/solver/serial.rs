//! Single-process Gauss-Jordan inversion.
//!
//! Used as the reference the distributed eliminator is checked against, and
//! by the CLI when only one participant is requested.

use ndarray::{Array2, ArrayView2};
use rowcycle_compute::{ComputeBackend, SerialBackend};

use super::{check_tolerance, SolverError, PIVOT_TOLERANCE};
use crate::matrix::identity;

/// Invert `matrix` with plain loops and the default pivot tolerance.
pub fn invert_serial(matrix: ArrayView2<'_, f64>) -> Result<Array2<f64>, SolverError> {
    invert_with(matrix, &SerialBackend, PIVOT_TOLERANCE)
}

/// Invert `matrix` with the given backend and pivot tolerance.
///
/// The input is left untouched; the reduction runs on a copy.
pub fn invert_with(
    matrix: ArrayView2<'_, f64>,
    backend: &dyn ComputeBackend,
    tolerance: f64,
) -> Result<Array2<f64>, SolverError> {
    let tolerance = check_tolerance(tolerance)?;
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(SolverError::NotSquare { rows, cols });
    }
    let n = rows;
    let mut forward = matrix.to_owned();
    let mut reverse = identity(n);

    for step in 0..n {
        let pivot = forward[[step, step]];
        if !pivot.is_finite() || pivot.abs() < tolerance {
            log::warn!("Serial inversion: singular pivot {pivot:e} at step {step}");
            return Err(SolverError::SingularPivot { step, value: pivot });
        }

        backend.normalize_row(forward.row_mut(step), reverse.row_mut(step), pivot);
        forward[[step, step]] = 1.0;

        let pivot_forward = forward.row(step).to_owned();
        let pivot_reverse = reverse.row(step).to_owned();
        backend.eliminate_rows(
            forward.view_mut(),
            reverse.view_mut(),
            pivot_forward.view(),
            pivot_reverse.view(),
            step,
            Some(step),
        );
    }

    Ok(reverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{approx_eq, diagonally_dominant, dot};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_two_by_two_inverse() {
        let a = array![[4.0, 7.0], [2.0, 6.0]];
        let inv = invert_serial(a.view()).unwrap();
        let expected = array![[0.6, -0.7], [-0.2, 0.4]];
        for (x, y) in inv.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_product_with_inverse_is_identity() {
        let a = diagonally_dominant(12, 3);
        let inv = invert_serial(a.view()).unwrap();
        let product = dot(a.view(), inv.view()).unwrap();
        assert!(approx_eq(product.view(), identity(12).view()));
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        match invert_serial(a.view()) {
            Err(SolverError::SingularPivot { step, value }) => {
                assert_eq!(step, 1);
                assert_abs_diff_eq!(value, 0.0, epsilon = 1e-12);
            }
            other => panic!("expected a singular pivot, got {other:?}"),
        }
    }

    #[test]
    fn test_non_square_is_rejected() {
        let a = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            invert_serial(a.view()),
            Err(SolverError::NotSquare { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn test_nan_tolerance_does_not_admit_zero_pivot() {
        let a = array![[0.0, 1.0], [1.0, 0.0]];
        for tolerance in [f64::NAN, -1e-6] {
            assert!(matches!(
                invert_with(a.view(), &SerialBackend, tolerance),
                Err(SolverError::InvalidTolerance(_))
            ));
        }
    }

    #[test]
    fn test_empty_matrix_inverts_to_empty() {
        let a = Array2::<f64>::zeros((0, 0));
        assert_eq!(invert_serial(a.view()).unwrap().dim(), (0, 0));
    }
}
