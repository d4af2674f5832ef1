//! Single-threaded compute backend.

use ndarray::{ArrayView1, ArrayViewMut1, ArrayViewMut2, Axis, Zip};

use crate::backend::{
    eliminate_kernel, normalize_kernel, BackendType, ComputeBackend, DeviceInfo,
};

/// Backend that runs both pivot-step regions as plain loops.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl SerialBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for SerialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Serial".into(),
            backend_type: BackendType::Serial,
            compute_units: Some(1),
        }
    }

    fn normalize_row(
        &self,
        forward: ArrayViewMut1<'_, f64>,
        reverse: ArrayViewMut1<'_, f64>,
        pivot: f64,
    ) {
        Zip::from(forward)
            .and(reverse)
            .for_each(|f, r| normalize_kernel(f, r, pivot));
    }

    fn eliminate_rows(
        &self,
        mut forward: ArrayViewMut2<'_, f64>,
        mut reverse: ArrayViewMut2<'_, f64>,
        pivot_forward: ArrayView1<'_, f64>,
        pivot_reverse: ArrayView1<'_, f64>,
        column: usize,
        skip: Option<usize>,
    ) {
        let rows = forward
            .axis_iter_mut(Axis(0))
            .zip(reverse.axis_iter_mut(Axis(0)))
            .enumerate();
        for (i, (f, r)) in rows {
            if Some(i) == skip {
                continue;
            }
            eliminate_kernel(f, r, pivot_forward, pivot_reverse, column);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_normalize_divides_both_rows() {
        let mut forward = array![2.0, 4.0, 8.0];
        let mut reverse = array![1.0, 0.0, -2.0];
        SerialBackend.normalize_row(forward.view_mut(), reverse.view_mut(), 2.0);
        assert_eq!(forward, array![1.0, 2.0, 4.0]);
        assert_eq!(reverse, array![0.5, 0.0, -1.0]);
    }

    #[test]
    fn test_eliminate_skips_pivot_row() {
        let mut forward = array![[1.0, 2.0], [3.0, 4.0]];
        let mut reverse = array![[1.0, 0.0], [0.0, 1.0]];
        let pivot_forward: Array1<f64> = forward.row(0).to_owned();
        let pivot_reverse: Array1<f64> = reverse.row(0).to_owned();

        SerialBackend.eliminate_rows(
            forward.view_mut(),
            reverse.view_mut(),
            pivot_forward.view(),
            pivot_reverse.view(),
            0,
            Some(0),
        );

        // Row 0 untouched, row 1 has its first column cleared.
        assert_eq!(forward.row(0), array![1.0, 2.0]);
        assert_abs_diff_eq!(forward[[1, 0]], 0.0);
        assert_abs_diff_eq!(forward[[1, 1]], -2.0);
        assert_abs_diff_eq!(reverse[[1, 0]], -3.0);
        assert_abs_diff_eq!(reverse[[1, 1]], 1.0);
    }
}
