//! CPU compute backend using Rayon for shared-memory parallelism.
//!
//! Normalisation is split across columns and elimination across local rows.
//! Rayon's work stealing balances uneven splits (shards whose row count is
//! not a multiple of the worker count), and every parallel region joins
//! before control returns to the caller, so no communication call can
//! overlap with arithmetic.

use ndarray::{ArrayView1, ArrayViewMut1, ArrayViewMut2, Axis, Zip};
use rayon::prelude::*;

use crate::backend::{
    eliminate_kernel, normalize_kernel, BackendType, ComputeBackend, ComputeError, DeviceInfo,
};

/// Rows shorter than this are normalised without forking.
const MIN_PARALLEL_COLUMNS: usize = 256;

/// CPU backend that parallelises work across threads via Rayon.
pub struct CpuBackend {
    /// Dedicated pool, or `None` to run on Rayon's global pool.
    pool: Option<rayon::ThreadPool>,
    num_threads: usize,
}

impl CpuBackend {
    /// Create a new CPU backend on the global Rayon pool.
    pub fn new() -> Self {
        Self {
            pool: None,
            num_threads: rayon::current_num_threads(),
        }
    }

    /// Create a CPU backend with a dedicated pool of `num_threads` workers.
    ///
    /// `0` lets Rayon pick one worker per logical core.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("rowcycle-worker-{i}"))
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        let num_threads = pool.current_num_threads();
        log::debug!("CPU backend: dedicated pool with {num_threads} workers");
        Ok(Self {
            pool: Some(pool),
            num_threads,
        })
    }

    fn install<OP>(&self, op: OP)
    where
        OP: FnOnce() + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn normalize_row(
        &self,
        forward: ArrayViewMut1<'_, f64>,
        reverse: ArrayViewMut1<'_, f64>,
        pivot: f64,
    ) {
        let zip = Zip::from(forward).and(reverse);
        if zip.size() < MIN_PARALLEL_COLUMNS {
            zip.for_each(|f, r| normalize_kernel(f, r, pivot));
            return;
        }
        self.install(|| zip.par_for_each(|f, r| normalize_kernel(f, r, pivot)));
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
        self.install(|| {
            forward
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .zip(reverse.axis_iter_mut(Axis(0)).into_par_iter())
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .for_each(|(_, (f, r))| {
                    eliminate_kernel(f, r, pivot_forward, pivot_reverse, column)
                });
        });
    }
}
