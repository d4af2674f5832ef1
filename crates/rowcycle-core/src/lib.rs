//! # Rowcycle Core
//!
//! Dense matrix inversion by Gauss-Jordan elimination, distributed
//! row-cyclically across a fixed group of participants.
//!
//! ## Pipeline
//!
//! 1. The root holds the source matrix and its identity augmentation in an
//!    [`InversionTask`].
//! 2. [`redistribute::scatter`] hands participant `p` every row `i` with
//!    `i mod size == p`.
//! 3. [`DistributedSolver::invert`] runs `N` broadcast-synchronised pivot
//!    steps that turn each participant's reverse shard into its rows of the
//!    inverse.
//! 4. [`redistribute::gather`] reassembles the inverse at the root.
//!
//! [`invert_distributed`] runs all four collectively, and
//! [`invert_on_local_cluster`] runs them on an in-process group of threads.
//!
//! ## Modules
//!
//! - [`matrix`]: Helpers over `ndarray::Array2<f64>`.
//! - [`partition`]: Row-cyclic shard geometry, extraction and placement.
//! - [`types`]: The per-participant [`InversionTask`].
//! - [`redistribute`]: Scatter and gather.
//! - [`solver`]: Serial reference and distributed eliminator.
//! - [`io`]: Text and binary matrix files.

pub mod io;
pub mod matrix;
pub mod partition;
pub mod redistribute;
pub mod solver;
pub mod types;

mod proptests;

pub use redistribute::{gather, invert_distributed, invert_on_local_cluster, scatter};
pub use solver::{invert_serial, DistributedSolver, SolverError, PIVOT_TOLERANCE};
pub use types::InversionTask;
