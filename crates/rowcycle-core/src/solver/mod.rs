//! Gauss-Jordan inversion: the serial reference and the row-cyclic
//! distributed eliminator.
//!
//! Both solvers run the same pivot-step arithmetic through a
//! [`ComputeBackend`](rowcycle_compute::ComputeBackend), so they agree to
//! rounding on every well-conditioned input. Neither performs row exchanges:
//! a pivot whose magnitude falls below the tolerance aborts the inversion.

pub mod distributed;
pub mod serial;

pub use distributed::DistributedSolver;
pub use serial::{invert_serial, invert_with};

use rowcycle_compute::{CommError, ContextError};
use thiserror::Error;

/// Default smallest pivot magnitude accepted by either solver.
pub const PIVOT_TOLERANCE: f64 = 1e-6;

/// Errors that can occur while preparing, redistributing or inverting a
/// matrix.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Singular pivot at step {step}: |{value:e}| is below tolerance")]
    SingularPivot { step: usize, value: f64 },

    #[error("Pivot tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),

    #[error("Could not allocate {bytes} bytes: {reason}")]
    Resource { bytes: usize, reason: String },

    #[error("Task has not been scattered")]
    NotScattered,

    #[error("The root participant was given no input matrix")]
    MissingInput,

    #[error("Aborted during {phase}: another participant failed")]
    PeerAborted { phase: String },

    #[error("Invalid shard layout: {0}")]
    Layout(&'static str),

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error(transparent)]
    Cluster(#[from] ContextError),
}

/// Accept `tolerance` only when it is finite and non-negative.
pub(crate) fn check_tolerance(tolerance: f64) -> Result<f64, SolverError> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(tolerance)
    } else {
        Err(SolverError::InvalidTolerance(tolerance))
    }
}

impl SolverError {
    /// `true` when this participant only failed because a peer did.
    pub fn is_peer_abort(&self) -> bool {
        matches!(self, SolverError::PeerAborted { .. })
    }
}
