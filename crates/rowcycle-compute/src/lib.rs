//! # Rowcycle Compute
//!
//! Execution and transport layer for the rowcycle workspace. This crate
//! isolates the elimination algorithm in `rowcycle-core` from how bytes move
//! between participants and how arithmetic is spread over local cores.
//!
//! ## Backends
//!
//! | Backend | Feature flag | Purpose |
//! |---------|-------------|---------|
//! | Serial | always | Plain loops inside one participant |
//! | CPU (Rayon) | `cpu` (default) | Thread-pool parallel-for inside one participant |
//! | Local cluster | always | Participants as threads of one process |
//! | MPI | `mpi` | Participants as processes under `mpirun` |

pub mod backend;
pub mod distributed;
pub mod serial;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};
pub use distributed::{
    ClusterContext, CommError, Communicator, ContextError, LocalCluster, LocalCommunicator,
    MIN_GROUP_SIZE, ROOT,
};
pub use serial::SerialBackend;

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;

#[cfg(feature = "mpi")]
pub use distributed::MpiCommunicator;
