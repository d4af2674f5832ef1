//! Message-passing transport for a fixed group of cooperating participants.
//!
//! The group is addressed through the [`Communicator`] trait, which exposes
//! exactly the primitives the row-cyclic inversion needs: point-to-point
//! scalars and buffers, a send-to-many that waits for completion, broadcast,
//! barrier and a logical-AND agreement used to fail the whole group together.
//!
//! Two transports are provided:
//!
//! - [`LocalCluster`] runs every participant as an OS thread in this process,
//!   wired together with FIFO channels. Used by tests and the CLI default.
//! - `MpiCommunicator` (feature `mpi`) maps the primitives onto the MPI world
//!   communicator for real multi-process runs under `mpirun`.
//!
//! [`ClusterContext`] is the explicit, immutable group identity built on top
//! of a communicator and passed to every collective operation.

mod comm;
mod context;
mod local;

#[cfg(feature = "mpi")]
mod mpi;

pub use comm::{CommError, Communicator};
pub use context::{ClusterContext, ContextError, MIN_GROUP_SIZE, ROOT};
pub use local::{LocalCluster, LocalCommunicator};

#[cfg(feature = "mpi")]
pub use self::mpi::MpiCommunicator;
