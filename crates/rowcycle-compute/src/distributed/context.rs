//! Process-group identity and lifecycle.

use thiserror::Error;

use super::comm::{CommError, Communicator};

/// Index of the participant that owns the full matrices.
pub const ROOT: usize = 0;

/// Elimination needs at least one participant besides the pivot owner.
pub const MIN_GROUP_SIZE: usize = 2;

/// Errors while joining or leaving the group.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Group too small: {size} participant(s), at least {MIN_GROUP_SIZE} required")]
    GroupTooSmall { size: usize },

    #[error(transparent)]
    Comm(#[from] CommError),
}

/// Immutable identity of this participant within the group.
///
/// Constructed once per participant by [`join`](Self::join) and passed by
/// reference to every collective operation. [`leave`](Self::leave) consumes
/// the context, so it can run at most once.
pub struct ClusterContext {
    index: usize,
    size: usize,
    root: usize,
    comm: Box<dyn Communicator>,
}

impl ClusterContext {
    /// Join the group reachable through `comm`.
    pub fn join<C>(comm: C) -> Result<Self, ContextError>
    where
        C: Communicator + 'static,
    {
        let index = comm.rank();
        let size = comm.size();
        if size < MIN_GROUP_SIZE {
            log::error!("Cannot join: group of {size} is too small");
            return Err(ContextError::GroupTooSmall { size });
        }
        log::info!("Participant {index} of {size} joined (root = {ROOT})");
        Ok(Self {
            index,
            size,
            root: ROOT,
            comm: Box::new(comm),
        })
    }

    /// Initialise MPI and join the world communicator.
    #[cfg(feature = "mpi")]
    pub fn join_mpi() -> Result<Self, ContextError> {
        let comm = super::MpiCommunicator::initialize()?;
        Self::join(comm)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn is_root(&self) -> bool {
        self.index == self.root
    }

    /// The transport used by collective operations.
    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    /// Wait for every participant, then release the transport.
    ///
    /// Must only be called after all collective operations have completed.
    pub fn leave(self) -> Result<(), ContextError> {
        self.comm.barrier()?;
        log::info!("Participant {} of {} left", self.index, self.size);
        Ok(())
    }
}

impl std::fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterContext")
            .field("index", &self.index)
            .field("size", &self.size)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::LocalCluster;

    #[test]
    fn test_join_reports_identity() {
        let results = LocalCluster::new(3)
            .run(|comm| {
                let ctx = ClusterContext::join(comm)?;
                let identity = (ctx.index(), ctx.size(), ctx.root(), ctx.is_root());
                ctx.leave()?;
                Ok::<_, ContextError>(identity)
            })
            .unwrap();

        for (rank, identity) in results.into_iter().enumerate() {
            assert_eq!(identity.unwrap(), (rank, 3, ROOT, rank == ROOT));
        }
    }

    #[test]
    fn test_single_participant_is_rejected() {
        let results = LocalCluster::new(1)
            .run(|comm| ClusterContext::join(comm).map(|_| ()))
            .unwrap();
        assert!(matches!(
            results[0],
            Err(ContextError::GroupTooSmall { size: 1 })
        ));
    }
}
