//! MPI transport for multi-process runs.
//!
//! Requires the `mpi` feature flag and an MPI installation. Launch with
//! `mpirun -n <participants> ...`; every process joins the world
//! communicator.
//!
//! Point-to-point calls use tag `0` and rely on MPI's non-overtaking
//! guarantee between a fixed pair of processes, exactly like the in-process
//! transport.

use ::mpi::collective::SystemOperation;
use ::mpi::datatype::Equivalence;
use ::mpi::environment::Universe;
use ::mpi::topology::SimpleCommunicator;
use ::mpi::traits::*;

use super::comm::{check_peer, CommError, Communicator};

/// MPI-based transport over the world communicator.
///
/// Holds the [`Universe`]; MPI is finalised when this value is dropped.
pub struct MpiCommunicator {
    world: SimpleCommunicator,
    _universe: Universe,
}

impl MpiCommunicator {
    /// Initialise MPI for this process.
    pub fn initialize() -> Result<Self, CommError> {
        let universe = ::mpi::initialize()
            .ok_or_else(|| CommError::Mpi("MPI has already been initialised".into()))?;
        let world = universe.world();
        Ok(Self {
            world,
            _universe: universe,
        })
    }

    fn checked_rank(&self, index: usize) -> Result<i32, CommError> {
        check_peer(index, self.size())?;
        Ok(index as i32)
    }
}

impl Communicator for MpiCommunicator {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn send_scalar(&self, dest: usize, value: u64) -> Result<(), CommError> {
        self.world.process_at_rank(self.checked_rank(dest)?).send(&value);
        Ok(())
    }

    fn recv_scalar(&self, src: usize) -> Result<u64, CommError> {
        let (value, _status) = self
            .world
            .process_at_rank(self.checked_rank(src)?)
            .receive::<u64>();
        Ok(value)
    }

    fn send_buffer(&self, dest: usize, data: &[f64]) -> Result<(), CommError> {
        self.world.process_at_rank(self.checked_rank(dest)?).send(data);
        Ok(())
    }

    fn recv_buffer_into(&self, src: usize, buf: &mut [f64]) -> Result<(), CommError> {
        let status = self
            .world
            .process_at_rank(self.checked_rank(src)?)
            .receive_into(buf);
        let actual = status.count(f64::equivalent_datatype()) as usize;
        if actual != buf.len() {
            return Err(CommError::LengthMismatch {
                peer: src,
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    fn send_all(&self, sends: &[(usize, &[f64])]) -> Result<(), CommError> {
        for (dest, _) in sends {
            check_peer(*dest, self.size())?;
        }
        ::mpi::request::scope(|scope| {
            let requests: Vec<_> = sends
                .iter()
                .map(|(dest, data)| {
                    self.world
                        .process_at_rank(*dest as i32)
                        .immediate_send(scope, *data)
                })
                .collect();
            for request in requests {
                request.wait();
            }
        });
        Ok(())
    }

    fn broadcast(&self, root: usize, buf: &mut [f64]) -> Result<(), CommError> {
        self.world
            .process_at_rank(self.checked_rank(root)?)
            .broadcast_into(buf);
        Ok(())
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.world.barrier();
        Ok(())
    }

    fn all_agree(&self, ok: bool) -> Result<bool, CommError> {
        let local = i32::from(ok);
        let mut global = 0i32;
        self.world
            .all_reduce_into(&local, &mut global, SystemOperation::logical_and());
        Ok(global != 0)
    }
}
