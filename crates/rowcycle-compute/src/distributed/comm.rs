//! The communicator abstraction shared by every transport.

use thiserror::Error;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("Participant {peer} left the group")]
    PeerLost { peer: usize },

    #[error("Buffer length mismatch from participant {peer}: expected {expected}, received {actual}")]
    LengthMismatch {
        peer: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Unexpected message from participant {peer}: expected a {expected}")]
    UnexpectedMessage { peer: usize, expected: &'static str },

    #[error("Invalid participant index {index} for a group of {size}")]
    InvalidPeer { index: usize, size: usize },

    #[error("Participant {index} panicked")]
    Panicked { index: usize },

    #[error("Failed to spawn participant thread: {0}")]
    Spawn(String),

    #[error("MPI error: {0}")]
    Mpi(String),
}

/// Point-to-point and collective primitives over a fixed process group.
///
/// Every collective (`send_all` on the sender side, `broadcast`, `barrier`,
/// `all_agree`) is a synchronisation boundary: a participant blocks until its
/// partners reach the matching call. There are no timeouts. Messages between
/// one ordered pair of participants are delivered in the order they were
/// sent.
///
/// The collectives have default implementations on top of the point-to-point
/// calls, coordinated through participant `0`. Transports with native
/// collectives override them.
pub trait Communicator {
    /// Index of this participant in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of participants in the group.
    fn size(&self) -> usize;

    /// Blocking send of one fixed-size integer.
    fn send_scalar(&self, dest: usize, value: u64) -> Result<(), CommError>;

    /// Blocking receive of one fixed-size integer.
    fn recv_scalar(&self, src: usize) -> Result<u64, CommError>;

    /// Blocking send of a row buffer.
    fn send_buffer(&self, dest: usize, data: &[f64]) -> Result<(), CommError>;

    /// Blocking receive of a row buffer whose length must equal `buf.len()`.
    fn recv_buffer_into(&self, src: usize, buf: &mut [f64]) -> Result<(), CommError>;

    /// Post one send per `(dest, data)` pair without waiting, then wait for
    /// all of them to complete.
    fn send_all(&self, sends: &[(usize, &[f64])]) -> Result<(), CommError> {
        for (dest, data) in sends {
            self.send_buffer(*dest, data)?;
        }
        Ok(())
    }

    /// Replace `buf` on every participant with the contents of `buf` on
    /// `root`.
    fn broadcast(&self, root: usize, buf: &mut [f64]) -> Result<(), CommError> {
        if self.rank() == root {
            for peer in (0..self.size()).filter(|&p| p != root) {
                self.send_buffer(peer, buf)?;
            }
            Ok(())
        } else {
            self.recv_buffer_into(root, buf)
        }
    }

    /// Block until every participant has entered the barrier.
    fn barrier(&self) -> Result<(), CommError> {
        self.all_agree(true).map(|_| ())
    }

    /// Logical AND of `ok` across the group; every participant receives the
    /// same answer.
    fn all_agree(&self, ok: bool) -> Result<bool, CommError> {
        const COORDINATOR: usize = 0;
        if self.rank() == COORDINATOR {
            let mut all = ok;
            for peer in 1..self.size() {
                all &= self.recv_scalar(peer)? != 0;
            }
            for peer in 1..self.size() {
                self.send_scalar(peer, u64::from(all))?;
            }
            Ok(all)
        } else {
            self.send_scalar(COORDINATOR, u64::from(ok))?;
            Ok(self.recv_scalar(COORDINATOR)? != 0)
        }
    }
}

/// Reject peer indices outside the group.
pub(crate) fn check_peer(peer: usize, size: usize) -> Result<(), CommError> {
    if peer < size {
        Ok(())
    } else {
        Err(CommError::InvalidPeer { index: peer, size })
    }
}
