//! In-process cluster: one OS thread per participant.
//!
//! Every ordered pair of participants gets its own unbounded FIFO channel, so
//! sends never block and messages between two participants cannot overtake
//! each other. A participant that exits (or panics) drops its channel ends;
//! its peers then observe [`CommError::PeerLost`] instead of blocking forever.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::comm::{check_peer, CommError, Communicator};

/// Wire format of the in-process transport.
#[derive(Debug)]
enum Message {
    Scalar(u64),
    Buffer(Vec<f64>),
}

/// One participant's endpoint of a [`LocalCluster`].
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    /// `outboxes[dest]`, `None` at `rank`.
    outboxes: Vec<Option<Sender<Message>>>,
    /// `inboxes[src]`, `None` at `rank`.
    inboxes: Vec<Option<Receiver<Message>>>,
}

impl LocalCommunicator {
    fn outbox(&self, dest: usize) -> Result<&Sender<Message>, CommError> {
        check_peer(dest, self.size)?;
        self.outboxes[dest].as_ref().ok_or(CommError::InvalidPeer {
            index: dest,
            size: self.size,
        })
    }

    fn inbox(&self, src: usize) -> Result<&Receiver<Message>, CommError> {
        check_peer(src, self.size)?;
        self.inboxes[src].as_ref().ok_or(CommError::InvalidPeer {
            index: src,
            size: self.size,
        })
    }

    fn post(&self, dest: usize, message: Message) -> Result<(), CommError> {
        self.outbox(dest)?
            .send(message)
            .map_err(|_| CommError::PeerLost { peer: dest })
    }

    fn take(&self, src: usize) -> Result<Message, CommError> {
        self.inbox(src)?
            .recv()
            .map_err(|_| CommError::PeerLost { peer: src })
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_scalar(&self, dest: usize, value: u64) -> Result<(), CommError> {
        self.post(dest, Message::Scalar(value))
    }

    fn recv_scalar(&self, src: usize) -> Result<u64, CommError> {
        match self.take(src)? {
            Message::Scalar(value) => Ok(value),
            Message::Buffer(_) => Err(CommError::UnexpectedMessage {
                peer: src,
                expected: "scalar",
            }),
        }
    }

    fn send_buffer(&self, dest: usize, data: &[f64]) -> Result<(), CommError> {
        self.post(dest, Message::Buffer(data.to_vec()))
    }

    fn recv_buffer_into(&self, src: usize, buf: &mut [f64]) -> Result<(), CommError> {
        match self.take(src)? {
            Message::Buffer(data) if data.len() == buf.len() => {
                buf.copy_from_slice(&data);
                Ok(())
            }
            Message::Buffer(data) => Err(CommError::LengthMismatch {
                peer: src,
                expected: buf.len(),
                actual: data.len(),
            }),
            Message::Scalar(_) => Err(CommError::UnexpectedMessage {
                peer: src,
                expected: "buffer",
            }),
        }
    }
}

/// A fixed group of participants running as threads of this process.
#[derive(Debug, Clone, Copy)]
pub struct LocalCluster {
    size: usize,
}

impl LocalCluster {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Build the fully connected set of endpoints, indexed by rank.
    pub fn communicators(&self) -> Vec<LocalCommunicator> {
        let n = self.size;
        let mut outboxes: Vec<Vec<Option<Sender<Message>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<Receiver<Message>>>> =
            (0..n).map(|_| (0..n).map(|_| None).collect()).collect();

        for src in 0..n {
            for dest in (0..n).filter(|&d| d != src) {
                let (tx, rx) = unbounded();
                outboxes[src][dest] = Some(tx);
                inboxes[dest][src] = Some(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalCommunicator {
                rank,
                size: n,
                outboxes,
                inboxes,
            })
            .collect()
    }

    /// Run `participant` once per rank, each on its own thread, and return
    /// the results in rank order once every participant has finished.
    pub fn run<F, T>(&self, participant: F) -> Result<Vec<T>, CommError>
    where
        F: Fn(LocalCommunicator) -> T + Sync,
        T: Send,
    {
        log::debug!("Local cluster: starting {} participants", self.size);
        let participant = &participant;
        std::thread::scope(|scope| -> Result<Vec<T>, CommError> {
            let mut handles = Vec::with_capacity(self.size);
            for comm in self.communicators() {
                let handle = std::thread::Builder::new()
                    .name(format!("participant-{}", comm.rank()))
                    .spawn_scoped(scope, move || participant(comm))
                    .map_err(|e| CommError::Spawn(e.to_string()))?;
                handles.push(handle);
            }

            handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| {
                    handle.join().map_err(|_| {
                        log::error!("Participant {index} panicked");
                        CommError::Panicked { index }
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .collect()
        })
    }
}
