//! In-process SPMD runtime: one OS thread per rank, one FIFO channel per ordered
//! rank pair.
//!
//! A rank that returns (or panics) drops its channel endpoints. Any peer that is
//! blocked on it, or later tries to talk to it, sees `PeerDisconnected` and
//! aborts in turn, so a failure anywhere tears the whole run down instead of
//! leaving peers blocked forever.

use std::{
    any::Any,
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use tracing::debug;

use crate::error::{CollectiveError, ConfigurationError, Error, Result};

use super::{Communicator, COORDINATOR};

type Message = Box<dyn Any + Send>;

/// Thread-backed communicator for one rank.
pub struct ThreadComm {
    rank: usize,
    size: usize,
    outbox: Vec<Sender<Message>>,   // indexed by destination rank
    inbox: Vec<Receiver<Message>>,  // indexed by source rank
}

impl ThreadComm {
    /// Create the fully connected communicators of a `size`-rank world, in rank order.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let mut outboxes: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Option<Receiver<Message>>>> = (0..size)
            .map(|_| (0..size).map(|_| None).collect())
            .collect();

        for (src, outbox) in outboxes.iter_mut().enumerate() {
            for inbox in inboxes.iter_mut() {
                let (tx, rx) = mpsc::channel();
                outbox.push(tx);
                inbox[src] = Some(rx);
            }
        }

        outboxes.into_iter().zip(inboxes).enumerate()
            .map(|(rank, (outbox, inbox))| ThreadComm {
                rank,
                size,
                outbox,
                inbox: inbox.into_iter().flatten().collect(),
            })
            .collect()
    }

    fn send<T: Send + 'static>(&self, peer: usize, value: T) -> Result<(), CollectiveError> {
        self.outbox[peer].send(Box::new(value))
            .map_err(|_| CollectiveError::PeerDisconnected { peer })
    }

    fn recv<T: 'static>(&self, peer: usize) -> Result<T, CollectiveError> {
        let message = self.inbox[peer].recv()
            .map_err(|_| CollectiveError::PeerDisconnected { peer })?;
        message.downcast::<T>()
            .map(|value| *value)
            .map_err(|_| CollectiveError::TypeMismatch { peer })
    }
}

impl Communicator for ThreadComm {
    #[inline] fn rank(&self) -> usize { self.rank }

    #[inline] fn size(&self) -> usize { self.size }

    fn scatter<T: Send + 'static>(&self, values: Option<Vec<T>>) -> Result<T, CollectiveError> {
        if !self.is_coordinator() {
            return self.recv(COORDINATOR);
        }

        let values = values.unwrap_or_default();
        if values.len() != self.size {
            return Err(CollectiveError::ScatterLength { expected: self.size, found: values.len() });
        }

        let mut values = values.into_iter();
        let own = values.next().ok_or(CollectiveError::ScatterLength { expected: self.size, found: 0 })?;
        for (peer, value) in values.enumerate() {
            self.send(peer + 1, value)?;
        }
        Ok(own)
    }

    fn gather<T: Send + 'static>(&self, value: T) -> Result<Option<Vec<T>>, CollectiveError> {
        if !self.is_coordinator() {
            self.send(COORDINATOR, value)?;
            return Ok(None);
        }

        let mut gathered = Vec::with_capacity(self.size);
        gathered.push(value);
        for peer in 1..self.size {
            gathered.push(self.recv(peer)?);
        }
        Ok(Some(gathered))
    }

    fn barrier(&self) -> Result<(), CollectiveError> {
        self.gather(())?;
        let release = self.is_coordinator().then(|| vec![(); self.size]);
        self.scatter(release)
    }
}

/// Run `f` once per rank on `size` scoped threads and collect the results in rank order.
///
/// If any rank fails, the root cause is returned: the first error (by rank) that
/// is not a mere peer disconnection, otherwise the first disconnection.
pub fn run_threads<T, F>(size: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(ThreadComm) -> Result<T> + Sync,
{
    if size == 0 {
        return Err(ConfigurationError::NoWorkers.into());
    }
    debug!(size, "starting thread ranks");

    let results: Vec<Result<T>> = thread::scope(|scope| {
        let f = &f;
        let handles = ThreadComm::world(size).into_iter()
            .map(|comm| {
                let rank = comm.rank();
                (rank, scope.spawn(move || f(comm)))
            })
            .collect::<Vec<_>>();

        handles.into_iter()
            .map(|(rank, handle)| handle.join().unwrap_or(Err(Error::RankPanicked { rank })))
            .collect()
    });

    let mut values = Vec::with_capacity(size);
    let mut secondary = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) if err.is_secondary() => { secondary.get_or_insert(err); }
            Err(err) => return Err(err),
        }
    }
    match secondary {
        Some(err) => Err(err),
        None => Ok(values),
    }
}
