//! Contiguous partitioning plus the three collective primitives the assembler and
//! the weight engine are written against.
//!
//! Rank 0 is the coordinator. All collectives block every participant until the
//! call completes; there are no non-blocking variants.

mod section;
mod serial;
mod thread;

pub use section::{compute_sections, Section};
pub use serial::SerialComm;
pub use thread::{run_threads, ThreadComm};

use crate::error::CollectiveError;

/// Rank that performs merges and creates shared artifacts.
pub const COORDINATOR: usize = 0;

/// Blocking scatter / gather / barrier over a fixed set of ranks.
///
/// Implementations must deliver each message exactly once and keep FIFO order
/// between any ordered pair of ranks.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    #[inline]
    fn is_coordinator(&self) -> bool { self.rank() == COORDINATOR }

    /// Distribute one value per rank from the coordinator.
    /// The coordinator passes `Some(values)` with exactly `size()` entries, other ranks pass `None`.
    fn scatter<T: Send + 'static>(&self, values: Option<Vec<T>>) -> Result<T, CollectiveError>;

    /// Collect one value per rank at the coordinator, in rank order.
    /// Returns `Some` on the coordinator only.
    fn gather<T: Send + 'static>(&self, value: T) -> Result<Option<Vec<T>>, CollectiveError>;

    /// Block until every rank has called `barrier`.
    fn barrier(&self) -> Result<(), CollectiveError>;

    /// Send a copy of the coordinator's value to every rank.
    fn broadcast<T: Clone + Send + 'static>(&self, value: Option<T>) -> Result<T, CollectiveError> {
        let values = if self.is_coordinator() {
            value.map(|value| vec![value; self.size()])
        } else {
            None
        };
        self.scatter(values)
    }
}
