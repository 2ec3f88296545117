use tracing::{info_span, Span};

use crate::comm::Communicator;

/// Per-rank run state threaded through every component call: the communicator
/// (rank id and collectives), the run configuration, and the log span that tags
/// every record with the rank.
pub struct Context<'a, C, K> {
    comm: &'a C,
    config: &'a K,
    span: Span,
}

impl<'a, C: Communicator, K> Context<'a, C, K> {
    pub fn new(comm: &'a C, config: &'a K) -> Self {
        let span = info_span!("rank", rank = comm.rank(), size = comm.size());
        Self { comm, config, span }
    }

    #[inline] pub fn comm(&self) -> &'a C { self.comm }

    #[inline] pub fn config(&self) -> &'a K { self.config }

    #[inline] pub fn span(&self) -> &Span { &self.span }

    #[inline] pub fn rank(&self) -> usize { self.comm.rank() }

    #[inline] pub fn size(&self) -> usize { self.comm.size() }

    #[inline] pub fn is_coordinator(&self) -> bool { self.comm.is_coordinator() }
}
