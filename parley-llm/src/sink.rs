//! Where completed replies go.

use tokio::sync::mpsc;
use tracing::debug;

use crate::types::Reply;

/// Receives replies as queries complete.
///
/// Called from the dispatch task; implementations must not block. The host
/// typically forwards into a channel drained on its own thread.
pub trait ReplySink: Send + Sync {
    /// Hand over one reply.
    fn deliver(&self, reply: Reply);
}

impl ReplySink for mpsc::UnboundedSender<Reply> {
    fn deliver(&self, reply: Reply) {
        if self.send(reply).is_err() {
            debug!("Reply receiver dropped; discarding reply");
        }
    }
}

/// Discards every reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReplySink for NullSink {
    fn deliver(&self, _reply: Reply) {}
}
