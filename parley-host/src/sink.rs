//! Reply outbox drained by the host's chat thread.

use std::sync::Arc;

use parley_core::types::{Channel, ParticipantId};
use parley_llm::{Reply, ReplySink};
use tokio::sync::mpsc;

/// A generated line ready to be spoken in game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingChat {
    /// Who says it.
    pub speaker: ParticipantId,
    /// Speaker display name.
    pub speaker_name: String,
    /// Where it is said.
    pub channel: Channel,
    /// The line, flattened to one row of text.
    pub text: String,
}

impl From<Reply> for OutgoingChat {
    fn from(reply: Reply) -> Self {
        Self {
            speaker: reply.participant,
            speaker_name: reply.participant_name,
            channel: reply.context.reply_channel(),
            text: single_line(&reply.text),
        }
    }
}

/// Game chat has no line breaks; collapse every whitespace run to a space.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Receiving end of the reply channel.
#[derive(Debug)]
pub struct ChatOutbox {
    rx: mpsc::UnboundedReceiver<Reply>,
}

impl ChatOutbox {
    /// A connected sink/outbox pair.
    #[must_use]
    pub fn channel() -> (Arc<dyn ReplySink>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(tx), Self { rx })
    }

    /// Take every line that is ready without waiting. For hosts that poll
    /// from their world tick.
    pub fn drain(&mut self) -> Vec<OutgoingChat> {
        let mut out = Vec::new();
        while let Ok(reply) = self.rx.try_recv() {
            out.push(reply.into());
        }
        out
    }

    /// Wait for the next line. `None` once every sink is gone.
    pub async fn recv(&mut self) -> Option<OutgoingChat> {
        self.rx.recv().await.map(Into::into)
    }
}
