//! Core type definitions shared by the trigger policy and the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Identifier of a participant (real player or simulated bot) as the host
/// stores it: a 64-bit character GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a dispatched query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub Uuid);

impl QueryId {
    /// Create a new random query ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A 3D position in the game world.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl Location {
    /// Create a location from its coordinates.
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// The chat channel a message was sent on. Each maps to its own
/// proximity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Local speech.
    Say,
    /// Shouted speech, heard further away.
    Yell,
    /// Zone-wide general channel.
    General,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Say => "say",
            Self::Yell => "yell",
            Self::General => "general",
        };
        f.write_str(name)
    }
}

/// Who originated a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderKind {
    /// A real, human-controlled player.
    Player,
    /// A simulated player.
    Bot,
}

/// A participant visible to the policy engine at evaluation time.
///
/// The host takes this snapshot from its world state; the core never
/// queries the world itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Character GUID.
    pub id: ParticipantId,
    /// Display name, used when rendering prompts.
    pub name: String,
    /// Current world position.
    pub position: Location,
    /// Whether this participant is simulated (eligible to respond).
    pub is_bot: bool,
}

impl Participant {
    /// A simulated participant.
    #[must_use]
    pub fn bot(id: u64, name: impl Into<String>, position: Location) -> Self {
        Self {
            id: ParticipantId(id),
            name: name.into(),
            position,
            is_bot: true,
        }
    }

    /// A real player.
    #[must_use]
    pub fn player(id: u64, name: impl Into<String>, position: Location) -> Self {
        Self {
            id: ParticipantId(id),
            name: name.into(),
            position,
            is_bot: false,
        }
    }
}

/// An incoming chat message that may trigger generated replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Who sent the message.
    pub sender: ParticipantId,
    /// Sender display name.
    pub sender_name: String,
    /// Player- or bot-originated.
    pub sender_kind: SenderKind,
    /// Raw message text.
    pub message: String,
    /// Channel the message was sent on.
    pub channel: Channel,
    /// Sender position when the message was sent.
    pub position: Location,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Why a query was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryContext {
    /// Reply to a chat message.
    Reply {
        /// Channel the reply should go back on.
        channel: Channel,
        /// Who the responder is answering.
        sender: ParticipantId,
    },
    /// Unprompted ambient comment.
    Ambient,
}

impl QueryContext {
    /// Channel the generated text should be delivered on.
    #[must_use]
    pub fn reply_channel(&self) -> Channel {
        match self {
            Self::Reply { channel, .. } => *channel,
            Self::Ambient => Channel::Say,
        }
    }
}

/// A fully built request awaiting dispatch to the backend.
///
/// Created by the trigger policy, owned by the query manager until it
/// completes or fails, then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingQuery {
    /// Unique ID.
    pub id: QueryId,
    /// The participant that will speak the generated text.
    pub participant: ParticipantId,
    /// Responder display name.
    pub participant_name: String,
    /// Rendered prompt, persona included.
    pub prompt: String,
    /// What this query answers.
    pub context: QueryContext,
    /// When the query was built.
    pub created_at: DateTime<Utc>,
}

impl PendingQuery {
    /// Build a query stamped with a fresh ID and the current time.
    #[must_use]
    pub fn new(
        participant: &Participant,
        prompt: impl Into<String>,
        context: QueryContext,
    ) -> Self {
        Self {
            id: QueryId::new(),
            participant: participant.id,
            participant_name: participant.name.clone(),
            prompt: prompt.into(),
            context,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Location::new(0.0, 0.0, 0.0);
        let b = Location::new(3.0, 4.0, 0.0);
        assert!((a.distance(&b) - 5.0).abs() < f32::EPSILON);
        assert!((b.distance(&a) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn ambient_replies_go_to_say() {
        assert_eq!(QueryContext::Ambient.reply_channel(), Channel::Say);
        let reply = QueryContext::Reply {
            channel: Channel::Yell,
            sender: ParticipantId(7),
        };
        assert_eq!(reply.reply_channel(), Channel::Yell);
    }

    #[test]
    fn pending_query_copies_participant() {
        let bot = Participant::bot(42, "Thrall", Location::default());
        let q = PendingQuery::new(&bot, "hi", QueryContext::Ambient);
        assert_eq!(q.participant, ParticipantId(42));
        assert_eq!(q.participant_name, "Thrall");
    }

    #[test]
    fn pending_query_serializes_for_logs() {
        let bot = Participant::bot(5, "Jaina", Location::default());
        let q = PendingQuery::new(
            &bot,
            "hi",
            QueryContext::Reply {
                channel: Channel::General,
                sender: ParticipantId(1),
            },
        );
        let json = serde_json::to_value(&q).expect("serialize");
        assert_eq!(json["participant"], 5);
        assert_eq!(json["context"]["Reply"]["channel"], "General");

        let back: PendingQuery = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, q);
    }
}
