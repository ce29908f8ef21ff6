//! Integration hooks for the host's chat callbacks.
//!
//! The host calls one of these from its say/yell/channel handlers and hands
//! the resulting event to [`crate::ChatService::on_chat`].

use parley_core::types::{Channel, ChatEvent, Participant, SenderKind};

/// Build a chat event spoken by `sender` on `channel`.
#[must_use]
pub fn on_chat(sender: &Participant, message: impl Into<String>, channel: Channel) -> ChatEvent {
    ChatEvent {
        sender: sender.id,
        sender_name: sender.name.clone(),
        sender_kind: if sender.is_bot {
            SenderKind::Bot
        } else {
            SenderKind::Player
        },
        message: message.into(),
        channel,
        position: sender.position,
    }
}

/// Create a say event.
#[must_use]
pub fn on_say(sender: &Participant, message: impl Into<String>) -> ChatEvent {
    on_chat(sender, message, Channel::Say)
}

/// Create a yell event.
#[must_use]
pub fn on_yell(sender: &Participant, message: impl Into<String>) -> ChatEvent {
    on_chat(sender, message, Channel::Yell)
}

/// Create a general-channel event.
#[must_use]
pub fn on_general(sender: &Participant, message: impl Into<String>) -> ChatEvent {
    on_chat(sender, message, Channel::General)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::Location;

    #[test]
    fn sender_kind_follows_participant() {
        let player = Participant::player(1, "Alice", Location::new(1.0, 2.0, 3.0));
        let bot = Participant::bot(2, "Grom", Location::default());

        let ev = on_yell(&player, "hello");
        assert_eq!(ev.sender_kind, SenderKind::Player);
        assert_eq!(ev.channel, Channel::Yell);
        assert_eq!(ev.position, player.position);
        assert_eq!(ev.sender_name, "Alice");

        assert_eq!(on_general(&bot, "lfg").sender_kind, SenderKind::Bot);
        assert_eq!(on_say(&bot, "hi").channel, Channel::Say);
    }
}
