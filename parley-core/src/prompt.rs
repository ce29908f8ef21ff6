//! Prompt templates and personas.
//!
//! The core never inspects generated text; it only decides what to ask.
//! A prompt is a persona line followed by the situation the responder is
//! reacting to.

use crate::types::{Channel, ChatEvent, Participant};

/// Template for answering a chat message.
pub const REPLY_TEMPLATE: &str = r#"You are {bot_name}, a player in World of Warcraft. {persona}
{sender_name} just said in {channel} chat: "{message}"
Reply in one short chat message, in character. Do not use quotes or name prefixes."#;

/// Template for an unprompted ambient comment.
pub const AMBIENT_TEMPLATE: &str = r"You are {bot_name}, a player in World of Warcraft. {persona}
{player_name} is standing nearby. Say one short, casual remark about what you are doing or what is around you.
Do not use quotes or name prefixes.";

/// A tone the responder speaks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persona {
    /// Short label, for logs.
    pub name: &'static str,
    /// Sentence embedded in the prompt.
    pub description: &'static str,
}

/// Used when personalities are off or the classifier is unknown.
pub const DEFAULT_PERSONA: Persona = Persona {
    name: "default",
    description: "You are friendly, helpful and speak casually like a regular gamer.",
};

/// Personas indexed by the persisted classifier.
pub const PERSONAS: &[Persona] = &[
    Persona {
        name: "gamer",
        description: "You talk like a seasoned gamer, using light MMO slang.",
    },
    Persona {
        name: "roleplayer",
        description: "You stay fully in character as an inhabitant of Azeroth.",
    },
    Persona {
        name: "trickster",
        description: "You are playful and love harmless jokes and teasing.",
    },
    Persona {
        name: "scholar",
        description: "You are curious and bookish, fond of lore and history.",
    },
    Persona {
        name: "grumpy",
        description: "You are a grumpy veteran who complains but still helps.",
    },
    Persona {
        name: "newbie",
        description: "You are new to the game, enthusiastic and a little confused.",
    },
    Persona {
        name: "merchant",
        description: "You always have trade, gold and auction prices on your mind.",
    },
    Persona {
        name: "warrior",
        description: "You are battle-hungry and speak boldly about fights and glory.",
    },
];

/// Persona for a classifier, or the default when it is unknown.
#[must_use]
pub fn persona_for(classifier: Option<u32>) -> Persona {
    classifier
        .and_then(|c| usize::try_from(c).ok())
        .and_then(|c| PERSONAS.get(c))
        .copied()
        .unwrap_or(DEFAULT_PERSONA)
}

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value in a single pass over the
/// template, so braces inside substituted values are never expanded.
/// Unknown or unterminated placeholders are kept as written.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let Some(close) = tail.find('}') else {
            result.push_str(&rest[open..]);
            return result;
        };
        let key = &tail[..close];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => result.push_str(value),
            None => result.push_str(&rest[open..=open + 1 + close]),
        }
        rest = &tail[close + 1..];
    }
    result.push_str(rest);
    result
}

/// Prompt asking `responder` to answer `event`.
#[must_use]
pub fn reply_prompt(responder: &Participant, persona: Persona, event: &ChatEvent) -> String {
    let channel = channel_label(event.channel);
    render_template(
        REPLY_TEMPLATE,
        &[
            ("bot_name", responder.name.as_str()),
            ("persona", persona.description),
            ("sender_name", event.sender_name.as_str()),
            ("channel", channel),
            ("message", event.message.trim()),
        ],
    )
}

/// Prompt asking `responder` for an ambient remark near `player`.
#[must_use]
pub fn ambient_prompt(responder: &Participant, persona: Persona, player: &Participant) -> String {
    render_template(
        AMBIENT_TEMPLATE,
        &[
            ("bot_name", responder.name.as_str()),
            ("persona", persona.description),
            ("player_name", player.name.as_str()),
        ],
    )
}

fn channel_label(channel: Channel) -> &'static str {
    match channel {
        Channel::Say => "say",
        Channel::Yell => "yell",
        Channel::General => "the general",
    }
}
