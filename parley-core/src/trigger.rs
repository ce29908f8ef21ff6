//! Trigger policy: decides whether, and which, simulated participants
//! respond to a chat message or an ambient chatter tick.
//!
//! ## Pipeline (chat message)
//!
//! 1. Blacklist: a message starting with a command prefix never triggers.
//! 2. Threshold: the channel picks the proximity distance.
//! 3. Candidates: bots within the distance, excluding the sender.
//! 4. Rolls: one independent percentage roll per candidate, nearest first.
//! 5. Selection: the first `max_bots_to_pick` candidates that pass.
//! 6. Payload: persona resolution and prompt rendering per responder.
//!
//! The engine borrows one configuration snapshot and one personality table
//! for the whole evaluation, so a concurrent reload cannot be observed
//! half-way through. Randomness is injected so tests can seed it.

use ordered_float::OrderedFloat;
use rand::Rng;
use tracing::debug;

use crate::config::ConfigSnapshot;
use crate::personality::PersonalityRegistry;
use crate::prompt::{self, DEFAULT_PERSONA, Persona};
use crate::types::{ChatEvent, Participant, PendingQuery, QueryContext};

/// Outcome of one trigger evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The message is a command; nothing is dispatched.
    Blacklisted {
        /// The prefix that matched.
        token: String,
    },
    /// Queries to hand to the dispatcher. May be empty.
    Dispatch(Vec<PendingQuery>),
}

impl Decision {
    /// Queries to dispatch; empty when blacklisted.
    #[must_use]
    pub fn queries(&self) -> &[PendingQuery] {
        match self {
            Self::Blacklisted { .. } => &[],
            Self::Dispatch(queries) => queries,
        }
    }

    /// Take the queries out of the decision.
    #[must_use]
    pub fn into_queries(self) -> Vec<PendingQuery> {
        match self {
            Self::Blacklisted { .. } => Vec::new(),
            Self::Dispatch(queries) => queries,
        }
    }
}

/// Evaluates trigger events against one configuration snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TriggerPolicyEngine<'a> {
    config: &'a ConfigSnapshot,
    personalities: &'a PersonalityRegistry,
}

impl<'a> TriggerPolicyEngine<'a> {
    /// Bind the engine to a configuration and personality snapshot.
    #[must_use]
    pub fn new(config: &'a ConfigSnapshot, personalities: &'a PersonalityRegistry) -> Self {
        Self {
            config,
            personalities,
        }
    }

    /// Decide who answers `event`, given everyone the host can see.
    pub fn evaluate_chat<R: Rng + ?Sized>(
        &self,
        event: &ChatEvent,
        participants: &[Participant],
        rng: &mut R,
    ) -> Decision {
        if let Some(token) = self.config.blacklist.matching_prefix(&event.message) {
            debug!(sender = %event.sender, %token, "Message matches blacklisted command, ignoring");
            return Decision::Blacklisted {
                token: token.to_string(),
            };
        }

        let threshold = self.config.distance_for(event.channel);
        let candidates: Vec<(&Participant, f32)> = participants
            .iter()
            .filter(|p| p.is_bot && p.id != event.sender)
            .map(|p| (p, p.position.distance(&event.position)))
            .filter(|(_, d)| *d <= threshold)
            .collect();

        let chance = self.config.reply_chance(event.sender_kind);
        let selected = self.select(candidates, chance, rng);

        debug!(
            sender = %event.sender,
            channel = %event.channel,
            threshold,
            chance,
            selected = selected.len(),
            "Evaluated chat trigger"
        );

        let context = QueryContext::Reply {
            channel: event.channel,
            sender: event.sender,
        };
        Decision::Dispatch(
            selected
                .into_iter()
                .map(|(bot, _)| {
                    let persona = self.persona(bot);
                    PendingQuery::new(bot, prompt::reply_prompt(bot, persona, event), context.clone())
                })
                .collect(),
        )
    }

    /// Decide which bots make an unprompted remark on a chatter tick.
    ///
    /// A bot is eligible only while a real player is within the chatter
    /// distance; eligible bots are ordered by distance to their nearest
    /// real player. There is no message, so the blacklist never applies.
    pub fn evaluate_ambient<R: Rng + ?Sized>(
        &self,
        participants: &[Participant],
        rng: &mut R,
    ) -> Decision {
        if !self.config.enable_random_chatter {
            return Decision::Dispatch(Vec::new());
        }

        let threshold = self.config.random_chatter_distance;
        let mut nearest_player = Vec::new();
        let candidates: Vec<(&Participant, f32)> = participants
            .iter()
            .filter(|p| p.is_bot)
            .filter_map(|bot| {
                let (player, d) = participants
                    .iter()
                    .filter(|p| !p.is_bot)
                    .map(|p| (p, p.position.distance(&bot.position)))
                    .min_by_key(|(p, d)| (OrderedFloat(*d), p.id))?;
                (d <= threshold).then(|| {
                    nearest_player.push((bot.id, player));
                    (bot, d)
                })
            })
            .collect();

        let chance = self.config.random_chatter_chance.min(100);
        let selected = self.select(candidates, chance, rng);

        debug!(threshold, chance, selected = selected.len(), "Evaluated ambient chatter");

        Decision::Dispatch(
            selected
                .into_iter()
                .filter_map(|(bot, _)| {
                    let (_, player) = nearest_player.iter().find(|(id, _)| *id == bot.id)?;
                    let persona = self.persona(bot);
                    Some(PendingQuery::new(
                        bot,
                        prompt::ambient_prompt(bot, persona, player),
                        QueryContext::Ambient,
                    ))
                })
                .collect(),
        )
    }

    /// Roll each candidate nearest-first and keep the first
    /// `max_bots_to_pick` that pass. Ties on distance break on ID so a
    /// seeded generator gives the same picks regardless of input order.
    fn select<'p, R: Rng + ?Sized>(
        &self,
        mut candidates: Vec<(&'p Participant, f32)>,
        chance: u32,
        rng: &mut R,
    ) -> Vec<(&'p Participant, f32)> {
        let limit = usize::try_from(self.config.max_bots_to_pick).unwrap_or(usize::MAX);
        if limit == 0 || candidates.is_empty() {
            return Vec::new();
        }

        candidates.sort_by_key(|(p, d)| (OrderedFloat(*d), p.id));
        candidates
            .into_iter()
            .filter(|_| roll(chance, rng))
            .take(limit)
            .collect()
    }

    fn persona(&self, participant: &Participant) -> Persona {
        if self.config.enable_personalities {
            prompt::persona_for(self.personalities.classifier(participant.id))
        } else {
            DEFAULT_PERSONA
        }
    }
}

/// Percentage roll; values above 100 always pass.
pub fn roll<R: Rng + ?Sized>(chance: u32, rng: &mut R) -> bool {
    rng.gen_range(0..100u32) < chance.min(100)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
