//! Property-based tests for the trigger policy.
//!
//! Checks the invariants that must hold for every input: commands never
//! trigger, responder count never exceeds `MaxBotsToPick`, responders are
//! always bots within range, and reply rates track the configured chance.

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use parley_core::config::{ConfigSnapshot, DEFAULT_BLACKLIST};
use parley_core::personality::PersonalityRegistry;
use parley_core::trigger::{Decision, TriggerPolicyEngine};
use parley_core::types::{Channel, ChatEvent, Location, Participant, ParticipantId, SenderKind};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_channel() -> impl Strategy<Value = Channel> {
    prop_oneof![Just(Channel::Say), Just(Channel::Yell), Just(Channel::General)]
}

fn arb_participants() -> impl Strategy<Value = Vec<Participant>> {
    prop::collection::vec((-700.0..700.0f32, -700.0..700.0f32, any::<bool>()), 0..25).prop_map(
        |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (x, y, is_bot))| Participant {
                    id: ParticipantId(100 + i as u64),
                    name: format!("P{i}"),
                    position: Location::new(x, y, 0.0),
                    is_bot,
                })
                .collect()
        },
    )
}

fn event(message: String, channel: Channel, kind: SenderKind) -> ChatEvent {
    ChatEvent {
        sender: ParticipantId(1),
        sender_name: "Sender".into(),
        sender_kind: kind,
        message,
        channel,
        position: Location::default(),
    }
}

// ---------------------------------------------------------------------------
// Property: blacklisted commands never dispatch
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn blacklisted_messages_never_dispatch(
        token in prop::sample::select(DEFAULT_BLACKLIST.to_vec()),
        lead in " {0,3}",
        rest in "[ a-zA-Z0-9]{0,24}",
        participants in arb_participants(),
        channel in arb_channel(),
        seed in any::<u64>(),
    ) {
        let config = ConfigSnapshot {
            player_reply_chance: 100,
            max_bots_to_pick: 10,
            ..ConfigSnapshot::default()
        };
        let registry = PersonalityRegistry::empty();
        let engine = TriggerPolicyEngine::new(&config, &registry);
        let mut rng = StdRng::seed_from_u64(seed);

        let message = format!("{lead}{token}{rest}");
        let decision = engine.evaluate_chat(
            &event(message, channel, SenderKind::Player),
            &participants,
            &mut rng,
        );
        let is_blacklisted = matches!(decision, Decision::Blacklisted { .. });
        prop_assert!(is_blacklisted);
        prop_assert!(decision.queries().is_empty());
    }
}

// ---------------------------------------------------------------------------
// Property: at most MaxBotsToPick responders, all bots, all in range
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn responders_bounded_and_in_range(
        max_bots in 0u32..6,
        chance in 0u32..=120,
        participants in arb_participants(),
        channel in arb_channel(),
        from_bot in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let config = ConfigSnapshot {
            player_reply_chance: chance,
            bot_reply_chance: chance,
            max_bots_to_pick: max_bots,
            ..ConfigSnapshot::default()
        };
        let registry = PersonalityRegistry::empty();
        let engine = TriggerPolicyEngine::new(&config, &registry);
        let mut rng = StdRng::seed_from_u64(seed);
        let kind = if from_bot { SenderKind::Bot } else { SenderKind::Player };

        // "hi" starts with none of the default prefixes.
        let ev = event("hi there".into(), channel, kind);
        let queries = engine.evaluate_chat(&ev, &participants, &mut rng).into_queries();

        prop_assert!(queries.len() <= max_bots as usize);
        let threshold = config.distance_for(channel);
        for q in &queries {
            let who = participants.iter().find(|p| p.id == q.participant);
            prop_assert!(who.is_some());
            let who = who.expect("checked");
            prop_assert!(who.is_bot);
            prop_assert!(who.position.distance(&ev.position) <= threshold);
        }
    }

    #[test]
    fn ambient_responders_bounded(
        max_bots in 0u32..6,
        participants in arb_participants(),
        seed in any::<u64>(),
    ) {
        let config = ConfigSnapshot {
            random_chatter_chance: 100,
            max_bots_to_pick: max_bots,
            ..ConfigSnapshot::default()
        };
        let registry = PersonalityRegistry::empty();
        let engine = TriggerPolicyEngine::new(&config, &registry);
        let mut rng = StdRng::seed_from_u64(seed);

        let queries = engine.evaluate_ambient(&participants, &mut rng).into_queries();
        prop_assert!(queries.len() <= max_bots as usize);
        for q in &queries {
            let bot = participants.iter().find(|p| p.id == q.participant).expect("known");
            prop_assert!(bot.is_bot);
            let near_player = participants
                .iter()
                .filter(|p| !p.is_bot)
                .any(|p| p.position.distance(&bot.position) <= config.random_chatter_distance);
            prop_assert!(near_player);
        }
    }
}

// ---------------------------------------------------------------------------
// Statistical: dispatch rate converges to the configured chance
// ---------------------------------------------------------------------------

#[test]
fn player_reply_rate_converges_to_chance() {
    const TRIALS: u32 = 20_000;

    for chance in [10u32, 37, 90] {
        let config = ConfigSnapshot {
            player_reply_chance: chance,
            max_bots_to_pick: 1,
            ..ConfigSnapshot::default()
        };
        let registry = PersonalityRegistry::empty();
        let engine = TriggerPolicyEngine::new(&config, &registry);
        let bots = [Participant::bot(50, "Bot", Location::new(5.0, 0.0, 0.0))];
        let mut rng = StdRng::seed_from_u64(u64::from(chance));

        let hits = (0..TRIALS)
            .filter(|_| {
                !engine
                    .evaluate_chat(
                        &event("hello".into(), Channel::Say, SenderKind::Player),
                        &bots,
                        &mut rng,
                    )
                    .queries()
                    .is_empty()
            })
            .count();

        let rate = hits as f64 / f64::from(TRIALS);
        let expected = f64::from(chance) / 100.0;
        // Five standard errors at 20k trials is under 0.018.
        assert!(
            (rate - expected).abs() < 0.02,
            "chance {chance}%: observed rate {rate:.4}"
        );
    }
}
