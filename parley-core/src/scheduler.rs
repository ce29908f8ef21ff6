//! Ambient chatter scheduling.
//!
//! Each monitored session (a bot, a zone, a group; the host decides) runs
//! its own timer:
//!
//! ```text
//!   Idle { due } --(now >= due)--> Evaluating --(finish)--> Idle { due' }
//! ```
//!
//! `due'` is re-randomized in `[MinRandomInterval, MaxRandomInterval]` after
//! every firing so many sessions do not fire in lockstep. The host drives
//! the machine from its own tick; nothing here spawns threads or timers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use crate::config::ConfigSnapshot;

/// Identifies one independently scheduled chatter session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Timer state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatterState {
    /// Waiting for the timer to fire.
    Idle {
        /// When the next evaluation is due.
        due: Instant,
    },
    /// Fired; waiting for the evaluation to finish.
    Evaluating,
}

/// Per-session ambient chatter timers.
#[derive(Debug, Default)]
pub struct RandomChatterScheduler {
    sessions: Mutex<HashMap<SessionId, ChatterState>>,
}

impl RandomChatterScheduler {
    /// A scheduler with no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance `session` to `now`.
    ///
    /// Returns `true` exactly when the session moves from `Idle` to
    /// `Evaluating`; the caller must then run the evaluation and call
    /// [`Self::finish`]. A session seen for the first time starts `Idle`
    /// with a fresh random interval. With chatter disabled every session
    /// is dropped and nothing fires.
    pub fn poll<R: Rng + ?Sized>(
        &self,
        session: SessionId,
        now: Instant,
        config: &ConfigSnapshot,
        rng: &mut R,
    ) -> bool {
        let mut sessions = self.sessions.lock();
        if !config.enable_random_chatter {
            sessions.clear();
            return false;
        }

        match sessions.get(&session).copied() {
            None => {
                let due = now + next_interval(config, rng);
                sessions.insert(session, ChatterState::Idle { due });
                false
            }
            Some(ChatterState::Idle { due }) if now >= due => {
                sessions.insert(session, ChatterState::Evaluating);
                debug!(session = session.0, "Random chatter timer fired");
                true
            }
            Some(_) => false,
        }
    }

    /// Return `session` to `Idle` with a freshly randomized interval.
    pub fn finish<R: Rng + ?Sized>(
        &self,
        session: SessionId,
        now: Instant,
        config: &ConfigSnapshot,
        rng: &mut R,
    ) {
        let interval = next_interval(config, rng);
        debug!(
            session = session.0,
            next_secs = interval.as_secs(),
            "Random chatter rescheduled"
        );
        self.sessions.lock().insert(
            session,
            ChatterState::Idle {
                due: now + interval,
            },
        );
    }

    /// Current state of `session`.
    #[must_use]
    pub fn state(&self, session: SessionId) -> Option<ChatterState> {
        self.sessions.lock().get(&session).copied()
    }

    /// Stop tracking `session`.
    pub fn remove(&self, session: SessionId) {
        self.sessions.lock().remove(&session);
    }

    /// Number of tracked sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

/// A random interval in `[min_random_interval, max_random_interval]`.
pub fn next_interval<R: Rng + ?Sized>(config: &ConfigSnapshot, rng: &mut R) -> Duration {
    let lo = config.min_random_interval.min(config.max_random_interval);
    let hi = config.min_random_interval.max(config.max_random_interval);
    Duration::from_secs(u64::from(rng.gen_range(lo..=hi)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config(min: u32, max: u32) -> ConfigSnapshot {
        ConfigSnapshot {
            min_random_interval: min,
            max_random_interval: max,
            ..ConfigSnapshot::default()
        }
    }

    #[test]
    fn first_poll_arms_timer() {
        let sched = RandomChatterScheduler::new();
        let cfg = config(10, 20);
        let mut rng = StdRng::seed_from_u64(1);
        let t0 = Instant::now();

        assert!(!sched.poll(SessionId(1), t0, &cfg, &mut rng));
        let Some(ChatterState::Idle { due }) = sched.state(SessionId(1)) else {
            panic!("expected idle");
        };
        let wait = due - t0;
        assert!(wait >= Duration::from_secs(10) && wait <= Duration::from_secs(20));
    }

    #[test]
    fn fires_once_then_waits_for_finish() {
        let sched = RandomChatterScheduler::new();
        let cfg = config(5, 5);
        let mut rng = StdRng::seed_from_u64(2);
        let t0 = Instant::now();
        let s = SessionId(7);

        sched.poll(s, t0, &cfg, &mut rng);
        assert!(!sched.poll(s, t0 + Duration::from_secs(4), &cfg, &mut rng));
        assert!(sched.poll(s, t0 + Duration::from_secs(5), &cfg, &mut rng));
        assert_eq!(sched.state(s), Some(ChatterState::Evaluating));
        // Still evaluating: no double fire.
        assert!(!sched.poll(s, t0 + Duration::from_secs(60), &cfg, &mut rng));

        let t1 = t0 + Duration::from_secs(61);
        sched.finish(s, t1, &cfg, &mut rng);
        assert_eq!(
            sched.state(s),
            Some(ChatterState::Idle {
                due: t1 + Duration::from_secs(5)
            })
        );
    }

    #[test]
    fn intervals_are_rerandomized() {
        let cfg = config(45, 180);
        let mut rng = StdRng::seed_from_u64(3);
        let samples: Vec<Duration> = (0..50).map(|_| next_interval(&cfg, &mut rng)).collect();
        assert!(samples
            .iter()
            .all(|d| *d >= Duration::from_secs(45) && *d <= Duration::from_secs(180)));
        assert!(samples.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn disabled_chatter_never_fires() {
        let sched = RandomChatterScheduler::new();
        let mut cfg = config(0, 0);
        let mut rng = StdRng::seed_from_u64(4);
        let t0 = Instant::now();
        sched.poll(SessionId(1), t0, &cfg, &mut rng);
        assert_eq!(sched.len(), 1);

        cfg.enable_random_chatter = false;
        assert!(!sched.poll(SessionId(1), t0 + Duration::from_secs(10), &cfg, &mut rng));
        assert!(sched.is_empty());
    }

    #[test]
    fn sessions_are_independent() {
        let sched = RandomChatterScheduler::new();
        let cfg = config(1, 1);
        let mut rng = StdRng::seed_from_u64(5);
        let t0 = Instant::now();
        sched.poll(SessionId(1), t0, &cfg, &mut rng);
        sched.poll(SessionId(2), t0 + Duration::from_secs(10), &cfg, &mut rng);

        let t = t0 + Duration::from_secs(2);
        assert!(sched.poll(SessionId(1), t, &cfg, &mut rng));
        assert!(!sched.poll(SessionId(2), t, &cfg, &mut rng));

        sched.remove(SessionId(1));
        assert_eq!(sched.state(SessionId(1)), None);
    }
}
