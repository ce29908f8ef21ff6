//! The chat service a game server drives.
//!
//! `start` and `stop` are the two lifecycle entry points; between them the
//! host forwards chat events and chatter ticks. Intake never blocks: policy
//! evaluation is synchronous and cheap, and every selected query is handed
//! to the [`QueryManager`] which runs it in the background.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use parley_core::config::ConfigSnapshot;
use parley_core::personality::PersonalityRegistry;
use parley_core::scheduler::{RandomChatterScheduler, SessionId};
use parley_core::shared::{Shared, SharedConfig, SharedPersonalities};
use parley_core::trigger::{Decision, TriggerPolicyEngine};
use parley_core::types::{ChatEvent, Participant, PendingQuery};
use parley_llm::{
    GenerationBackend, ModelLifecycleController, QueryHandle, QueryManager, QueryStats, ReplySink,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

/// Policy, dispatch and model lifecycle behind one handle.
pub struct ChatService {
    config: SharedConfig,
    personalities: SharedPersonalities,
    queries: QueryManager,
    lifecycle: ModelLifecycleController,
    scheduler: RandomChatterScheduler,
    rng: Mutex<StdRng>,
}

impl ChatService {
    /// Load personalities, preload the model and begin accepting events.
    ///
    /// A failed preload is logged and startup continues; each query then
    /// loads the model on demand.
    pub async fn start(
        config: ConfigSnapshot,
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn ReplySink>,
    ) -> Self {
        Self::start_with_rng(config, backend, sink, StdRng::from_entropy()).await
    }

    /// [`Self::start`] with a caller-supplied generator, for reproducible
    /// reply decisions.
    pub async fn start_with_rng(
        config: ConfigSnapshot,
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn ReplySink>,
        rng: StdRng,
    ) -> Self {
        let personalities = load_personalities(&config);
        let config = Shared::new(config);
        let queries = QueryManager::new(Arc::clone(&backend), sink, config.clone());
        let lifecycle = ModelLifecycleController::new(backend, config.clone());

        // Failure is already logged by the controller.
        let _ = lifecycle.preload().await;

        let snapshot = config.load();
        info!(
            model = %snapshot.model,
            url = %snapshot.backend_url,
            personalities = personalities.len(),
            "Chat service started"
        );

        Self {
            config,
            personalities: Shared::new(personalities),
            queries,
            lifecycle,
            scheduler: RandomChatterScheduler::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Stop admitting queries and unload the model.
    ///
    /// Queued queries are rejected and replies still in flight are
    /// discarded. The unload is sent regardless of what is in flight.
    pub async fn stop(&self) {
        let stats = self.queries.stats();
        self.queries.shutdown();
        let _ = self.lifecycle.unload().await;
        info!(
            submitted = stats.submitted,
            completed = stats.completed,
            failed = stats.failed + stats.timed_out,
            "Chat service stopped"
        );
    }

    /// React to a chat message. `nearby` is everyone the host considers in
    /// earshot; the policy applies the channel distance itself.
    pub fn on_chat(&self, event: &ChatEvent, nearby: &[Participant]) -> Vec<QueryHandle> {
        let config = self.config.load();
        let personalities = self.personalities.load();
        let engine = TriggerPolicyEngine::new(&config, &personalities);
        let decision = engine.evaluate_chat(event, nearby, &mut *self.rng.lock());

        match decision {
            Decision::Blacklisted { .. } => Vec::new(),
            Decision::Dispatch(queries) => self.submit_all(queries),
        }
    }

    /// Advance the ambient chatter timer for `session`. When it fires, the
    /// policy picks bots from `nearby` and their remarks are dispatched.
    pub fn on_chatter_tick(
        &self,
        session: SessionId,
        nearby: &[Participant],
        now: Instant,
    ) -> Vec<QueryHandle> {
        let config = self.config.load();
        let mut rng = self.rng.lock();
        if !self.scheduler.poll(session, now, &config, &mut *rng) {
            return Vec::new();
        }

        let personalities = self.personalities.load();
        let queries = TriggerPolicyEngine::new(&config, &personalities)
            .evaluate_ambient(nearby, &mut *rng)
            .into_queries();
        self.scheduler.finish(session, now, &config, &mut *rng);
        drop(rng);

        self.submit_all(queries)
    }

    /// Forget a chatter session (its region emptied, its bot logged out).
    pub fn end_chatter_session(&self, session: SessionId) {
        self.scheduler.remove(session);
    }

    /// Swap in a new configuration. Evaluations already running finish on
    /// the snapshot they loaded; the admission limit changes in place. The
    /// personality table is re-read when the new snapshot turns
    /// personalities on or points at a different database.
    pub fn reload(&self, config: ConfigSnapshot) {
        let limit = config.max_concurrent_queries;
        let previous = self.config.store(config);
        let current = self.config.load();
        self.queries.set_max_concurrent_queries(limit);
        if previous.model != current.model {
            info!("Model changed on reload; the new model loads on its first query");
        }
        if previous.enable_personalities != current.enable_personalities
            || previous.personality_database != current.personality_database
        {
            self.reload_personalities();
        }
        info!("Configuration reloaded");
    }

    /// Re-read the personality table and swap the registry. Returns the
    /// number of entries loaded.
    pub fn reload_personalities(&self) -> usize {
        let registry = load_personalities(&self.config.load());
        let count = registry.len();
        self.personalities.store(registry);
        info!(count, "Personalities reloaded");
        count
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.config.load()
    }

    /// Dispatch counters.
    #[must_use]
    pub fn stats(&self) -> QueryStats {
        self.queries.stats()
    }

    fn submit_all(&self, queries: Vec<PendingQuery>) -> Vec<QueryHandle> {
        if !queries.is_empty() {
            debug!(count = queries.len(), "Dispatching queries");
        }
        queries.into_iter().map(|q| self.queries.submit(q)).collect()
    }
}

fn load_personalities(config: &ConfigSnapshot) -> PersonalityRegistry {
    if config.enable_personalities {
        PersonalityRegistry::load_or_empty(config.personality_database.as_deref())
    } else {
        PersonalityRegistry::empty()
    }
}
