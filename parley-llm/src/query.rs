//! Query Manager: bounded-concurrency dispatch to the generation backend.
//!
//! Every [`PendingQuery`] the trigger policy builds flows through here:
//!
//! ```text
//!   submit ──spawn──▶ admission ──▶ backend.generate (bounded wait) ──▶ sink
//!                        ▲                                      │
//!                        └──────── permit dropped ◀─────────────┘
//! ```
//!
//! - `submit` never blocks the caller; the query runs on its own task
//! - admission is FIFO against `MaxConcurrentQueries` (0 = unlimited); a
//!   query still queued after `QueueTimeoutMs` is dropped as stale
//! - capacity is held by an [`AdmissionPermit`] and returned when it drops,
//!   so success, failure, timeout, panic and cancellation all release it
//! - failures are logged and the query is dropped; there is no retry

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use parley_core::shared::SharedConfig;
use parley_core::types::{PendingQuery, QueryId};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::GenerationBackend;
use crate::error::LlmError;
use crate::sink::ReplySink;
use crate::types::{GenerateRequest, Reply};

// ---------------------------------------------------------------------------
// Admission gate
// ---------------------------------------------------------------------------

struct AdmissionState {
    active: usize,
    /// 0 = unlimited.
    limit: usize,
    peak: usize,
    closed: bool,
    waiters: VecDeque<oneshot::Sender<AdmissionPermit>>,
}

impl AdmissionState {
    fn has_capacity(&self) -> bool {
        self.limit == 0 || self.active < self.limit
    }

    fn admit(&mut self) {
        self.active += 1;
        self.peak = self.peak.max(self.active);
    }

    /// Count in as many queued waiters as capacity allows. The returned
    /// senders must be handed a permit outside the lock. Waiters that gave
    /// up (deadline, cancellation) are skipped.
    fn drain_grants(&mut self) -> Vec<oneshot::Sender<AdmissionPermit>> {
        let mut grants = Vec::new();
        while self.has_capacity() {
            let Some(tx) = self.waiters.pop_front() else {
                break;
            };
            if tx.is_closed() {
                continue;
            }
            self.admit();
            grants.push(tx);
        }
        grants
    }
}

/// Counting gate with FIFO hand-off.
///
/// A released slot goes straight to the oldest waiter, so a newcomer can
/// never overtake a query that is already queued.
pub struct Admission {
    state: Mutex<AdmissionState>,
}

impl Admission {
    /// Gate admitting at most `limit` holders at once (0 = unlimited).
    #[must_use]
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(AdmissionState {
                active: 0,
                limit,
                peak: 0,
                closed: false,
                waiters: VecDeque::new(),
            }),
        })
    }

    /// Wait for a slot.
    ///
    /// # Errors
    ///
    /// [`LlmError::ShuttingDown`] if the gate is closed before or while
    /// waiting.
    pub async fn acquire(self: &Arc<Self>) -> Result<AdmissionPermit, LlmError> {
        let rx = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(LlmError::ShuttingDown);
            }
            if state.waiters.is_empty() && state.has_capacity() {
                state.admit();
                return Ok(AdmissionPermit {
                    admission: Arc::clone(self),
                });
            }
            state.waiters.retain(|tx| !tx.is_closed());
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        rx.await.map_err(|_| LlmError::ShuttingDown)
    }

    /// Change the ceiling. Holders above a lowered ceiling keep their slot;
    /// waiters are admitted once the count drops below it.
    pub fn set_limit(self: &Arc<Self>, limit: usize) {
        let grants = {
            let mut state = self.state.lock();
            state.limit = limit;
            state.drain_grants()
        };
        self.hand_off(grants);
    }

    /// Refuse new holders and fail every queued waiter.
    pub fn close(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.waiters)
        };
        drop(waiters);
    }

    /// Whether [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Current holders.
    #[must_use]
    pub fn active(&self) -> usize {
        self.state.lock().active
    }

    /// Current ceiling (0 = unlimited).
    #[must_use]
    pub fn limit(&self) -> usize {
        self.state.lock().limit
    }

    /// Queued waiters still interested in a slot.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state
            .lock()
            .waiters
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    /// Highest number of simultaneous holders seen.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }

    fn release(self: &Arc<Self>) {
        let grants = {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            state.drain_grants()
        };
        self.hand_off(grants);
    }

    fn hand_off(self: &Arc<Self>, grants: Vec<oneshot::Sender<AdmissionPermit>>) {
        for tx in grants {
            // A waiter that gave up returns the permit; dropping it releases
            // the slot to the next in line.
            let _ = tx.send(AdmissionPermit {
                admission: Arc::clone(self),
            });
        }
    }
}

/// One admitted slot. Dropping it frees the slot.
pub struct AdmissionPermit {
    admission: Arc<Admission>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.admission.release();
    }
}

// ---------------------------------------------------------------------------
// Query manager
// ---------------------------------------------------------------------------

/// Counters reported by [`QueryManager::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Queries handed to `submit`.
    pub submitted: u64,
    /// Replies delivered to the sink.
    pub completed: u64,
    /// Transport, status, parse and backend failures.
    pub failed: u64,
    /// Queries that exceeded the bounded wait.
    pub timed_out: u64,
    /// Queries rejected or discarded because of shutdown.
    pub abandoned: u64,
    /// Queries currently holding a slot.
    pub active: usize,
    /// Highest number of simultaneous queries seen.
    pub peak_active: usize,
    /// Current ceiling (0 = unlimited).
    pub limit: usize,
}

#[derive(Default)]
struct Counters {
    submitted: u64,
    completed: u64,
    failed: u64,
    timed_out: u64,
    abandoned: u64,
}

struct Inner {
    backend: Arc<dyn GenerationBackend>,
    sink: Arc<dyn ReplySink>,
    config: SharedConfig,
    admission: Arc<Admission>,
    counters: Mutex<Counters>,
}

/// Admits built queries against the concurrency ceiling and dispatches
/// them to the backend.
#[derive(Clone)]
pub struct QueryManager {
    inner: Arc<Inner>,
    runtime: Handle,
}

impl QueryManager {
    /// Create a manager on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn ReplySink>,
        config: SharedConfig,
    ) -> Self {
        Self::with_runtime(Handle::current(), backend, sink, config)
    }

    /// Create a manager that spawns its dispatch tasks on `runtime`, so
    /// `submit` can be called from threads outside it.
    #[must_use]
    pub fn with_runtime(
        runtime: Handle,
        backend: Arc<dyn GenerationBackend>,
        sink: Arc<dyn ReplySink>,
        config: SharedConfig,
    ) -> Self {
        let limit = config.load().max_concurrent_queries as usize;
        Self {
            inner: Arc::new(Inner {
                backend,
                sink,
                config,
                admission: Admission::new(limit),
                counters: Mutex::new(Counters::default()),
            }),
            runtime,
        }
    }

    /// Dispatch `query` in the background.
    ///
    /// The reply is delivered to the sink; the returned handle resolves to
    /// the same outcome and may be dropped without cancelling the query.
    pub fn submit(&self, query: PendingQuery) -> QueryHandle {
        let id = query.id;
        self.inner.counters.lock().submitted += 1;
        debug!(query = %id, participant = %query.participant, "Query submitted");

        let inner = Arc::clone(&self.inner);
        let task = self.runtime.spawn(async move { inner.run(query).await });
        QueryHandle { id, task }
    }

    /// Change the admission ceiling in place (0 = unlimited).
    pub fn set_max_concurrent_queries(&self, limit: u32) {
        let limit = limit as usize;
        let previous = self.inner.admission.limit();
        if previous != limit {
            info!(previous, limit, "Query admission limit changed");
            self.inner.admission.set_limit(limit);
        }
    }

    /// Stop admitting. Queued queries fail with [`LlmError::ShuttingDown`];
    /// replies of queries still running are discarded.
    pub fn shutdown(&self) {
        if !self.inner.admission.is_closed() {
            info!(
                active = self.inner.admission.active(),
                waiting = self.inner.admission.waiting(),
                "Query manager shutting down"
            );
        }
        self.inner.admission.close();
    }

    /// Whether [`Self::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.admission.is_closed()
    }

    /// Queries currently holding a slot.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.admission.active()
    }

    /// Snapshot of the dispatch counters.
    #[must_use]
    pub fn stats(&self) -> QueryStats {
        let c = self.inner.counters.lock();
        QueryStats {
            submitted: c.submitted,
            completed: c.completed,
            failed: c.failed,
            timed_out: c.timed_out,
            abandoned: c.abandoned,
            active: self.inner.admission.active(),
            peak_active: self.inner.admission.peak(),
            limit: self.inner.admission.limit(),
        }
    }
}

impl Inner {
    async fn run(&self, query: PendingQuery) -> Result<Reply, LlmError> {
        let queue_timeout_ms = self.config.load().queue_timeout_ms;
        let admitted = tokio::time::timeout(
            Duration::from_millis(queue_timeout_ms),
            self.admission.acquire(),
        )
        .await;
        let permit = match admitted {
            Ok(Ok(permit)) => permit,
            Ok(Err(e)) => {
                self.counters.lock().abandoned += 1;
                debug!(query = %query.id, "Query not admitted: {e}");
                return Err(e);
            }
            Err(_) => {
                self.counters.lock().timed_out += 1;
                warn!(
                    query = %query.id,
                    participant = %query.participant,
                    queue_timeout_ms,
                    "Query went stale waiting for admission; dropping"
                );
                return Err(LlmError::AdmissionTimeout(queue_timeout_ms));
            }
        };

        // One snapshot for the whole call, even if a reload lands meanwhile.
        let config = self.config.load();
        let request = GenerateRequest::for_query(&config, &query);
        let result =
            match tokio::time::timeout(config.request_timeout(), self.backend.generate(&request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(config.request_timeout_ms)),
            };
        drop(permit);

        match result {
            Ok(response) => {
                let reply = Reply::new(&query, response);
                if self.admission.is_closed() {
                    self.counters.lock().abandoned += 1;
                    debug!(query = %query.id, "Discarding reply after shutdown");
                    return Err(LlmError::ShuttingDown);
                }
                debug!(
                    query = %query.id,
                    participant = %query.participant,
                    latency_ms = reply.latency_ms,
                    "Query completed"
                );
                self.sink.deliver(reply.clone());
                self.counters.lock().completed += 1;
                Ok(reply)
            }
            Err(e) => {
                {
                    let mut c = self.counters.lock();
                    if e.is_timeout() {
                        c.timed_out += 1;
                    } else {
                        c.failed += 1;
                    }
                }
                warn!(
                    query = %query.id,
                    participant = %query.participant,
                    model = %request.model,
                    error = %e,
                    "Query failed; dropping"
                );
                Err(e)
            }
        }
    }
}

/// Handle to a submitted query. Resolves to the reply or the failure.
pub struct QueryHandle {
    id: QueryId,
    task: JoinHandle<Result<Reply, LlmError>>,
}

impl QueryHandle {
    /// ID of the submitted query.
    #[must_use]
    pub fn id(&self) -> QueryId {
        self.id
    }

    /// Cancel the query. Its slot, if held, is released.
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Future for QueryHandle {
    type Output = Result<Reply, LlmError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|e| Err(LlmError::Aborted(e.to_string()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn unlimited_admits_everyone() {
        let gate = Admission::new(0);
        let mut held = Vec::new();
        for _ in 0..50 {
            held.push(gate.acquire().await.expect("admit"));
        }
        assert_eq!(gate.active(), 50);
        drop(held);
        assert_eq!(gate.active(), 0);
        assert_eq!(gate.peak(), 50);
    }

    #[tokio::test]
    async fn waiters_are_served_in_order() {
        let gate = Admission::new(1);
        let first = gate.acquire().await.expect("admit");

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for n in 0..3 {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.expect("admit");
                order.lock().push(n);
            }));
            settle().await;
        }
        assert_eq!(gate.waiting(), 3);
        assert!(order.lock().is_empty());

        drop(first);
        for t in tasks {
            t.await.expect("join");
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(gate.active(), 0);
        assert_eq!(gate.peak(), 1);
    }

    #[tokio::test]
    async fn shrinking_keeps_holders_and_blocks_newcomers() {
        let gate = Admission::new(3);
        let a = gate.acquire().await.expect("a");
        let b = gate.acquire().await.expect("b");
        let c = gate.acquire().await.expect("c");

        gate.set_limit(1);
        assert_eq!(gate.active(), 3);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        settle().await;
        drop(a);
        drop(b);
        settle().await;
        assert!(!waiter.is_finished());
        drop(c);
        waiter.await.expect("join").expect("admitted");
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test]
    async fn growing_wakes_waiters() {
        let gate = Admission::new(1);
        let _held = gate.acquire().await.expect("admit");
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _p = gate.acquire().await?;
                Ok::<_, LlmError>(())
            })
        };
        settle().await;
        gate.set_limit(2);
        waiter.await.expect("join").expect("admitted");
    }

    #[tokio::test]
    async fn close_fails_waiters_and_newcomers() {
        let gate = Admission::new(1);
        let held = gate.acquire().await.expect("admit");
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        settle().await;

        gate.close();
        assert!(matches!(waiter.await.expect("join"), Err(LlmError::ShuttingDown)));
        assert!(matches!(gate.acquire().await, Err(LlmError::ShuttingDown)));

        drop(held);
        assert_eq!(gate.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_waiter_is_skipped() {
        let gate = Admission::new(1);
        let held = gate.acquire().await.expect("admit");

        let expired =
            tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(expired.is_err());
        assert_eq!(gate.waiting(), 0);

        let next = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        settle().await;
        drop(held);
        next.await.expect("join").expect("live waiter admitted");
        assert_eq!(gate.active(), 0);
        assert_eq!(gate.peak(), 1);
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_leak_capacity() {
        let gate = Admission::new(1);
        let held = gate.acquire().await.expect("admit");
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire().await.map(|_| ()) })
        };
        settle().await;
        waiter.abort();
        let _ = waiter.await;

        drop(held);
        assert_eq!(gate.active(), 0);
        let _again = gate.acquire().await.expect("capacity came back");
    }
}
