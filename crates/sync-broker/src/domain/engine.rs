//! Rendezvous Engine - submit / await-work / resolve over the correlation store.
//!
//! Flow:
//! 1. Submitter calls `submit()`; the request becomes current and is handed to
//!    the oldest waiting consumer, if any
//! 2. Submitter suspends on its own one-shot response waiter
//! 3. Consumer calls `await_work()`; it gets the current request immediately or
//!    suspends in the FIFO of fetch waiters
//! 4. Consumer calls `resolve()`; the answer wakes the submitter and the
//!    request stops being current
//!
//! Per request: `SUBMITTED -> DISPATCHED -> RESOLVED`. Only the current slot and
//! the response waiter are tracked; dispatch itself is not recorded.

use crate::domain::correlation::RequestId;
use crate::domain::error::{BrokerError, BrokerResult};
use crate::domain::store::{CorrelationStore, StoreStats, SweepReport};
use crate::domain::types::{Answer, BrokerStatus, PendingRequest, ResolveOutcome, Submission};
use crate::ports::{RendezvousApi, SystemTimeSource, TimeSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Warning when the submitter dropped its receiver before the answer came in.
pub const SUBMITTER_GONE_WARNING: &str = "Submitter may have timed out";

/// Warning when the answer matched `current` but no waiter was registered.
pub const DETACHED_WARNING: &str = "Browser may have timed out";

/// Default window in which a consumer counts as connected after its last call.
pub const DEFAULT_CONSUMER_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// The rendezvous engine.
///
/// Construct one per server context; instances are fully isolated.
pub struct RendezvousEngine {
    store: Mutex<CorrelationStore>,
    time_source: Arc<dyn TimeSource>,
    consumer_idle_timeout: Duration,
}

impl Default for RendezvousEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CONSUMER_IDLE_TIMEOUT)
    }
}

impl RendezvousEngine {
    pub fn new(consumer_idle_timeout: Duration) -> Self {
        Self::with_time_source(consumer_idle_timeout, Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(
        consumer_idle_timeout: Duration,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            store: Mutex::new(CorrelationStore::new()),
            time_source,
            consumer_idle_timeout,
        }
    }

    /// Submit a request and wait for its answer.
    pub async fn submit(&self, submission: Submission) -> BrokerResult<Answer> {
        let id = RequestId::new();
        let request =
            PendingRequest::from_submission(id, submission, self.time_source.now_ms());
        let action = request.action.clone();
        let subject_id = request.subject_id.clone();

        let (tx, rx) = oneshot::channel();
        let dispatched = self.store.lock().publish(request, tx);

        info!(
            request_id = %id,
            action = %action,
            subject_id = %subject_id,
            dispatched,
            "Request submitted"
        );

        rx.await.map_err(|_| BrokerError::Abandoned(id))
    }

    /// Return the current request immediately, or wait for the next submission.
    pub async fn await_work(&self) -> PendingRequest {
        loop {
            let rx = {
                let mut store = self.store.lock();
                store.touch_consumer(Instant::now());

                if let Some(current) = store.current() {
                    debug!(request_id = %current.id, "Returning current request");
                    return current.clone();
                }

                let (tx, rx) = oneshot::channel();
                store.enqueue_fetch(tx);
                rx
            };

            debug!("Consumer waiting for work");

            // The sender is only dropped unsent if the store discards it,
            // which never happens while this receiver is alive. Re-register
            // rather than trust that.
            if let Ok(request) = rx.await {
                return request;
            }
        }
    }

    /// Deliver `content` to the submitter of `request_id`.
    pub fn resolve(&self, request_id: RequestId, content: String) -> BrokerResult<ResolveOutcome> {
        let mut store = self.store.lock();
        store.touch_consumer(Instant::now());

        if let Some(waiter) = store.take_response_waiter(&request_id) {
            store.clear_current_if(&request_id);
            let waited_ms = waiter.registered_at.elapsed().as_millis() as u64;
            let answer = Answer {
                request_id,
                content,
            };

            return match waiter.sender.send(answer) {
                Ok(()) => {
                    store.stats_mut().resolved += 1;
                    info!(
                        request_id = %request_id,
                        action = %waiter.action,
                        waited_ms,
                        "Answer delivered"
                    );
                    Ok(ResolveOutcome::Delivered)
                }
                Err(_) => {
                    store.stats_mut().detached += 1;
                    warn!(
                        request_id = %request_id,
                        action = %waiter.action,
                        "Submitter left before the answer arrived"
                    );
                    Ok(ResolveOutcome::Detached {
                        warning: SUBMITTER_GONE_WARNING.to_string(),
                    })
                }
            };
        }

        if store.clear_current_if(&request_id) {
            store.stats_mut().detached += 1;
            warn!(
                request_id = %request_id,
                "No response waiter but id matches current request, clearing it"
            );
            return Ok(ResolveOutcome::Detached {
                warning: DETACHED_WARNING.to_string(),
            });
        }

        store.stats_mut().unknown += 1;
        let pending_id = store.current_id();
        warn!(
            request_id = %request_id,
            pending_id = ?pending_id.map(|id| id.to_string()),
            "Answer for unknown request"
        );
        Err(BrokerError::UnknownRequestId {
            request_id,
            pending_id,
        })
    }

    /// Read-only snapshot of broker state.
    pub fn status(&self) -> BrokerStatus {
        let store = self.store.lock();
        let waiting_consumers = store.waiting_consumers();
        let recently_active = store
            .last_consumer_activity()
            .is_some_and(|at| at.elapsed() <= self.consumer_idle_timeout);

        BrokerStatus {
            connected: waiting_consumers > 0 || recently_active,
            has_pending_request: store.current().is_some(),
            pending_id: store.current_id(),
            waiting_submitters: store.waiting_submitters(),
            waiting_consumers,
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.store.lock().stats()
    }

    /// Reclaim waiters whose submitter or consumer has gone away.
    pub fn sweep(&self) -> SweepReport {
        self.store.lock().sweep()
    }
}

#[async_trait]
impl RendezvousApi for RendezvousEngine {
    async fn submit(&self, submission: Submission) -> BrokerResult<Answer> {
        RendezvousEngine::submit(self, submission).await
    }

    async fn await_work(&self) -> PendingRequest {
        RendezvousEngine::await_work(self).await
    }

    fn resolve(&self, request_id: RequestId, content: String) -> BrokerResult<ResolveOutcome> {
        RendezvousEngine::resolve(self, request_id, content)
    }

    fn status(&self) -> BrokerStatus {
        RendezvousEngine::status(self)
    }
}

/// Background task that periodically sweeps orphaned waiters
pub async fn cleanup_task(engine: Arc<RendezvousEngine>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let report = engine.sweep();
        if report.total() > 0 {
            debug!(
                response_waiters = report.response_waiters,
                fetch_waiters = report.fetch_waiters,
                "Swept orphaned waiters"
            );
        }
    }
}
