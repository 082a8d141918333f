//! Correlation Store - the broker's only shared mutable state.
//!
//! Holds the current request, the response waiters keyed by request id and
//! the FIFO of fetch waiters. Waiters are one-shot channels; waking one is a
//! non-blocking send, so nothing here ever waits on the woken party.
//!
//! The store is not synchronized by itself. `RendezvousEngine` owns it behind
//! a single mutex so every mutation below is atomic with respect to the rest.

use crate::domain::correlation::RequestId;
use crate::domain::types::{Answer, PendingRequest};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A submitter suspended until its answer arrives.
pub(crate) struct ResponseWaiter {
    /// Channel the answer is delivered on
    pub(crate) sender: oneshot::Sender<Answer>,
    /// When the submitter started waiting
    pub(crate) registered_at: Instant,
    /// Action name (for logging)
    pub(crate) action: String,
}

/// Lifetime counters for the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Requests submitted
    pub submitted: u64,
    /// Requests handed to a suspended fetch waiter
    pub dispatched: u64,
    /// Answers delivered to a waiting submitter
    pub resolved: u64,
    /// Answers accepted with nobody left to receive them
    pub detached: u64,
    /// Answers naming an unknown request
    pub unknown: u64,
    /// Orphaned waiters reclaimed by the sweep
    pub swept: u64,
}

/// Result of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub response_waiters: usize,
    pub fetch_waiters: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.response_waiters + self.fetch_waiters
    }
}

/// Correlation state.
///
/// Invariants:
/// - every key in `response_waiters` names a submitted, unresolved request
/// - `fetch_waiters` never holds a waiter that was already woken
#[derive(Default)]
pub struct CorrelationStore {
    current: Option<PendingRequest>,
    response_waiters: HashMap<RequestId, ResponseWaiter>,
    fetch_waiters: VecDeque<oneshot::Sender<PendingRequest>>,
    last_consumer_activity: Option<Instant>,
    stats: StoreStats,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request: make it current, park its submitter, and hand
    /// a copy to the oldest live fetch waiter if there is one.
    ///
    /// Returns true if a fetch waiter received the request.
    pub fn publish(&mut self, request: PendingRequest, responder: oneshot::Sender<Answer>) -> bool {
        let id = request.id;

        if let Some(previous) = self.current.as_ref() {
            // The previous submitter keeps its own waiter; only the poll cache moves.
            debug!(
                request_id = %id,
                replaced = %previous.id,
                "New request replaces current request"
            );
        }

        self.response_waiters.insert(
            id,
            ResponseWaiter {
                sender: responder,
                registered_at: Instant::now(),
                action: request.action.clone(),
            },
        );
        self.stats.submitted += 1;

        let dispatched = self.dispatch(&request);
        self.current = Some(request);
        dispatched
    }

    /// Wake the oldest fetch waiter that still has a consumer behind it.
    fn dispatch(&mut self, request: &PendingRequest) -> bool {
        while let Some(waiter) = self.fetch_waiters.pop_front() {
            match waiter.send(request.clone()) {
                Ok(()) => {
                    self.stats.dispatched += 1;
                    self.last_consumer_activity = Some(Instant::now());
                    return true;
                }
                Err(_) => {
                    debug!(request_id = %request.id, "Skipping fetch waiter whose consumer left");
                }
            }
        }
        false
    }

    /// Queue a fetch waiter at the tail.
    pub fn enqueue_fetch(&mut self, waiter: oneshot::Sender<PendingRequest>) {
        self.fetch_waiters.push_back(waiter);
    }

    pub fn current(&self) -> Option<&PendingRequest> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<RequestId> {
        self.current.as_ref().map(|r| r.id)
    }

    /// Detach the response waiter for `id`, if any.
    pub(crate) fn take_response_waiter(&mut self, id: &RequestId) -> Option<ResponseWaiter> {
        self.response_waiters.remove(id)
    }

    /// Clear `current` only when it is the request named by `id`.
    pub fn clear_current_if(&mut self, id: &RequestId) -> bool {
        if self.current.as_ref().is_some_and(|c| c.id == *id) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn has_response_waiter(&self, id: &RequestId) -> bool {
        self.response_waiters.contains_key(id)
    }

    /// Submitters still waiting for an answer.
    pub fn waiting_submitters(&self) -> usize {
        self.response_waiters
            .values()
            .filter(|w| !w.sender.is_closed())
            .count()
    }

    /// Consumers still suspended in a fetch.
    pub fn waiting_consumers(&self) -> usize {
        self.fetch_waiters.iter().filter(|w| !w.is_closed()).count()
    }

    pub fn touch_consumer(&mut self, at: Instant) {
        self.last_consumer_activity = Some(at);
    }

    pub fn last_consumer_activity(&self) -> Option<Instant> {
        self.last_consumer_activity
    }

    pub(crate) fn stats_mut(&mut self) -> &mut StoreStats {
        &mut self.stats
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Drop waiters whose other side has gone away.
    ///
    /// `current` is left alone so a late answer for an abandoned request is
    /// still accepted with a warning instead of being reported as unknown.
    pub fn sweep(&mut self) -> SweepReport {
        let now = Instant::now();
        let before = self.response_waiters.len();
        self.response_waiters.retain(|id, waiter| {
            if waiter.sender.is_closed() {
                warn!(
                    request_id = %id,
                    action = %waiter.action,
                    waited_ms = now.duration_since(waiter.registered_at).as_millis() as u64,
                    "Removing orphaned response waiter"
                );
                false
            } else {
                true
            }
        });
        let response_waiters = before - self.response_waiters.len();

        let before = self.fetch_waiters.len();
        self.fetch_waiters.retain(|w| !w.is_closed());
        let fetch_waiters = before - self.fetch_waiters.len();

        let report = SweepReport {
            response_waiters,
            fetch_waiters,
        };
        self.stats.swept += report.total() as u64;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Submission;

    fn request(action: &str) -> PendingRequest {
        PendingRequest::from_submission(
            RequestId::new(),
            Submission::new(action, "n1", "graph").with_prompt("hi"),
            0,
        )
    }

    #[test]
    fn test_publish_without_consumer_only_sets_current() {
        let mut store = CorrelationStore::new();
        let req = request("summarize");
        let id = req.id;
        let (tx, _rx) = oneshot::channel();

        assert!(!store.publish(req, tx));
        assert_eq!(store.current_id(), Some(id));
        assert!(store.has_response_waiter(&id));
        assert_eq!(store.stats().submitted, 1);
        assert_eq!(store.stats().dispatched, 0);
    }

    #[test]
    fn test_publish_wakes_oldest_fetch_waiter_first() {
        let mut store = CorrelationStore::new();
        let (first_tx, mut first_rx) = oneshot::channel();
        let (second_tx, mut second_rx) = oneshot::channel();
        store.enqueue_fetch(first_tx);
        store.enqueue_fetch(second_tx);

        let req = request("expand");
        let id = req.id;
        let (tx, _rx) = oneshot::channel();
        assert!(store.publish(req, tx));

        assert_eq!(first_rx.try_recv().unwrap().id, id);
        assert!(second_rx.try_recv().is_err());
        assert_eq!(store.waiting_consumers(), 1);
    }

    #[test]
    fn test_dispatch_skips_departed_consumers() {
        let mut store = CorrelationStore::new();
        let (gone_tx, gone_rx) = oneshot::channel();
        let (live_tx, mut live_rx) = oneshot::channel();
        store.enqueue_fetch(gone_tx);
        store.enqueue_fetch(live_tx);
        drop(gone_rx);

        let req = request("expand");
        let id = req.id;
        let (tx, _rx) = oneshot::channel();
        assert!(store.publish(req, tx));
        assert_eq!(live_rx.try_recv().unwrap().id, id);
        assert_eq!(store.waiting_consumers(), 0);
    }

    #[test]
    fn test_second_publish_replaces_current_but_keeps_both_waiters() {
        let mut store = CorrelationStore::new();
        let first = request("a");
        let second = request("b");
        let (first_id, second_id) = (first.id, second.id);
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();

        store.publish(first, tx1);
        store.publish(second, tx2);

        assert_eq!(store.current_id(), Some(second_id));
        assert!(store.has_response_waiter(&first_id));
        assert!(store.has_response_waiter(&second_id));
        assert_eq!(store.waiting_submitters(), 2);
    }

    #[test]
    fn test_clear_current_if_ignores_other_ids() {
        let mut store = CorrelationStore::new();
        let req = request("a");
        let id = req.id;
        let (tx, _rx) = oneshot::channel();
        store.publish(req, tx);

        assert!(!store.clear_current_if(&RequestId::new()));
        assert_eq!(store.current_id(), Some(id));
        assert!(store.clear_current_if(&id));
        assert_eq!(store.current_id(), None);
    }

    #[test]
    fn test_sweep_removes_orphans_and_keeps_current() {
        let mut store = CorrelationStore::new();
        let orphan = request("orphan");
        let live = request("live");
        let (orphan_id, live_id) = (orphan.id, live.id);
        let (orphan_tx, orphan_rx) = oneshot::channel();
        let (live_tx, _live_rx) = oneshot::channel();
        store.publish(orphan, orphan_tx);
        store.publish(live, live_tx);
        drop(orphan_rx);

        let (fetch_tx, fetch_rx) = oneshot::channel();
        store.enqueue_fetch(fetch_tx);
        drop(fetch_rx);

        let report = store.sweep();
        assert_eq!(report.response_waiters, 1);
        assert_eq!(report.fetch_waiters, 1);
        assert!(!store.has_response_waiter(&orphan_id));
        assert!(store.has_response_waiter(&live_id));
        assert_eq!(store.current_id(), Some(live_id));
        assert_eq!(store.stats().swept, 2);
    }
}
