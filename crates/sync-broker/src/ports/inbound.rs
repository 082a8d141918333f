//! # Inbound Port - RendezvousApi
//!
//! The driving port both transport adapters call into.
//!
//! | Method | Caller | Suspends |
//! |--------|--------|----------|
//! | `submit` | Submission surface (HTTP) | until an answer is posted |
//! | `await_work` | Consumer surface (JSON-RPC) | only when nothing is current |
//! | `resolve` | Consumer surface (JSON-RPC) | never |
//! | `status` | Submission surface (HTTP) | never |

use crate::domain::{
    Answer, BrokerResult, BrokerStatus, PendingRequest, RequestId, ResolveOutcome, Submission,
};
use async_trait::async_trait;

/// Primary API of the rendezvous broker.
///
/// # Example
///
/// ```rust,ignore
/// use sync_broker::ports::RendezvousApi;
///
/// async fn consumer_loop(broker: &dyn RendezvousApi) {
///     loop {
///         let work = broker.await_work().await;
///         let reply = format!("handled {}", work.action);
///         let _ = broker.resolve(work.id, reply);
///     }
/// }
/// ```
#[async_trait]
pub trait RendezvousApi: Send + Sync {
    /// Publish a submission and wait for the answer addressed to it.
    ///
    /// Imposes no deadline of its own. Dropping the returned future leaves an
    /// orphaned waiter that the sweep reclaims.
    async fn submit(&self, submission: Submission) -> BrokerResult<Answer>;

    /// Return the current request, or wait for the next one.
    ///
    /// Repeated calls before a resolve all see the same current request.
    async fn await_work(&self) -> PendingRequest;

    /// Deliver an answer to the submitter waiting on `request_id`.
    ///
    /// # Errors
    /// - `UnknownRequestId`: nothing matches `request_id` (including a second
    ///   resolve of the same id)
    fn resolve(&self, request_id: RequestId, content: String) -> BrokerResult<ResolveOutcome>;

    /// Observe broker state without mutating it.
    fn status(&self) -> BrokerStatus;
}
