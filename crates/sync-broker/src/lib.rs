#![allow(missing_docs)]

//! Playground Sync - rendezvous broker between a blocking HTTP submitter and
//! a polling JSON-RPC consumer.
//!
//! A browser POSTs a prompt and holds the connection open. A consumer on the
//! other end of a line-delimited JSON-RPC stream asks for work, computes an
//! answer, and posts it back. The broker pairs the two by request id.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          PLAYGROUND SYNC                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐            ┌──────────────────────────┐    │
//! │  │   HTTP (axum)        │            │   JSON-RPC over stdio    │    │
//! │  │   POST /prompt       │            │   playground_watch       │    │
//! │  │   GET  /status       │            │   playground_respond     │    │
//! │  └──────────┬───────────┘            └────────────┬─────────────┘    │
//! │             │ submit                   await_work │ resolve          │
//! │  ┌──────────┴─────────────────────────────────────┴─────────────┐    │
//! │  │                    RendezvousEngine                           │    │
//! │  │  ┌─────────────────────────────────────────────────────────┐ │    │
//! │  │  │ CorrelationStore (one mutex)                            │ │    │
//! │  │  │  current request │ response waiters │ fetch waiters     │ │    │
//! │  │  └─────────────────────────────────────────────────────────┘ │    │
//! │  └──────────────────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sync_broker::{BrokerConfig, SyncService};
//!
//! let service = SyncService::new(BrokerConfig::default())?;
//! service.run_stdio(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports for public API
pub use adapters::{router, McpServer, RESPOND_TOOL, WATCH_TOOL};
pub use domain::config::BrokerConfig;
pub use domain::engine::{cleanup_task, RendezvousEngine};
pub use domain::error::{ApiError, BrokerError, BrokerResult};
pub use domain::types::*;
pub use domain::RequestId;
pub use ports::RendezvousApi;
pub use service::{ServiceError, SyncService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_tool_names() {
        assert_eq!(WATCH_TOOL, "playground_watch");
        assert_eq!(RESPOND_TOOL, "playground_respond");
    }
}
