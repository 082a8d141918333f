//! Domain layer of the rendezvous broker.
//!
//! Pure state and synchronization: no sockets, no stdio.

pub mod config;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod store;
pub mod types;

pub use config::{BrokerConfig, ConfigError};
pub use correlation::RequestId;
pub use engine::{cleanup_task, RendezvousEngine};
pub use error::{ApiError, BrokerError, BrokerResult};
pub use store::{CorrelationStore, StoreStats, SweepReport};
pub use types::*;
