//! Ports for the rendezvous broker.
//!
//! - `inbound`: the API the transport adapters drive
//! - `outbound`: what the engine needs from its environment

pub mod inbound;
pub mod outbound;

pub use inbound::RendezvousApi;
pub use outbound::{SystemTimeSource, TimeSource};
