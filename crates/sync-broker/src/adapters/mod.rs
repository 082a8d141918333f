//! Transport adapters.
//!
//! - `http`: blocking submission surface for browsers
//! - `mcp`: line-delimited JSON-RPC consumer surface
//! - `cors`: CORS layer for the HTTP surface

pub mod cors;
pub mod http;
pub mod mcp;

pub use cors::create_cors_layer;
pub use http::router;
pub use mcp::{McpServer, RESPOND_TOOL, WATCH_TOOL};
