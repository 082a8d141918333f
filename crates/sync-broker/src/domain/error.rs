//! Broker error types.
//!
//! `BrokerError` is what the engine returns. `ApiError` carries a JSON-RPC 2.0
//! code for the consumer protocol.

use crate::domain::correlation::RequestId;
use serde::Serialize;
use std::fmt;

/// Standard JSON-RPC 2.0 error codes
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Errors produced by the rendezvous engine and its adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The submission surface received input it could not parse.
    #[error("malformed submission: {0}")]
    MalformedSubmission(String),

    /// No response waiter and no current request match the id.
    #[error("request {request_id} not found")]
    UnknownRequestId {
        request_id: RequestId,
        /// Whatever request is currently pending, for diagnostics.
        pending_id: Option<RequestId>,
    },

    /// The waiter was dropped by the broker without an answer.
    #[error("request {0} was abandoned before an answer arrived")]
    Abandoned(RequestId),
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Parse error - invalid JSON
    pub fn parse_error(details: impl Into<String>) -> Self {
        Self::new(
            codes::PARSE_ERROR,
            format!("Parse error: {}", details.into()),
        )
    }

    /// Invalid params
    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_PARAMS,
            format!("Invalid params: {}", details.into()),
        )
    }

    /// Unknown protocol method. Reported with the internal error code, which is
    /// what existing consumers of this protocol expect.
    pub fn unknown_method(method: &str) -> Self {
        Self::new(codes::INTERNAL_ERROR, format!("Unknown method: {}", method))
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            codes::INTERNAL_ERROR,
            format!("Internal error: {}", details.into()),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_eof() {
            ApiError::parse_error(e.to_string())
        } else {
            ApiError::invalid_params(e.to_string())
        }
    }
}

/// Result type for engine operations
pub type BrokerResult<T> = Result<T, BrokerError>;
