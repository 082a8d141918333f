//! Submission surface - blocking HTTP endpoint for submitters.
//!
//! | Route | Behavior |
//! |-------|----------|
//! | `POST /prompt` | submit and block until the consumer answers |
//! | `GET /status` | broker status snapshot |
//! | `GET /health` | liveness |
//!
//! Anything else answers 404. Every `OPTIONS` request, preflight or not, is
//! answered by the CORS layer with an empty 200.

use crate::adapters::cors::create_cors_layer;
use crate::domain::config::BrokerConfig;
use crate::domain::error::{BrokerError, BrokerResult};
use crate::domain::types::Submission;
use crate::ports::RendezvousApi;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared across HTTP handlers
#[derive(Clone)]
struct HttpState {
    broker: Arc<dyn RendezvousApi>,
    submit_timeout: Option<Duration>,
}

/// Build the submission router
pub fn router(broker: Arc<dyn RendezvousApi>, config: &BrokerConfig) -> Router {
    let state = HttpState {
        broker,
        submit_timeout: config.http.submit_timeout,
    };

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer(&config.cors));

    Router::new()
        .route("/prompt", post(submit_prompt).fallback(not_found))
        .route("/status", get(status).fallback(not_found))
        .route("/health", get(health_check).fallback(not_found))
        .fallback(not_found)
        .layer(middleware)
        .with_state(state)
}

/// Parse a submission body. An empty body is an empty submission.
pub fn parse_submission(body: &[u8]) -> BrokerResult<Submission> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Submission::default());
    }
    serde_json::from_slice(body).map_err(|e| BrokerError::MalformedSubmission(e.to_string()))
}

async fn submit_prompt(State(state): State<HttpState>, body: Bytes) -> Response {
    let submission = match parse_submission(&body) {
        Ok(submission) => submission,
        Err(e) => {
            warn!(error = %e, "Rejected submission");
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    info!(
        action = %submission.action,
        subject_id = %submission.subject_id,
        "Prompt received"
    );

    let pending = state.broker.submit(submission);
    let result = match state.submit_timeout {
        Some(limit) => match tokio::time::timeout(limit, pending).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    "Submitter gave up waiting for an answer"
                );
                return error_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    "Timed out waiting for response",
                );
            }
        },
        None => pending.await,
    };

    match result {
        Ok(answer) => (StatusCode::OK, Json(json!({ "content": answer.content }))).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn status(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.broker.status())
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
