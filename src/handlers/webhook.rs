//! Inbound webhook endpoint.
//!
//! The one handler that must see the request body as raw bytes: signature
//! verification covers the bytes the processor signed, so the body is
//! passed to the reconciler before any parsing. Response contract:
//!
//! - `200 {"received": true}` - applied or deliberately ignored
//! - `400` - verification failure or malformed payload; the processor must
//!   not retry
//! - `500` - processing failure; the processor redelivers and the writer's
//!   idempotency absorbs the duplicate

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{HeaderMap, StatusCode};
use serde_json::json;

use super::AppState;
use crate::billing::Receipt;
use crate::error::Error;

/// Webhook endpoint handler.
///
/// # Route
/// `POST /api/webhook`
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    state.runtime.record_webhook();

    let signature = headers
        .get(state.reconciler.signature_header())
        .and_then(|value| value.to_str().ok());

    let result = state.reconciler.process(&body, signature).await;
    state.runtime.record_latency(started.elapsed());

    match result {
        Ok(receipt) => {
            match receipt {
                Receipt::Applied(_) => state.runtime.record_applied(),
                Receipt::Ignored { .. } => state.runtime.record_ignored(),
            };
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        Err(e) => {
            state.runtime.record_error();
            Error::Webhook(e).into_response()
        }
    }
}
