//! HTTP endpoint of a worker peer.
//!
//! `POST /relay` takes a relay envelope and always answers one with exactly one of
//! `response` or `error` set. Callers outside `worker.allowed_uids` get `403`.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use relay_core::{
    config::AppConfig,
    transport::CALLER_HEADER,
    types::{PeerId, RelayEnvelope},
    worker::ChannelForwarder,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, warn};

use crate::middleware::{create_request_id_layers, trace_layer};

const MAX_BODY_BYTES: usize = 1024 * 1024;

fn caller_of(headers: &HeaderMap) -> Option<PeerId> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u16>().ok())
        .map(PeerId)
}

pub async fn handle_relay(
    State(forwarder): State<Arc<ChannelForwarder>>,
    headers: HeaderMap,
    Json(envelope): Json<RelayEnvelope>,
) -> Response {
    let caller = caller_of(&headers);
    if !forwarder.is_caller_allowed(caller) {
        warn!(caller = ?caller.map(PeerId::uid), "rejecting relay from unlisted caller");
        return (StatusCode::FORBIDDEN, Json(envelope.with_error("caller not allowed")))
            .into_response();
    }

    debug!(channel = %envelope.channel_id, caller = ?caller.map(PeerId::uid), "forwarding relay");
    Json(forwarder.handle(envelope).await).into_response()
}

pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[must_use]
pub fn create_worker_app(forwarder: Arc<ChannelForwarder>, config: &AppConfig) -> Router {
    let (set_request_id, propagate_request_id) = create_request_id_layers();

    Router::new()
        .route("/health", get(handle_health))
        .route("/relay", post(handle_relay))
        .with_state(forwarder)
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(trace_layer())
        .layer(propagate_request_id)
        .layer(set_request_id)
}
