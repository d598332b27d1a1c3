//! HTTP ingress for the broker node.
//!
//! - `POST /` takes `{channel_id, payload}` and answers `{"response": ...}` or
//!   `{"error": ...}`
//! - `GET /health`, `GET /metrics`
//! - `GET /weights` returns a read-only snapshot of scores and counters

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use relay_core::{
    broker::BrokerError,
    config::AppConfig,
    ingress::{reply_for, INTERNAL_ERROR},
    runtime::RelayComponents,
    types::{RelayReply, RelayRequest},
};
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer};
use tracing::warn;

use crate::middleware::{create_request_id_layers, trace_layer};

/// Request body cap for `POST /`.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct BrokerAppState {
    pub components: RelayComponents,
    pub request_timeout: Duration,
}

impl BrokerAppState {
    #[must_use]
    pub fn new(components: RelayComponents, config: &AppConfig) -> Self {
        Self { components, request_timeout: config.request_timeout() }
    }
}

/// Status code a broker failure is reported with.
#[must_use]
pub fn status_for(error: &BrokerError) -> StatusCode {
    match error {
        BrokerError::InvalidRequest(_) | BrokerError::UnsupportedChannel(_) => {
            StatusCode::BAD_REQUEST
        }
        BrokerError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
        BrokerError::NoUsableResponse => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn handle_relay(
    State(state): State<BrokerAppState>,
    body: Result<Json<RelayRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let error = BrokerError::InvalidRequest(rejection.body_text());
            return (status_for(&error), Json(reply_for(Err(error)))).into_response();
        }
    };

    let serve = state.components.broker().serve(&request.channel_id, &request.payload);
    let result = match tokio::time::timeout(state.request_timeout, serve).await {
        Ok(result) => result,
        Err(_) => {
            warn!(channel = %request.channel_id, "request exceeded the ingress timeout");
            return (
                StatusCode::GATEWAY_TIMEOUT,
                Json(RelayReply::Error(INTERNAL_ERROR.to_string())),
            )
                .into_response();
        }
    };

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };
    (status, Json(reply_for(result))).into_response()
}

pub async fn handle_health(State(state): State<BrokerAppState>) -> impl IntoResponse {
    let directory = state.components.directory();
    let peers = directory.roster().len();

    let health_status = serde_json::json!({
        "status": if peers > 0 { "healthy" } else { "unhealthy" },
        "self_uid": directory.self_id().uid(),
        "peers": peers,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (
        if peers > 0 { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE },
        Json(health_status),
    )
}

pub async fn handle_metrics(State(state): State<BrokerAppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.components.metrics_collector().render(),
    )
}

/// Scores and counters as they stand; reading them does not advance the EMA.
pub async fn handle_weights(State(state): State<BrokerAppState>) -> impl IntoResponse {
    Json(state.components.tracker().standings())
}

/// Builds the broker's router with request ids, concurrency limit, body cap and gzip.
#[must_use]
pub fn create_broker_app(state: BrokerAppState, config: &AppConfig) -> Router {
    let (set_request_id, propagate_request_id) = create_request_id_layers();

    let mut public = Router::new()
        .route("/health", get(handle_health))
        .route("/weights", get(handle_weights));
    if config.metrics.enabled {
        public = public.route("/metrics", get(handle_metrics));
    }
    let public = public.with_state(state.clone());

    let relay = Router::new()
        .route("/", post(handle_relay))
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new());

    public
        .merge(relay)
        .layer(trace_layer())
        .layer(propagate_request_id)
        .layer(set_request_id)
}
