//! Persona Relay
//!
//! Streams model output from the Responses API to WebSocket clients, either
//! raw or re-voiced as one or more personas. The binary in `main.rs` only
//! loads configuration and serves [`build_router`].
//!
//! Trust assumptions: CORS is fully permissive, and persona ids are
//! interpolated into prompts verbatim.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use responses_stream::Upstream;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod pacing;
pub mod persona;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod ws;

pub use error::RelayError;
pub use pacing::{PacingPolicy, PacingUnit};
pub use protocol::{ClientRequest, ServerMessage};
pub use relay::Relay;

use crate::metrics::ServerMetrics;
use crate::ws::{ConnectionLimits, ConnectionRegistry};

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn Upstream>,
    pub relay: Arc<Relay>,
    /// Live WebSocket connections
    pub registry: Arc<ConnectionRegistry>,
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        pacing: PacingPolicy,
        limits: ConnectionLimits,
    ) -> Self {
        let metrics = Arc::new(ServerMetrics::new());
        let relay = Relay::new(upstream.clone(), pacing).with_metrics(metrics.clone());
        Self {
            upstream,
            relay: Arc::new(relay),
            registry: Arc::new(ConnectionRegistry::new(limits)),
            metrics,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/ws", get(handlers::websocket_handler))
        .route("/chat", post(handlers::chat_handler))
        .route("/multi", post(handlers::multi_handler))
        .route("/openai-chat", post(handlers::openai_chat_handler))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
