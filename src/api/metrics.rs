//! Operational endpoints
//!
//! - GET /health
//! - GET /metrics (Prometheus text format)

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;
use crate::metrics::{CACHE_SIZE, REGISTRY};

/// Create operational router
pub fn ops_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
}

async fn health_check() -> &'static str {
    "OK"
}

/// GET /metrics
///
/// Syncs the cache size gauge before encoding.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let stats = state.cache.stats().await;
    CACHE_SIZE
        .with_label_values(&[state.cache.name()])
        .set(stats.total_entries as i64);

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            metrics_text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
