//! HTTP read endpoint for the metrics rollup.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};

use convertly_types::MetricsSnapshot;

use crate::aggregator::Aggregator;

/// Build the router serving the snapshot and the liveness probe.
///
/// Handlers only ever take the aggregator's read path, so they are never
/// blocked behind the consumer loop.
pub fn router(aggregator: Arc<Aggregator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/metrics", get(get_metrics))
        .route("/health", get(health))
        .layer(cors)
        .with_state(aggregator)
}

/// `GET /metrics` - the current rollup.
async fn get_metrics(State(aggregator): State<Arc<Aggregator>>) -> Json<MetricsSnapshot> {
    Json(aggregator.snapshot())
}

/// `GET /health` - fixed-response liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
