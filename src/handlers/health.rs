// src/handlers/health.rs
use crate::AppState;
use axum::{extract::Extension, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn health_routes() -> Router {
    Router::new().route("/health", get(health))
}

/// Liveness plus store reachability. Unauthenticated.
async fn health(Extension(state): Extension<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let store_ok = state.store.healthy().await;
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if store_ok { "ok" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "store": if store_ok { "up" } else { "down" },
            "connections": state.gateway.registry().connection_count().await,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
