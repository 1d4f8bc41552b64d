use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /health`: liveness check.
///
/// Response shape:
/// ```json
/// { "status": "ok", "version": "0.1.0", "bursts": 2 }
/// ```
/// `bursts` counts keys currently held in memory, armed or waiting for
/// eviction.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "bursts": state.store.len().await,
        })),
    )
}
