use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::{error::AppError, state::AppState};

/// `GET /api/selftest`: push one plain message through the configured sink.
///
/// Always `200` once a sink exists; `ok` reports whether the sink accepted
/// the message.
#[tracing::instrument(skip(state))]
pub async fn selftest(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let sink = state.sink.as_ref().ok_or(AppError::SinkNotConfigured)?;

    let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let payload = json!({ "content": format!("✅ Self-test ping @ {ts}") });

    let body = match sink.send(&payload).await {
        Ok(()) => json!({
            "ok": true,
            "note": "Check the webhook channel for a self-test message.",
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Self-test delivery failed");
            json!({ "ok": false, "error": e.to_string() })
        }
    };
    Ok(Json(body))
}
