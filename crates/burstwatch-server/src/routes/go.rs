use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::{decode::extract_client_ip, error::AppError, state::AppState};

/// `GET /go`: tracked link.
///
/// Sends an immediate, non-aggregated notification and redirects with `302`
/// to the configured destination. The redirect happens even when no sink is
/// configured or the notification fails, so the link keeps working.
#[tracing::instrument(skip(state, headers))]
pub async fn tracked_link(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let destination = state.config.redirect_url.clone();
    let location = HeaderValue::from_str(&destination)
        .map_err(|e| anyhow!("invalid redirect url {destination:?}: {e}"))?;

    match state.sink.clone() {
        Some(sink) => {
            let payload = json!({ "content": click_message(&headers, &destination) });
            tokio::spawn(async move {
                if let Err(e) = sink.send(&payload).await {
                    tracing::warn!(error = %e, "Tracked-link notification failed");
                }
            });
        }
        None => tracing::warn!("Tracked link clicked but no notification sink is configured"),
    }

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]))
}

fn click_message(headers: &HeaderMap, destination: &str) -> String {
    format!(
        "🔔 **Tracked link clicked**\n\
         • **Time**: {}\n\
         • **IP**: {}\n\
         • **User-Agent**: {}\n\
         • **Referrer**: {}\n\
         • **Redirecting to**: {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        extract_client_ip(headers),
        header_or(headers, header::USER_AGENT, "unknown"),
        header_or(headers, header::REFERER, "none"),
        destination
    )
}

fn header_or(headers: &HeaderMap, name: header::HeaderName, default: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}
