use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use burstwatch_core::{event::BeaconPayload, sink::SinkError};

use crate::{decode::extract_client_ip, error::AppError, state::AppState};

pub const PAGE_VIEW_TITLE: &str = "Page view";
pub const PAGE_VIEW_COLOR: u32 = 0x8888FF;

/// `GET|POST /api/ping`: immediate page-view notification, no aggregation.
///
/// The path comes from the JSON body's `path`, then the `x-pathname` header,
/// else `unknown`. A sink rejection is logged and still answers `204`; a
/// transport failure answers `500`.
#[tracing::instrument(skip(state, headers, body))]
pub async fn page_view(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let sink = state.sink.as_ref().ok_or(AppError::SinkNotConfigured)?;

    let body = BeaconPayload::parse_body(&body).unwrap_or_else(|_| json!({}));
    let path = BeaconPayload::from_value(&body)
        .path
        .or_else(|| {
            headers
                .get("x-pathname")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string());

    match sink.send(&page_view_payload(&headers, &path)).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(SinkError::Rejected { status }) => {
            tracing::warn!(status, "Page-view notification rejected");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => Err(AppError::Internal(anyhow!("page-view notification failed: {e}"))),
    }
}

fn page_view_payload(headers: &HeaderMap, path: &str) -> Value {
    let referrer = headers
        .get(axum::http::header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("none");
    json!({
        "embeds": [{
            "title": PAGE_VIEW_TITLE,
            "color": PAGE_VIEW_COLOR,
            "fields": [
                { "name": "Time", "value": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true), "inline": false },
                { "name": "Path", "value": path, "inline": true },
                { "name": "IP", "value": extract_client_ip(headers), "inline": true },
                { "name": "Referrer", "value": referrer, "inline": false },
            ]
        }]
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn payload_carries_path_ip_and_referrer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.4, 10.0.0.1"));

        let payload = page_view_payload(&headers, "/pricing");
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "Page view");
        assert_eq!(embed["color"], 0x8888FF);
        let fields = embed["fields"].as_array().expect("fields");
        let names: Vec<&str> = fields.iter().filter_map(|f| f["name"].as_str()).collect();
        assert_eq!(names, ["Time", "Path", "IP", "Referrer"]);
        assert_eq!(fields[1]["value"], "/pricing");
        assert_eq!(fields[2]["value"], "198.51.100.4");
        assert_eq!(fields[3]["value"], "none");
    }
}
