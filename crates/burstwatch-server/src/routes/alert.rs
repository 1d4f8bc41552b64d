use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
};
use serde_json::{json, Value};

use burstwatch_core::{event::BeaconPayload, identity::key_digest};

use crate::{decode::decode_event, error::AppError, state::AppState};

/// `POST /api/alert`: accept one tracker beacon.
///
/// The body is optional JSON; a missing or malformed body is treated as `{}`.
/// The event is scored (bounded rDNS lookup included) and merged into its
/// burst before responding. Delivery happens later on the flush timer.
///
/// ## Response
/// `204 No Content`, or `500 sink_not_configured` without a webhook URL.
#[tracing::instrument(skip(state, headers, body))]
pub async fn collect_beacon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    if !state.sink_configured() {
        return Err(AppError::SinkNotConfigured);
    }

    let body = BeaconPayload::parse_body(&body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Malformed beacon body; treating as empty");
        json!({})
    });
    ingest(&state, &headers, &uri, body).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/alert`: image/no-body variant of the beacon. Responds `200 ok`.
#[tracing::instrument(skip(state, headers))]
pub async fn collect_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<impl IntoResponse, AppError> {
    if !state.sink_configured() {
        return Err(AppError::SinkNotConfigured);
    }

    ingest(&state, &headers, &uri, json!({})).await;
    Ok((StatusCode::OK, "ok"))
}

async fn ingest(state: &AppState, headers: &HeaderMap, uri: &Uri, body: Value) {
    let event = decode_event(headers, uri, body, state.geoip.as_ref());
    let score = state.scoring.score(&event).await;
    let key = event.identity.key();
    let outcome = state.store.ingest(event, score).await;
    tracing::debug!(key_digest = %key_digest(&key), outcome = ?outcome, "Beacon accepted");
}
