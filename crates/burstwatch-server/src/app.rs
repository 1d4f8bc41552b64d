use std::sync::Arc;

use axum::{
    http::{Method, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order (outermost runs first on
/// request, last on response):
///
/// 1. `preflight_no_content`: rewrites the CORS layer's `200` preflight
///    answer to `204 No Content`.
/// 2. `CorsLayer`: permissive CORS, since the tracker script runs on other
///    origins. Answers every `OPTIONS` request itself.
/// 3. `TraceLayer`: structured request/response logging via `tracing`.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/alert",
            get(routes::alert::collect_get).post(routes::alert::collect_beacon),
        )
        .route(
            "/api/ping",
            get(routes::ping::page_view).post(routes::ping::page_view),
        )
        .route("/api/selftest", get(routes::selftest::selftest))
        .route("/go", get(routes::go::tracked_link))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(middleware::map_response(preflight_no_content))
        .with_state(state)
}

async fn preflight_no_content(method: Method, mut response: Response) -> Response {
    if method == Method::OPTIONS && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}
