//! Router assembly: HTTP endpoints, WebSocket upgrades, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - Quiz WebSocket at `/ws?profile=…`, voice bridge at `/ws/voice?profile=…`
/// - REST-ish API under `/api/v1/...`, per-profile routes under `/api/v1/p/:profile`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        .route("/ws/voice", get(ws::voice_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/share", get(http::http_get_shared))
        .route("/api/v1/p/:profile/quiz", get(http::http_get_quiz))
        .route("/api/v1/p/:profile/quiz/start", post(http::http_post_start))
        .route("/api/v1/p/:profile/quiz/restart", post(http::http_post_start))
        .route("/api/v1/p/:profile/quiz/exit", post(http::http_post_exit))
        .route("/api/v1/p/:profile/quiz/previous", post(http::http_post_previous))
        .route("/api/v1/p/:profile/quiz/options", get(http::http_get_options))
        .route("/api/v1/p/:profile/quiz/answer", post(http::http_post_answer))
        .route("/api/v1/p/:profile/results", get(http::http_get_results))
        .route("/api/v1/p/:profile/results/report", post(http::http_post_report))
        .route("/api/v1/p/:profile/results/save", post(http::http_post_save))
        .route("/api/v1/p/:profile/results/saved", get(http::http_get_saved))
        .route("/api/v1/p/:profile/results/saved/:timestamp", delete(http::http_delete_saved))
        .route("/api/v1/p/:profile/results/share", get(http::http_get_share_link))
        .route("/api/v1/p/:profile/results/export", get(http::http_get_export))
        .route(
            "/api/v1/p/:profile/settings",
            get(http::http_get_settings).put(http::http_put_settings),
        )
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
