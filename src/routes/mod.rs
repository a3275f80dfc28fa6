//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use axum::{
    routing::{get, post},
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
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) for the classroom LAN setup
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: AppState) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route(
            "/api/v1/questions",
            get(http::http_list_questions).post(http::http_create_question),
        )
        .route("/api/v1/questions/export", get(http::http_export_questions))
        .route("/api/v1/questions/import", post(http::http_import_questions))
        .route(
            "/api/v1/questions/:id",
            axum::routing::put(http::http_update_question).delete(http::http_delete_question),
        )
        .route(
            "/api/v1/students",
            get(http::http_list_students).post(http::http_create_student),
        )
        .route("/api/v1/students/export", get(http::http_export_students))
        .route("/api/v1/students/import", post(http::http_import_students))
        .route("/api/v1/students/reset-scores", post(http::http_reset_scores))
        .route(
            "/api/v1/students/:id",
            axum::routing::put(http::http_update_student).delete(http::http_delete_student),
        )
        .route("/api/v1/students/:id/add-points", post(http::http_add_points))
        .route(
            "/api/v1/import",
            get(http::http_import_status).delete(http::http_cancel_import),
        )
        .route("/api/v1/import/duplicates", post(http::http_resolve_duplicates))
        .route("/api/v1/import/conflict", post(http::http_resolve_conflict))
        .route(
            "/api/v1/settings",
            get(http::http_get_settings).put(http::http_put_settings),
        )
        .route("/api/v1/game", get(http::http_game_state))
        .route("/api/v1/game/roll", post(http::http_roll))
        .route("/api/v1/game/answer", post(http::http_submit_answer))
        .route("/api/v1/game/student", post(http::http_select_student))
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
