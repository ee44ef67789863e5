pub mod auth;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod repo;
pub mod session_actor;
pub mod state;

pub use state::AppState;

use axum::http::HeaderValue;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{http::StatusCode, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/network-info", get(http::network::network_info))
        .route(
            "/api/sessions",
            get(http::sessions::list_sessions).post(http::sessions::create_session),
        )
        .route("/api/sessions/join", post(http::join::join_session))
        .route(
            "/api/sessions/by-code/:code",
            get(http::sessions::get_session_by_code),
        )
        .route(
            "/api/sessions/:session_id",
            get(http::sessions::get_session).delete(http::sessions::delete_session),
        )
        .route(
            "/api/sessions/:session_id/status",
            get(http::sessions::session_status),
        )
        .route(
            "/api/sessions/:session_id/finish",
            post(http::sessions::finish_session),
        )
        .route(
            "/api/sessions/:session_id/leaderboard",
            get(http::sessions::leaderboard),
        )
        .route(
            "/api/sessions/:session_id/export",
            get(http::export::export_csv),
        )
        .route(
            "/api/sessions/:session_id/analytics",
            get(http::analytics::session_analytics),
        )
        .route(
            "/api/sessions/:session_id/qrcode",
            get(http::qrcode::session_qrcode),
        )
        .route("/ws/session/:session_id", get(http::ws::ws_session))
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html("<h1>404 Not Found</h1>"))
}
