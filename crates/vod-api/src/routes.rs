//! Route table.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, videos};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/videos",
            post(videos::upload_videos).get(videos::list_videos),
        )
        .route(
            "/api/videos/:id",
            get(videos::get_video).delete(videos::delete_video),
        )
        .route("/api/videos/:id/variants", get(videos::list_variants))
        .route("/api/videos/:id/download", get(videos::download_video))
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
