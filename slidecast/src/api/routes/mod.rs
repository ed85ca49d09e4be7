//! API route modules.
//!
//! Organizes routes by resource type.

pub mod health;
pub mod job;
pub mod media;
pub mod render;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/render", render::router())
        .nest("/api/jobs", job::router())
        .nest("/api/videos", media::router())
        .nest("/api/health", health::router())
        .with_state(state)
}
