//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Replication surface
        .route("/export", get(handlers::export))
        .route("/users/clock_status/{wallet}", get(handlers::clock_status))
        .route("/sync", post(handlers::trigger_sync))
        .route(
            "/async_processing_status",
            get(handlers::processing_status),
        )
        // Content byte-stream surface
        .route("/content/{cid}", get(handlers::get_content))
        .route(
            "/content/{cid}/{file_name}",
            get(handlers::get_content_in_dir),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
