mod handlers;
pub(crate) mod responses;

use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete API router.
pub(crate) fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/status", get(handlers::get_status))
        // Diskgroup operations
        .route("/api/diskgroup/{op}", post(handlers::start_operation))
        .route("/api/operations", get(handlers::list_operations))
        .route("/api/operations/cancel", post(handlers::cancel_operation))
        .route("/api/operations/{operation_id}", get(handlers::get_operation))
        // Cluster store
        .route("/api/cluster/diskgroups", get(handlers::get_diskgroups).post(handlers::register_diskgroup))
        .route("/api/settings", get(handlers::get_settings).post(handlers::update_settings))
        .route("/api/events", get(handlers::event_stream))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
