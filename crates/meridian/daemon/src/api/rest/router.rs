//! API Router configuration

use super::auth;
use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let limits = state.limits;

    Router::new()
        // Probes
        .route("/health", get(handlers::health_check))
        .route("/info", get(handlers::info))
        // Registry
        .route("/instances", get(handlers::list_instances))
        .route("/instances/:service", get(handlers::get_service_instances))
        .route(
            "/instances/:service/:id",
            put(handlers::register_instance)
                .get(handlers::get_instance)
                .delete(handlers::deregister_instance),
        )
        .route("/instances/:service/:id/renew", put(handlers::renew_instance))
        .route(
            "/instances/:service/:id/status",
            put(handlers::set_instance_status),
        )
        // Config
        .route("/config/:application/:profiles", get(handlers::get_config))
        .route(
            "/config/:application/:profiles/:label",
            get(handlers::get_labelled_config),
        )
        // Peers
        .route("/replication/batch", post(handlers::receive_batch))
        // Middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::access_gate,
        ))
        .layer(DefaultBodyLimit::max(limits.max_body_size))
        .layer(TimeoutLayer::new(limits.request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
