//! Route definitions for the API server

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Creates the main application router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    // The dashboard is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/symbols", get(handlers::list_symbols))
        .route("/symbols/:symbol/trend", get(handlers::get_trend))
        .route("/accumulation", get(handlers::get_accumulation))
        .route("/screener", get(handlers::get_screener))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
