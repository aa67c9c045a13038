//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST API routes over the balance engine
//! - Error to HTTP response mapping
//! - Request and response views

pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use purse_core::wallet::BalanceEngine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Balance engine.
    pub engine: Arc<BalanceEngine>,
}

/// Creates the main application router.
///
/// A request running longer than `request_timeout` is answered with 408 and its
/// engine call is dropped, rolling back any open unit of work.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
