//! REST API facade for the engagement engine
//!
//! Thin axum layer exposing the reconciliation operations and an SSE event
//! stream to view bindings.

pub mod handlers;
pub mod sse;

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::InteractionEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Reconciliation engine
    pub engine: InteractionEngine,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))
        // API v1 routes
        .nest(
            "/api/v1",
            Router::new()
                // Like state and toggling
                .route(
                    "/subjects/:subject_id/interactions",
                    get(handlers::get_interaction_state),
                )
                .route("/likes/toggle", post(handlers::toggle_like))
                // Comments
                .route("/subjects/:subject_id/comments", get(handlers::get_comments))
                .route("/comments", post(handlers::add_comment))
                .route("/comments/:comment_id", delete(handlers::delete_comment))
                // SSE events
                .route("/events", get(sse::event_stream)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "st-engage",
        "version": env!("CARGO_PKG_VERSION"),
        "subscribers": state.engine.subscriber_count(),
    }))
}
