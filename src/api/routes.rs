//! API route definitions

use super::board_handlers;
use super::handlers::{self, BoardState};
use super::ws_handlers;
use crate::auth::middleware::require_auth;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: BoardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // ====================================================================
        // Plans
        // ====================================================================
        .route("/api/plans", post(board_handlers::create_plan))
        .route("/api/plans/{plan_id}", get(board_handlers::get_board))
        // ====================================================================
        // Tabs
        // ====================================================================
        .route(
            "/api/plans/{plan_id}/tabs",
            get(board_handlers::list_tabs).post(board_handlers::create_tab),
        )
        .route(
            "/api/plans/{plan_id}/tabs/{tab_id}",
            axum::routing::patch(board_handlers::rename_tab).delete(board_handlers::delete_tab),
        )
        .route(
            "/api/plans/{plan_id}/tabs/{tab_id}/position",
            put(board_handlers::reorder_tab),
        )
        // ====================================================================
        // Tasks
        // ====================================================================
        .route(
            "/api/tabs/{tab_id}/tasks",
            get(board_handlers::list_tasks).post(board_handlers::create_task),
        )
        .route(
            "/api/tabs/{tab_id}/tasks/{task_id}",
            axum::routing::patch(board_handlers::update_task).delete(board_handlers::delete_task),
        )
        .route(
            "/api/tabs/{tab_id}/tasks/{task_id}/position",
            put(board_handlers::reorder_task),
        )
        // ====================================================================
        // Event feed
        // ====================================================================
        .route("/ws/events", get(ws_handlers::ws_events))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
