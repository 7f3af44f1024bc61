pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::agents::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Agent catalog
        .route(
            "/api/v1/agents",
            get(handlers::handle_list_agents).post(handlers::handle_create_agent),
        )
        .route(
            "/api/v1/agents/recommend",
            post(handlers::handle_recommend_agent),
        )
        .route(
            "/api/v1/agents/:id",
            get(handlers::handle_get_agent)
                .patch(handlers::handle_update_agent)
                .delete(handlers::handle_delete_agent),
        )
        .route(
            "/api/v1/agents/:id/statistics",
            get(handlers::handle_agent_statistics),
        )
        .route(
            "/api/v1/agents/:id/history",
            get(handlers::handle_agent_history),
        )
        // Analysis
        .route("/api/v1/agents/:id/analyze", post(handlers::handle_analyze))
        .route("/api/v1/analyze", post(handlers::handle_analyze_auto))
        .route(
            "/api/v1/usage/:id/rating",
            post(handlers::handle_rate_usage),
        )
        .with_state(state)
}
