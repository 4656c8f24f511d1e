//! Assembles every domain router under the `/api` prefix.

use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::shared::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", crate::auth::routes())
        .nest("/api/tickets", crate::tickets::configure_ticket_routes())
        .nest(
            "/api/knowledge",
            crate::knowledge::configure_knowledge_routes(),
        )
        .nest(
            "/api/monitoring",
            crate::monitoring::configure_monitoring_routes(),
        )
        .nest("/api/boards", crate::boards::configure_board_routes())
        .nest(
            "/api/appointments",
            crate::appointments::configure_appointment_routes(),
        )
        .nest(
            "/api/companies",
            crate::companies::configure_company_routes(),
        )
        .nest("/api/teams", crate::teams::configure_team_routes())
        .nest(
            "/api/analytics",
            crate::analytics::configure_analytics_routes(),
        )
        .nest("/api/portal", crate::portal::configure_portal_routes())
}
