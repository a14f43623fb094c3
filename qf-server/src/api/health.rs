//! Liveness and readiness report
//!
//! `GET /health` answers 200 while the store accepts queries and 503 once it
//! stops doing so, together with the live room and connection counts.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub active_rooms: usize,
    pub connections: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let database_ok = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Health check: database unreachable: {}", e);
            false
        }
    };

    let report = HealthReport {
        status: if database_ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database: if database_ok { "reachable" } else { "unreachable" },
        active_rooms: state.rooms.room_count(),
        connections: state.rooms.connection_count(),
    };
    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
