//! Session directory endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use qf_common::models::SessionSettings;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, ApiJson};
use crate::services::NewSession;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub title: String,
    pub instructor_name: Option<String>,
    pub settings: Option<SessionSettings>,
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let session = state
        .sessions
        .create(NewSession {
            title: request.title,
            instructor_name: request.instructor_name,
            settings: request.settings,
        })
        .await?;

    let code = session.code();
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "session": session, "code": code })),
    ))
}

/// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let sessions = state.sessions.list_active().await?;
    let count = sessions.len();
    Ok(Json(json!({ "success": true, "sessions": sessions, "count": count })))
}

/// GET /api/sessions/:id (identity or 6-character code)
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.get(&id).await?;
    let code = session.code();
    Ok(Json(json!({ "success": true, "session": session, "code": code })))
}

/// PATCH /api/sessions/:id/end
pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state.sessions.end(&id).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}
