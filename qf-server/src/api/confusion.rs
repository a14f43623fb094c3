//! Confusion endpoints
//!
//! Stats are best-effort: a snapshot that cannot be computed is rendered as
//! zeros rather than an error.

use axum::{
    extract::{Path, State},
    Json,
};
use qf_common::models::ConfusionSnapshot;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{ApiError, ApiJson};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordConfusionRequest {
    pub student_id: String,
    pub student_name: Option<String>,
    pub level: i64,
}

/// POST /api/sessions/:id/confusion
pub async fn record_confusion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<RecordConfusionRequest>,
) -> Result<Json<Value>, ApiError> {
    let session_id = state.codes.resolve(&id).map_err(ApiError::submission)?;
    let outcome = state
        .confusion
        .record(&session_id, &request.student_id, request.student_name, request.level)
        .await
        .map_err(ApiError::submission)?;

    let stats = outcome.snapshot.unwrap_or_else(|_| ConfusionSnapshot::zero());
    Ok(Json(json!({
        "success": true,
        "confusion": outcome.reading,
        "stats": stats,
    })))
}

/// GET /api/sessions/:id/confusion
pub async fn get_confusion(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    let stats = match state.codes.resolve(&id) {
        Ok(session_id) => state.confusion.snapshot(&session_id).await.unwrap_or_else(|e| {
            warn!(session_id = %session_id, error = %e, "confusion stats unavailable, returning zeros");
            ConfusionSnapshot::zero()
        }),
        Err(e) => {
            warn!(id = %id, error = %e, "confusion stats requested for unresolved session");
            ConfusionSnapshot::zero()
        }
    };
    Json(json!({ "success": true, "stats": stats }))
}
