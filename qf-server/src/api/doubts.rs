//! Doubt endpoints: submit, list, answer, upvote

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, ApiJson};
use crate::db::doubts::DoubtFilter;
use crate::services::DoubtSubmission;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitDoubtRequest {
    pub question: String,
    pub student_id: String,
    pub student_name: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub confusion_level: Option<i64>,
}

/// `?answered=` matches the literal string "true"; any other value means
/// unanswered
#[derive(Debug, Deserialize)]
pub struct DoubtListQuery {
    pub answered: Option<String>,
    pub topic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpvoteRequest {
    pub student_id: String,
}

/// POST /api/sessions/:id/doubts
pub async fn submit_doubt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<SubmitDoubtRequest>,
) -> Result<Json<Value>, ApiError> {
    let session_id = state.codes.resolve(&id).map_err(ApiError::submission)?;
    let outcome = state
        .doubts
        .submit(
            &session_id,
            DoubtSubmission {
                question: request.question,
                student_id: request.student_id,
                student_name: request.student_name,
                is_anonymous: request.is_anonymous,
                confusion_level: request.confusion_level,
            },
        )
        .await
        .map_err(ApiError::submission)?;

    Ok(Json(json!({
        "success": true,
        "doubt": outcome.doubt,
        "merged": outcome.merged,
    })))
}

/// GET /api/sessions/:id/doubts?answered=&topic=
pub async fn list_doubts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DoubtListQuery>,
) -> Result<Json<Value>, ApiError> {
    let session_id = state.codes.resolve(&id)?;
    let filter = DoubtFilter {
        answered: query.answered.map(|value| value == "true"),
        topic: query.topic.filter(|t| !t.is_empty()),
    };
    let doubts = state.doubts.list(&session_id, &filter).await?;
    let count = doubts.len();

    Ok(Json(json!({ "success": true, "doubts": doubts, "count": count })))
}

/// PATCH /api/doubts/:id/answer
pub async fn answer_doubt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<AnswerRequest>>,
) -> Result<Json<Value>, ApiError> {
    let answer = request.and_then(|Json(body)| body.answer);
    let doubt = state.doubts.mark_answered(&id, answer.as_deref()).await?;
    Ok(Json(json!({ "success": true, "doubt": doubt })))
}

/// PATCH /api/doubts/:id/upvote
pub async fn upvote_doubt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpvoteRequest>,
) -> Result<Json<Value>, ApiError> {
    let doubt = state.doubts.toggle_upvote(&id, &request.student_id).await?;
    Ok(Json(json!({ "success": true, "doubt": doubt })))
}
