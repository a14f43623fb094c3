//! HTTP API handlers for qf-server

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

pub mod confusion;
pub mod doubts;
pub mod health;
pub mod sessions;
pub mod sse;
pub mod ws;

pub use confusion::{get_confusion, record_confusion};
pub use doubts::{answer_doubt, list_doubts, submit_doubt, upvote_doubt};
pub use health::health_routes;
pub use sessions::{create_session, end_session, get_session, list_sessions};
pub use sse::session_event_stream;
pub use ws::ws_handler;

/// Error body returned by every failing endpoint
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    /// Submission endpoints report an unresolved session as a bad request
    pub fn submission(err: qf_common::Error) -> Self {
        let mut api_error = Self::from(err);
        if api_error.status == StatusCode::NOT_FOUND {
            api_error.status = StatusCode::BAD_REQUEST;
        }
        api_error
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<qf_common::Error> for ApiError {
    fn from(err: qf_common::Error) -> Self {
        use qf_common::Error;

        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AmbiguousCode(_) | Error::InvalidState(_) | Error::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                error!("Request failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// JSON body extractor whose rejections use the common error body
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
        }));

        (self.status, body).into_response()
    }
}
