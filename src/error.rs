use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures surfaced by [`crate::service::ShortenService`].
///
/// "Already exists" is not in here: binding a code to the target it already
/// points at is a success, reported through `Shortened::created == false`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("alias '{0}' is already bound to a different url")]
    AliasTaken(String),

    #[error("not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::AliasTaken(_) => StatusCode::CONFLICT,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Storage(e) => {
                tracing::error!("Storage failure: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
