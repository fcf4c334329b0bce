use axum::http::StatusCode;
use axum::response::{IntoResponse, Json as AxumJson, Response};
use serde_json::json;

/// Errors a submitter (or admin caller) can receive at the HTTP boundary.
/// Duplicates are distinct from validation so clients can render
/// "already submitted" instead of "invalid input".
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(String),

    #[error("transaction {0} has already been submitted")]
    DuplicateTransaction(String),

    #[error("receipt extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            SubmitError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            SubmitError::DuplicateTransaction(_) => {
                (StatusCode::CONFLICT, "duplicate_transaction", self.to_string())
            }
            SubmitError::Extraction(_) => (StatusCode::BAD_GATEWAY, "extraction_failed", self.to_string()),
            SubmitError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        (status, AxumJson(json!({ "error": code, "message": message }))).into_response()
    }
}
