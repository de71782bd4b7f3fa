use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{aggregation::InvalidPeriod, pipeline::IngestError, store::StoreError};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("authentication credentials were not provided or are invalid")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    InvalidPeriod(#[from] InvalidPeriod),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Ingest(IngestError::Store(_) | IngestError::OwnerMismatch { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::BadRequest(_) | ApiError::Ingest(_) | ApiError::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
