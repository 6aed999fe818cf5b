//! Structured API failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::detect::DetectError;
use crate::ingest::IngestError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("No file provided")]
    NoFile,

    #[error("No processed file available")]
    NoResultAvailable,

    #[error("invalid multipart upload: {0}")]
    Multipart(String),

    #[error("processing failed: {0}")]
    Processing(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Ingest(e) => e.kind(),
            ApiError::Detect(e) => e.kind(),
            ApiError::NoFile => "EmptyInput",
            ApiError::NoResultAvailable => "NoResultAvailable",
            ApiError::Multipart(_) => "MalformedInput",
            ApiError::Processing(_) => "ProcessingError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Ingest(_) | ApiError::NoFile | ApiError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Detect(DetectError::InsufficientLabelDiversity { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::NoResultAvailable => StatusCode::NOT_FOUND,
            ApiError::Detect(_) | ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "request rejected");
        }

        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_statuses() {
        let cases: Vec<(ApiError, &str, StatusCode)> = vec![
            (ApiError::Ingest(IngestError::EmptyInput), "EmptyInput", StatusCode::BAD_REQUEST),
            (
                ApiError::Ingest(IngestError::MissingRequiredColumn("AU".into())),
                "MissingRequiredColumn",
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Detect(DetectError::InsufficientLabelDiversity {
                    class: "normal",
                    rows: 3,
                }),
                "InsufficientLabelDiversity",
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ApiError::NoFile, "EmptyInput", StatusCode::BAD_REQUEST),
            (ApiError::NoResultAvailable, "NoResultAvailable", StatusCode::NOT_FOUND),
            (
                ApiError::Processing("boom".into()),
                "ProcessingError",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, kind, status) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.status(), status);
        }
    }
}
