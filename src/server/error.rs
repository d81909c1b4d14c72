//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<T, ApiError>`; every failure before the first
//! body byte becomes a JSON body `{error, code, detail?, reason?}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::downloader::{ExtractionError, RelayError, ValidationError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Concurrency limit reached; nothing was started
    #[error("Server busy: {what} limit of {limit} reached, retry later")]
    Busy { what: &'static str, limit: usize },
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::AtCapacity { limit } => Self::Busy {
                what: "download",
                limit,
            },
            RelayError::Extraction(e) => Self::Extraction(e),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Extraction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Extraction(e) => e.code(),
            Self::Busy { .. } => "at_capacity",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                code = self.code(),
                error = %self,
                "Server error in API handler"
            );
        }

        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let Self::Extraction(e) = &self {
            if let Some(detail) = e.diagnostic() {
                body["detail"] = json!(detail);
            }
            if let Some(reason) = e.reason() {
                body["reason"] = json!(reason);
                body["hint"] = json!(reason.description());
                body["retryable"] = json!(reason.is_retryable());
            }
        }

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::BlockingReason;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_produces_400() {
        let response = ApiError::from(ValidationError::MissingUrl).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Missing url");
        assert_eq!(body["code"], "validation_error");
        assert!(body.get("detail").is_none());
    }

    #[tokio::test]
    async fn extraction_failure_produces_500_with_detail() {
        let err = ExtractionError::from_stderr("ERROR: [youtube] abc: Private video");
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["code"], "extraction_failed");
        assert_eq!(body["detail"], "ERROR: [youtube] abc: Private video");
        assert_eq!(body["reason"], serde_json::to_value(BlockingReason::PrivateVideo).unwrap());
        assert_eq!(body["hint"], "Private video");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn rate_limit_is_marked_retryable() {
        let err = ExtractionError::from_stderr("ERROR: [youtube] abc: HTTP Error 429: Too Many Requests");
        let body = body_json(ApiError::from(err).into_response()).await;
        assert_eq!(body["reason"], serde_json::to_value(BlockingReason::RateLimited).unwrap());
        assert_eq!(body["retryable"], true);
    }

    #[test]
    fn capacity_produces_503() {
        let err = ApiError::from(RelayError::AtCapacity { limit: 4 });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "at_capacity");
    }
}
