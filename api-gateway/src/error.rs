//! Error handling for the API gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::Error;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error information
    pub error: ErrorInfo,
    /// Request ID for tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Detailed error information
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (string identifier for the error type)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Whether resubmitting the same request may succeed
    pub retryable: bool,
}

/// API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Common(#[from] Error),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Common(e) => {
                let status = match e {
                    // Client errors (4xx)
                    Error::MalformedOrder(_) => StatusCode::BAD_REQUEST,
                    Error::MarketNotFound(_) | Error::AccountNotFound(_) => StatusCode::NOT_FOUND,
                    Error::DuplicateOrder(_) => StatusCode::CONFLICT,

                    // Server errors (5xx)
                    Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    Error::BalanceAdjustmentInconsistent(_)
                    | Error::PersistenceFailure(_)
                    | Error::ConfigurationError(_)
                    | Error::Internal(_)
                    | Error::Migration(_)
                    | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.kind())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Generate a request ID for tracking errors
        let request_id = Uuid::new_v4().to_string();
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!("API Error [{}]: {:?}", request_id, &self);
        } else {
            tracing::warn!("API request rejected [{}]: {}", request_id, &self);
        }

        let retryable = match &self {
            ApiError::Common(e) => e.is_retryable(),
            ApiError::BadRequest(_) => false,
        };

        let error_response = ErrorResponse {
            error: ErrorInfo {
                code: code.to_string(),
                message: self.to_string(),
                retryable,
            },
            request_id: Some(request_id),
        };

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::MalformedOrder("x".into()), StatusCode::BAD_REQUEST),
            (Error::MarketNotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::DuplicateOrder("x".into()), StatusCode::CONFLICT),
            (Error::StoreUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            let response = ApiError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
