// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! API error taxonomy shared by the server and the session client.
//!
//! Every client-visible failure is reduced to one of the codes below. The
//! HTTP status is derived from the code, and the body always has the shape
//! `{"error": {"code", "message", "field"?}}`. Unexpected internal failures
//! collapse to `internal_error` with a fixed message so implementation
//! details never leak.

use axum::{
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Wire-level error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    ContentTooLong,
    Unauthorized,
    TokenExpired,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    Internal,
}

impl ErrorCode {
    /// The string form sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "validation_error",
            ErrorCode::ContentTooLong => "content_too_long",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::TokenExpired => "token_expired",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::Internal => "internal_error",
        }
    }

    /// The HTTP status this code maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Validation | ErrorCode::ContentTooLong => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized | ErrorCode::TokenExpired => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Payload inside the top-level `"error"` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl std::fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Top-level error envelope, as serialized on the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ApiErrorBody,
}

/// Error type returned by services and handlers.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub field: Option<&'static str>,
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            retry_after: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn content_too_long(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ContentTooLong, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn token_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TokenExpired, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Rate-limited response carrying a `Retry-After` hint in seconds.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let mut err = Self::new(ErrorCode::RateLimited, "rate limited, try again later");
        err.retry_after = Some(retry_after_secs.max(1));
        err
    }

    /// Generic internal error. The message is fixed so internals never leak.
    pub fn internal() -> Self {
        Self::new(ErrorCode::Internal, "Something went wrong. Please try again.")
    }

    /// Attach the request field the error refers to.
    pub fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => ApiError::not_found(what),
            StorageError::AlreadyExists(what) => ApiError::conflict(what),
            other => {
                tracing::error!(error = %other, "storage failure");
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let body = Json(ErrorEnvelope {
            error: ApiErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                field: self.field.map(str::to_string),
            },
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = self.retry_after {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn codes_map_to_expected_statuses() {
        assert_eq!(ErrorCode::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn into_response_wraps_error_envelope() {
        let response = ApiError::validation("Username must be 3-15 characters")
            .with_field("username")
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let envelope: ErrorEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.error.code, "validation_error");
        assert_eq!(envelope.error.field.as_deref(), Some("username"));
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after_header() {
        let response = ApiError::rate_limited(6).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "6");
    }

    #[tokio::test]
    async fn retry_after_is_at_least_one_second() {
        let response = ApiError::rate_limited(0).into_response();
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "1");
    }

    #[test]
    fn storage_errors_map_to_taxonomy() {
        let err: ApiError = StorageError::NotFound("post missing".into()).into();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err: ApiError = StorageError::AlreadyExists("username taken".into()).into();
        assert_eq!(err.code, ErrorCode::Conflict);

        let err: ApiError = StorageError::Database("disk on fire".into()).into();
        assert_eq!(err.code, ErrorCode::Internal);
        // Internal failures carry no backend detail
        assert!(!err.message.contains("disk"));
    }
}
