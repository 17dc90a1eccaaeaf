// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ApiErrorBody, ErrorEnvelope};

/// Verification failure for a bearer credential.
///
/// The variants stay precise for logging and tests, but the wire output
/// collapses everything except expiry into the single `unauthorized` code so
/// a caller can't probe which part of a forged token failed.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Authorization header is not `Bearer <token>`
    InvalidAuthHeader,
    /// Token is structurally invalid or carries malformed claims
    MalformedToken,
    /// Token signature is invalid
    InvalidSignature,
    /// Token has expired
    TokenExpired,
    /// Token is not yet valid
    TokenNotYetValid,
}

impl AuthError {
    /// Wire-level error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::TokenExpired => "token_expired",
            _ => "unauthorized",
        }
    }

    /// Client-visible message. Token-verification failures share one string.
    pub fn wire_message(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader | AuthError::InvalidAuthHeader => {
                "Missing or invalid authorization header"
            }
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::TokenNotYetValid => "Invalid or expired token",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "token is malformed"),
            AuthError::InvalidSignature => write!(f, "token signature is invalid"),
            AuthError::TokenExpired => write!(f, "token has expired"),
            AuthError::TokenNotYetValid => write!(f, "token is not yet valid"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(ErrorEnvelope {
            error: ApiErrorBody {
                code: self.error_code().to_string(),
                message: self.wire_message().to_string(),
                field: None,
            },
        });
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn expired_token_is_distinguishable_on_the_wire() {
        let response = AuthError::TokenExpired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let envelope: ErrorEnvelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.error.code, "token_expired");
    }

    #[tokio::test]
    async fn signature_and_structure_failures_are_indistinguishable() {
        for err in [AuthError::InvalidSignature, AuthError::MalformedToken] {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let envelope: ErrorEnvelope = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(envelope.error.code, "unauthorized");
            assert_eq!(envelope.error.message, "Invalid or expired token");
        }
    }
}
