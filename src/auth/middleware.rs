// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Authentication middleware.
//!
//! Applied to the whole `/api/v1` tree. A fixed allow-list of public paths
//! (credential issuance and the health check) passes through untouched;
//! every other request must carry a verifiable bearer token. The verified
//! identity is stored in request extensions for the [`CurrentUser`]
//! extractor.
//!
//! [`CurrentUser`]: super::extractor::CurrentUser

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

use super::error::AuthError;

/// Paths reachable without a bearer token.
pub const EXEMPT_PATHS: &[&str] = &[
    "/api/v1/auth/login",
    "/api/v1/auth/register",
    "/api/v1/auth/refresh",
    "/health",
];

/// Require a valid access token on every non-exempt request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if EXEMPT_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let token = match bearer_token(&request) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    match state.auth.verify_access_token(token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn bearer_token(request: &Request) -> Result<&str, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)
}
