// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Credential issuance endpoints.

use axum::{extract::State, http::StatusCode, Json};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{
    AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest,
};
use crate::state::AppState;

/// Create an account and issue the first token pair.
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username or email already in use"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let response = state.auth.register(&req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Authenticate with email and password.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 401, description = "Invalid email or password"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let response = state.auth.login(&req).await?;
    Ok(Json(response))
}

/// Redeem a refresh credential for a new token pair.
///
/// Single-use: the presented credential is consumed whether or not a new
/// pair is issued.
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = RefreshResponse),
        (status = 401, description = "Refresh credential expired or already used"),
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let tokens = state.auth.refresh(&req.refresh_token)?;
    Ok(Json(RefreshResponse { tokens }))
}

/// Revoke every refresh credential of the calling user.
///
/// Outstanding access tokens stay valid until natural expiry; the server is
/// deliberately stateless about them.
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "All sessions revoked"),
        (status = 401, description = "Unauthorized"),
    )
)]
pub async fn logout(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let revoked = state.auth.revoke_all_sessions(&user.user_id)?;
    tracing::info!(user_id = %user.user_id, revoked, "sessions revoked");
    Ok(StatusCode::NO_CONTENT)
}
