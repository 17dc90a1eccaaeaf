// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! User endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::auth::{AuthenticatedUser, CurrentUser};
use crate::error::ApiError;
use crate::models::{TimelineResponse, UserResponse, UserUpdate};
use crate::state::AppState;
use crate::validation::validate_user_update;

use super::timeline::{page_response, PageQuery};

/// Resolve the `me` alias to the caller's id.
fn resolve_user_id(user_id: String, current: &AuthenticatedUser) -> String {
    if user_id == "me" {
        current.user_id.clone()
    } else {
        user_id
    }
}

/// Fetch a user profile. `me` resolves to the authenticated caller.
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("user_id" = String, Path, description = "User id, or `me`")),
    responses(
        (status = 200, description = "The user", body = UserResponse),
        (status = 404, description = "No such user"),
    )
)]
pub async fn get_user(
    CurrentUser(current): CurrentUser,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let id = resolve_user_id(user_id, &current);
    let user = state
        .users
        .get_user_by_id(&id)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    Ok(Json(UserResponse { user }))
}

/// A user's posts, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/posts",
    tag = "Users",
    security(("bearer" = [])),
    params(("user_id" = String, Path, description = "User id, or `me`"), PageQuery),
    responses(
        (status = 200, description = "A page of the user's posts", body = TimelineResponse),
        (status = 404, description = "No such user"),
    )
)]
pub async fn get_user_posts(
    CurrentUser(current): CurrentUser,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TimelineResponse>, ApiError> {
    let id = resolve_user_id(user_id, &current);
    let user = state
        .users
        .get_user_by_id(&id)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let before = query.before()?;
    let limit = query.page_size();

    let mut posts = state.posts.get_user_posts(&user.id, before, limit + 1)?;
    for post in &mut posts {
        post.author = Some(user.clone());
    }

    Ok(Json(page_response(posts, limit)))
}

/// Update the authenticated user's profile.
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Unauthorized"),
    )
)]
pub async fn update_me(
    CurrentUser(current): CurrentUser,
    State(state): State<AppState>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>, ApiError> {
    validate_user_update(&update)?;

    let user = state.users.update_user(&current.user_id, &update)?;
    Ok(Json(UserResponse { user }))
}
