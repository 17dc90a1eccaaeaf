// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Post endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{CreatePostRequest, PostResponse};
use crate::state::AppState;
use crate::validation::validate_post_content;

/// Publish a new post as the authenticated user.
#[utoipa::path(
    post,
    path = "/api/v1/posts",
    tag = "Posts",
    security(("bearer" = [])),
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Empty or too-long content"),
        (status = 401, description = "Unauthorized"),
    )
)]
pub async fn create_post(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    validate_post_content(&req.content)?;

    let mut post = state
        .posts
        .create_post(&user.user_id, req.content.trim())?;
    post.author = state.users.get_user_by_id(&post.author_id)?;

    Ok((StatusCode::CREATED, Json(PostResponse { post })))
}

/// Fetch a single post by id.
#[utoipa::path(
    get,
    path = "/api/v1/posts/{post_id}",
    tag = "Posts",
    security(("bearer" = [])),
    params(("post_id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "The post", body = PostResponse),
        (status = 404, description = "No such post"),
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<PostResponse>, ApiError> {
    let mut post = state
        .posts
        .get_post_by_id(&post_id)?
        .ok_or_else(|| ApiError::not_found("post not found"))?;
    post.author = state.users.get_user_by_id(&post.author_id)?;

    Ok(Json(PostResponse { post }))
}
