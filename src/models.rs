// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Wire-level data models shared by the API handlers and the session client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A murmur account, as visible to other users.
///
/// The password hash never leaves the storage layer and is deliberately not
/// part of this type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct User {
    /// Unique user identifier (UUID)
    pub id: String,
    /// Unique handle, 3-15 lowercase characters
    pub username: String,
    /// Free-form display name
    pub display_name: String,
    /// Profile bio
    pub bio: String,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// A single post.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Post {
    /// Unique post identifier (UUID)
    pub id: String,
    /// Author's user id
    pub author_id: String,
    /// Author profile, hydrated on read paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    /// Post body, at most 140 characters
    pub content: String,
    /// When the post was published
    pub created_at: DateTime<Utc>,
}

/// Access/refresh credential pair returned by the issuance endpoints.
///
/// `refresh_token` is the plaintext refresh credential; it is returned
/// exactly once and only its hash is retained server-side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of the access token
    pub expires_at: DateTime<Utc>,
}

/// Response of `register` and `login`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response of the refresh endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePostRequest {
    pub content: String,
}

/// Envelope for a single post.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostResponse {
    pub post: Post,
}

/// Envelope for a single user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub user: User,
}

/// A timeline page, newest first, with an opaque continuation cursor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimelineResponse {
    pub posts: Vec<Post>,
    /// Cursor to pass back for the next (older) page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub has_more: bool,
}
