// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Axum extractor for the authenticated caller.
//!
//! Handlers behind the auth middleware take `CurrentUser` to receive the
//! verified identity:
//!
//! ```rust,ignore
//! async fn create_post(CurrentUser(user): CurrentUser) -> impl IntoResponse {
//!     // user.user_id is the verified caller
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::claims::AuthenticatedUser;
use super::error::AuthError;

/// The identity verified by the auth middleware.
///
/// Rejects with `unauthorized` when the middleware did not run for this
/// route, which would be a routing mistake rather than a client error.
pub struct CurrentUser(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AuthError::MissingAuthHeader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn extracts_identity_from_extensions() {
        let mut parts = Request::builder()
            .uri("/api/v1/posts")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        parts.extensions.insert(AuthenticatedUser {
            user_id: "user-1".into(),
            username: "alice".into(),
            expires_at: 0,
        });

        let CurrentUser(user) = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(user.user_id, "user-1");
    }

    #[tokio::test]
    async fn rejects_when_middleware_did_not_run() {
        let mut parts = Request::builder()
            .uri("/api/v1/posts")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = CurrentUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }
}
