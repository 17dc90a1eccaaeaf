// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Access-token claims and the verified identity derived from them.

use serde::{Deserialize, Serialize};

/// Claims carried by a murmur access token.
///
/// `sub` and `username` are mandatory and typed; a token missing either, or
/// carrying the wrong JSON type, fails deserialization and is rejected as
/// malformed rather than crashing a handler downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the user id
    pub sub: String,
    /// The user's handle at issuance time
    pub username: String,
    /// Issued-at (Unix timestamp)
    pub iat: i64,
    /// Expiry (Unix timestamp)
    pub exp: i64,
}

/// Verified identity attached to a request after authentication.
///
/// This is the type handlers receive via the [`CurrentUser`] extractor.
///
/// [`CurrentUser`]: super::extractor::CurrentUser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Canonical user id (the `sub` claim)
    pub user_id: String,
    /// Username at token issuance
    pub username: String,
    /// Token expiry (Unix timestamp, not serialized)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            expires_at: claims.exp,
        }
    }
}
