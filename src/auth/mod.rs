// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! # Authentication Module
//!
//! Credential issuance, rotation, and per-request verification.
//!
//! ## Credential Flow
//!
//! 1. `register`/`login` verify the identity (Argon2id password hash) and
//!    issue a token pair:
//!    - a signed access token (HS256, claims `sub`/`username`/`iat`/`exp`,
//!      24 h TTL), held by nobody but the client;
//!    - an opaque refresh credential (256 random bits), returned in
//!      plaintext exactly once while only its SHA-256 hash is stored.
//! 2. Every non-exempt request presents `Authorization: Bearer <access>`;
//!    the middleware verifies it statelessly and attaches the identity to
//!    the request.
//! 3. When the access token expires the client redeems the refresh
//!    credential. Redemption is single-use: the stored record is deleted
//!    before a replacement pair is issued, so a replayed credential fails.
//!
//! ## Security
//!
//! - Only HS256 is accepted; the algorithm named by a token header is never
//!   trusted.
//! - An expired token fails with the distinct `token_expired` code; every
//!   other verification failure collapses to `unauthorized` on the wire.
//! - The signing secret must be at least 32 bytes (enforced at startup).
//! - Clock skew tolerance is 60 seconds.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod service;

pub use claims::{AccessClaims, AuthenticatedUser};
pub use error::AuthError;
pub use extractor::CurrentUser;
pub use password::PasswordHasher;
pub use service::AuthService;
