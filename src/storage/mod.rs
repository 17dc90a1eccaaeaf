// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! # Storage Module
//!
//! Storage is defined as a set of traits so the core services never assume a
//! specific backend:
//!
//! - [`UserStore`] - accounts and password hashes
//! - [`PostStore`] - posts with time-ordered scans
//! - [`RefreshTokenStore`] - hashed refresh credentials
//!
//! Two implementations are provided:
//!
//! - [`Database`] - embedded redb database (pure Rust, ACID); the production
//!   backend. Writes go through serialized write transactions, which is what
//!   makes the refresh-credential lookup-then-delete atomic.
//! - [`MemoryStore`] - mutex-guarded maps for tests and ephemeral runs.
//!
//! The refresh-token contract is deliberately narrow: the plaintext
//! credential never reaches this layer, only its one-way hash. Records are
//! created once and deleted at most once; there is no update path.

pub mod db;
pub mod memory;

use chrono::{DateTime, Utc};

use crate::models::{Post, User, UserUpdate};

pub use db::Database;
pub use memory::MemoryStore;

/// Storage error, backend-agnostic.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A stored refresh credential. Holds the owning user and expiry; the
/// credential itself exists only as the hash used to look the record up.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RefreshTokenRecord {
    /// Record identifier (UUID)
    pub id: String,
    /// Owning user id
    pub user_id: String,
    /// When the credential stops being redeemable
    pub expires_at: DateTime<Utc>,
}

/// Account storage.
pub trait UserStore: Send + Sync {
    /// Create an account. Fails with `AlreadyExists` when the username or
    /// email is already taken (compared case-insensitively).
    fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> StorageResult<User>;

    /// Look up a user by email, returning the profile and the password hash.
    fn get_user_by_email(&self, email: &str) -> StorageResult<Option<(User, String)>>;

    fn get_user_by_id(&self, id: &str) -> StorageResult<Option<User>>;

    fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>>;

    /// Apply a partial profile update. Fails with `NotFound` for unknown ids.
    fn update_user(&self, id: &str, update: &UserUpdate) -> StorageResult<User>;
}

/// Post storage with reverse-chronological scans.
pub trait PostStore: Send + Sync {
    fn create_post(&self, author_id: &str, content: &str) -> StorageResult<Post>;

    fn get_post_by_id(&self, id: &str) -> StorageResult<Option<Post>>;

    /// Global timeline, newest first. `before` restricts to posts strictly
    /// older than the cursor.
    fn get_timeline(
        &self,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<Post>>;

    /// A single author's posts, newest first.
    fn get_user_posts(
        &self,
        author_id: &str,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<Post>>;
}

/// Refresh-credential storage.
///
/// Implementations must make `delete_by_hash` atomic with respect to
/// concurrent callers: of two racing deletions of the same hash, exactly one
/// observes `true`. The refresh rotator relies on this to guarantee
/// single-use redemption.
pub trait RefreshTokenStore: Send + Sync {
    fn store_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    fn get_by_hash(&self, token_hash: &str) -> StorageResult<Option<RefreshTokenRecord>>;

    /// Delete the record for `token_hash`, reporting whether one was removed.
    fn delete_by_hash(&self, token_hash: &str) -> StorageResult<bool>;

    /// Bulk session revocation, e.g. logout-everywhere or password change.
    /// Returns the number of records removed.
    fn delete_all_for_user(&self, user_id: &str) -> StorageResult<u64>;

    /// Remove records whose expiry is strictly before `now`. Returns the
    /// number removed. Housekeeping only; single-use redemption and natural
    /// expiry carry the security load.
    fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64>;
}
