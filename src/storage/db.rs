// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Embedded database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized user + password hash (JSON bytes)
//! - `users_by_email` / `users_by_username`: lowercased key → user_id
//! - `posts`: post_id → serialized Post (JSON bytes)
//! - `timeline_index`: `!timestamp_be|post_id` → post_id
//! - `author_index`: `author_id|!timestamp_be|post_id` → post_id
//! - `refresh_tokens`: credential hash → serialized RefreshTokenRecord
//!
//! The inverted timestamp in the index keys makes a forward range scan yield
//! newest-first ordering. All mutations run in a single write transaction;
//! redb serializes writers, so `delete_by_hash` observes and removes a
//! refresh record atomically with respect to concurrent redeemers.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Post, User, UserUpdate};

use super::{
    PostStore, RefreshTokenRecord, RefreshTokenStore, StorageError, StorageResult, UserStore,
};

/// user_id → serialized StoredUser (JSON bytes).
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Lowercased email → user_id.
const USERS_BY_EMAIL: TableDefinition<&str, &str> = TableDefinition::new("users_by_email");

/// Lowercased username → user_id.
const USERS_BY_USERNAME: TableDefinition<&str, &str> = TableDefinition::new("users_by_username");

/// post_id → serialized Post (JSON bytes).
const POSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("posts");

/// Index: `!timestamp_be|post_id` → post_id, for newest-first range scans.
const TIMELINE_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("timeline_index");

/// Index: `author_id|!timestamp_be|post_id` → post_id.
const AUTHOR_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("author_index");

/// Credential hash → serialized RefreshTokenRecord (JSON bytes).
const REFRESH_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("refresh_tokens");

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// On-disk user record. The password hash lives only here.
#[derive(Debug, Serialize, Deserialize)]
struct StoredUser {
    user: User,
    password_hash: String,
}

/// Invert a timestamp so newer entries sort first in a forward scan.
fn inverted_micros(ts: DateTime<Utc>) -> [u8; 8] {
    let micros = ts.timestamp_micros().max(0) as u64;
    (u64::MAX - micros).to_be_bytes()
}

/// Build a timeline index key: `!timestamp_be|post_id`.
fn time_key(ts: DateTime<Utc>, post_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + 1 + post_id.len());
    key.extend_from_slice(&inverted_micros(ts));
    key.push(b'|');
    key.extend_from_slice(post_id.as_bytes());
    key
}

/// Build an author index key: `author_id|!timestamp_be|post_id`.
fn author_key(author_id: &str, ts: DateTime<Utc>, post_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(author_id.len() + 1 + 8 + 1 + post_id.len());
    key.extend_from_slice(author_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&inverted_micros(ts));
    key.push(b'|');
    key.extend_from_slice(post_id.as_bytes());
    key
}

/// Embedded ACID database implementing all storage traits.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_EMAIL)?;
            let _ = write_txn.open_table(USERS_BY_USERNAME)?;
            let _ = write_txn.open_table(POSTS)?;
            let _ = write_txn.open_table(TIMELINE_INDEX)?;
            let _ = write_txn.open_table(AUTHOR_INDEX)?;
            let _ = write_txn.open_table(REFRESH_TOKENS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn load_user(&self, id: &str) -> StorageResult<Option<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn load_posts_by_ids(&self, ids: &[String]) -> StorageResult<Vec<Post>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(POSTS)?;
        let mut posts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(guard) = table.get(id.as_str())? {
                posts.push(serde_json::from_slice(guard.value())?);
            }
        }
        Ok(posts)
    }
}

impl UserStore for Database {
    fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> StorageResult<User> {
        let username_key = username.to_lowercase();
        let email_key = email.to_lowercase();

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            bio: String::new(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&StoredUser {
            user: user.clone(),
            password_hash: password_hash.to_string(),
        })?;

        let write_txn = self.db.begin_write()?;
        {
            let mut by_username = write_txn.open_table(USERS_BY_USERNAME)?;
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            let mut users = write_txn.open_table(USERS)?;

            if by_username.get(username_key.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists("username already in use".into()));
            }
            if by_email.get(email_key.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists("email already in use".into()));
            }

            by_username.insert(username_key.as_str(), user.id.as_str())?;
            by_email.insert(email_key.as_str(), user.id.as_str())?;
            users.insert(user.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;

        Ok(user)
    }

    fn get_user_by_email(&self, email: &str) -> StorageResult<Option<(User, String)>> {
        let read_txn = self.db.begin_read()?;
        let by_email = read_txn.open_table(USERS_BY_EMAIL)?;
        let Some(id_guard) = by_email.get(email.to_lowercase().as_str())? else {
            return Ok(None);
        };
        let id = id_guard.value().to_string();
        drop(id_guard);

        Ok(self
            .load_user(&id)?
            .map(|stored| (stored.user, stored.password_hash)))
    }

    fn get_user_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        Ok(self.load_user(id)?.map(|stored| stored.user))
    }

    fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let read_txn = self.db.begin_read()?;
        let by_username = read_txn.open_table(USERS_BY_USERNAME)?;
        let Some(id_guard) = by_username.get(username.to_lowercase().as_str())? else {
            return Ok(None);
        };
        let id = id_guard.value().to_string();
        drop(id_guard);

        self.get_user_by_id(&id)
    }

    fn update_user(&self, id: &str, update: &UserUpdate) -> StorageResult<User> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut users = write_txn.open_table(USERS)?;
            let mut stored: StoredUser = match users.get(id)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => return Err(StorageError::NotFound(format!("user {id}"))),
            };

            if let Some(display_name) = &update.display_name {
                stored.user.display_name = display_name.clone();
            }
            if let Some(bio) = &update.bio {
                stored.user.bio = bio.clone();
            }

            let json = serde_json::to_vec(&stored)?;
            users.insert(id, json.as_slice())?;
            stored.user
        };
        write_txn.commit()?;

        Ok(updated)
    }
}

impl PostStore for Database {
    fn create_post(&self, author_id: &str, content: &str) -> StorageResult<Post> {
        let post = Post {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            author: None,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&post)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut posts = write_txn.open_table(POSTS)?;
            let mut timeline = write_txn.open_table(TIMELINE_INDEX)?;
            let mut by_author = write_txn.open_table(AUTHOR_INDEX)?;

            posts.insert(post.id.as_str(), json.as_slice())?;
            timeline.insert(
                time_key(post.created_at, &post.id).as_slice(),
                post.id.as_str(),
            )?;
            by_author.insert(
                author_key(author_id, post.created_at, &post.id).as_slice(),
                post.id.as_str(),
            )?;
        }
        write_txn.commit()?;

        Ok(post)
    }

    fn get_post_by_id(&self, id: &str) -> StorageResult<Option<Post>> {
        let read_txn = self.db.begin_read()?;
        let posts = read_txn.open_table(POSTS)?;
        match posts.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn get_timeline(
        &self,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<Post>> {
        let ids = {
            let read_txn = self.db.begin_read()?;
            let timeline = read_txn.open_table(TIMELINE_INDEX)?;

            // Posts strictly older than the cursor have a strictly larger
            // inverted timestamp, so start just past every key at the cursor.
            let start = before.map(|cursor| {
                let mut key = inverted_micros(cursor).to_vec();
                key.push(0xFF);
                key
            });

            let mut ids = Vec::new();
            let iter = match &start {
                Some(start) => timeline.range(start.as_slice()..)?,
                None => timeline.iter()?,
            };
            for entry in iter {
                let (_, value) = entry?;
                ids.push(value.value().to_string());
                if ids.len() >= limit {
                    break;
                }
            }
            ids
        };

        self.load_posts_by_ids(&ids)
    }

    fn get_user_posts(
        &self,
        author_id: &str,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<Post>> {
        let ids = {
            let read_txn = self.db.begin_read()?;
            let by_author = read_txn.open_table(AUTHOR_INDEX)?;

            let mut start = author_id.as_bytes().to_vec();
            start.push(b'|');
            let mut end = start.clone();
            if let Some(cursor) = before {
                start.extend_from_slice(&inverted_micros(cursor));
                start.push(0xFF);
            }
            end.extend_from_slice(&[0xFF; 10]);

            let mut ids = Vec::new();
            for entry in by_author.range(start.as_slice()..end.as_slice())? {
                let (_, value) = entry?;
                ids.push(value.value().to_string());
                if ids.len() >= limit {
                    break;
                }
            }
            ids
        };

        self.load_posts_by_ids(&ids)
    }
}

impl RefreshTokenStore for Database {
    fn store_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let record = RefreshTokenRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            expires_at,
        };
        let json = serde_json::to_vec(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut tokens = write_txn.open_table(REFRESH_TOKENS)?;
            tokens.insert(token_hash, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get_by_hash(&self, token_hash: &str) -> StorageResult<Option<RefreshTokenRecord>> {
        let read_txn = self.db.begin_read()?;
        let tokens = read_txn.open_table(REFRESH_TOKENS)?;
        match tokens.get(token_hash)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    fn delete_by_hash(&self, token_hash: &str) -> StorageResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut tokens = write_txn.open_table(REFRESH_TOKENS)?;
            let removed = tokens.remove(token_hash)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    fn delete_all_for_user(&self, user_id: &str) -> StorageResult<u64> {
        self.delete_tokens_where(|record| record.user_id == user_id)
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        self.delete_tokens_where(|record| record.expires_at < now)
    }
}

impl Database {
    fn delete_tokens_where(
        &self,
        predicate: impl Fn(&RefreshTokenRecord) -> bool,
    ) -> StorageResult<u64> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut tokens = write_txn.open_table(REFRESH_TOKENS)?;

            let mut doomed = Vec::new();
            for entry in tokens.iter()? {
                let (key, value) = entry?;
                let record: RefreshTokenRecord = serde_json::from_slice(value.value())?;
                if predicate(&record) {
                    doomed.push(key.value().to_string());
                }
            }

            for hash in &doomed {
                tokens.remove(hash.as_str())?;
            }
            doomed.len() as u64
        };
        write_txn.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let db = Database::open(&dir.path().join("murmur.redb")).expect("open db");
        (db, dir)
    }

    #[test]
    fn create_and_fetch_user() {
        let (db, _dir) = test_db();
        let user = db
            .create_user("alice", "alice@example.com", "hash", "Alice")
            .unwrap();

        let (found, hash) = db.get_user_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(hash, "hash");

        let by_name = db.get_user_by_username("ALICE").unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let (db, _dir) = test_db();
        db.create_user("alice", "a1@example.com", "h", "A").unwrap();
        let err = db.create_user("alice", "a2@example.com", "h", "A").unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn update_user_persists_changes() {
        let (db, _dir) = test_db();
        let user = db.create_user("bob", "bob@example.com", "h", "Bob").unwrap();

        db.update_user(
            &user.id,
            &UserUpdate {
                display_name: Some("Bobby".into()),
                bio: None,
            },
        )
        .unwrap();

        let reloaded = db.get_user_by_id(&user.id).unwrap().unwrap();
        assert_eq!(reloaded.display_name, "Bobby");
    }

    #[test]
    fn timeline_returns_newest_first() {
        let (db, _dir) = test_db();
        for i in 0..4 {
            db.create_post("author", &format!("post {i}")).unwrap();
            // distinct creation timestamps for a deterministic order
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let page = db.get_timeline(None, 3).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].content, "post 3");
        assert!(page[0].created_at > page[1].created_at);

        let older = db.get_timeline(Some(page[2].created_at), 10).unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].content, "post 0");
    }

    #[test]
    fn user_posts_are_scoped_to_author() {
        let (db, _dir) = test_db();
        db.create_post("a", "from a").unwrap();
        db.create_post("b", "from b").unwrap();
        db.create_post("a", "more from a").unwrap();

        let posts = db.get_user_posts("a", None, 10).unwrap();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.author_id == "a"));
    }

    #[test]
    fn refresh_token_lifecycle() {
        let (db, _dir) = test_db();
        let expiry = Utc::now() + Duration::days(7);
        db.store_token("u1", "hash-1", expiry).unwrap();

        let record = db.get_by_hash("hash-1").unwrap().unwrap();
        assert_eq!(record.user_id, "u1");

        assert!(db.delete_by_hash("hash-1").unwrap());
        assert!(!db.delete_by_hash("hash-1").unwrap());
    }

    #[test]
    fn delete_expired_reports_exact_count() {
        let (db, _dir) = test_db();
        let now = Utc::now();
        db.store_token("u1", "old-1", now - Duration::hours(1)).unwrap();
        db.store_token("u1", "old-2", now - Duration::days(3)).unwrap();
        db.store_token("u1", "fresh", now + Duration::days(7)).unwrap();

        assert_eq!(db.delete_expired(now).unwrap(), 2);
        assert!(db.get_by_hash("fresh").unwrap().is_some());
    }

    #[test]
    fn delete_all_for_user_leaves_other_users() {
        let (db, _dir) = test_db();
        let expiry = Utc::now() + Duration::days(7);
        db.store_token("u1", "h1", expiry).unwrap();
        db.store_token("u1", "h2", expiry).unwrap();
        db.store_token("u2", "h3", expiry).unwrap();

        assert_eq!(db.delete_all_for_user("u1").unwrap(), 2);
        assert!(db.get_by_hash("h3").unwrap().is_some());
    }
}
