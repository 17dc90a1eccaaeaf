// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! In-memory store backed by mutex-guarded maps.
//!
//! Used by the test suite and for ephemeral deployments. Implements the same
//! trait contracts as the redb backend, including the atomic
//! `delete_by_hash` (a `HashMap::remove` under the store mutex).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Post, User, UserUpdate};

use super::{
    PostStore, RefreshTokenRecord, RefreshTokenStore, StorageError, StorageResult, UserStore,
};

struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, StoredUser>,
    users_by_email: HashMap<String, String>,
    users_by_username: HashMap<String, String>,
    posts: HashMap<String, Post>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

/// In-memory implementation of all storage traits.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Database("store lock poisoned".to_string()))
    }
}

impl UserStore for MemoryStore {
    fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> StorageResult<User> {
        let mut inner = self.lock()?;

        let username_key = username.to_lowercase();
        let email_key = email.to_lowercase();

        if inner.users_by_username.contains_key(&username_key) {
            return Err(StorageError::AlreadyExists("username already in use".into()));
        }
        if inner.users_by_email.contains_key(&email_key) {
            return Err(StorageError::AlreadyExists("email already in use".into()));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            bio: String::new(),
            created_at: Utc::now(),
        };

        inner.users_by_username.insert(username_key, user.id.clone());
        inner.users_by_email.insert(email_key, user.id.clone());
        inner.users.insert(
            user.id.clone(),
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );

        Ok(user)
    }

    fn get_user_by_email(&self, email: &str) -> StorageResult<Option<(User, String)>> {
        let inner = self.lock()?;
        Ok(inner
            .users_by_email
            .get(&email.to_lowercase())
            .and_then(|id| inner.users.get(id))
            .map(|stored| (stored.user.clone(), stored.password_hash.clone())))
    }

    fn get_user_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner.users.get(id).map(|stored| stored.user.clone()))
    }

    fn get_user_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner
            .users_by_username
            .get(&username.to_lowercase())
            .and_then(|id| inner.users.get(id))
            .map(|stored| stored.user.clone()))
    }

    fn update_user(&self, id: &str, update: &UserUpdate) -> StorageResult<User> {
        let mut inner = self.lock()?;
        let stored = inner
            .users
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("user {id}")))?;

        if let Some(display_name) = &update.display_name {
            stored.user.display_name = display_name.clone();
        }
        if let Some(bio) = &update.bio {
            stored.user.bio = bio.clone();
        }

        Ok(stored.user.clone())
    }
}

impl PostStore for MemoryStore {
    fn create_post(&self, author_id: &str, content: &str) -> StorageResult<Post> {
        let mut inner = self.lock()?;
        let post = Post {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            author: None,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner.posts.insert(post.id.clone(), post.clone());
        Ok(post)
    }

    fn get_post_by_id(&self, id: &str) -> StorageResult<Option<Post>> {
        let inner = self.lock()?;
        Ok(inner.posts.get(id).cloned())
    }

    fn get_timeline(
        &self,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<Post>> {
        let inner = self.lock()?;
        Ok(scan_posts(inner.posts.values(), |_| true, before, limit))
    }

    fn get_user_posts(
        &self,
        author_id: &str,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StorageResult<Vec<Post>> {
        let inner = self.lock()?;
        Ok(scan_posts(
            inner.posts.values(),
            |post| post.author_id == author_id,
            before,
            limit,
        ))
    }
}

fn scan_posts<'a>(
    posts: impl Iterator<Item = &'a Post>,
    filter: impl Fn(&Post) -> bool,
    before: Option<DateTime<Utc>>,
    limit: usize,
) -> Vec<Post> {
    let mut matched: Vec<Post> = posts
        .filter(|post| filter(post))
        .filter(|post| before.is_none_or(|cursor| post.created_at < cursor))
        .cloned()
        .collect();
    matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    matched.truncate(limit);
    matched
}

impl RefreshTokenStore for MemoryStore {
    fn store_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut inner = self.lock()?;
        inner.refresh_tokens.insert(
            token_hash.to_string(),
            RefreshTokenRecord {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn get_by_hash(&self, token_hash: &str) -> StorageResult<Option<RefreshTokenRecord>> {
        let inner = self.lock()?;
        Ok(inner.refresh_tokens.get(token_hash).cloned())
    }

    fn delete_by_hash(&self, token_hash: &str) -> StorageResult<bool> {
        let mut inner = self.lock()?;
        Ok(inner.refresh_tokens.remove(token_hash).is_some())
    }

    fn delete_all_for_user(&self, user_id: &str) -> StorageResult<u64> {
        let mut inner = self.lock()?;
        let before = inner.refresh_tokens.len();
        inner
            .refresh_tokens
            .retain(|_, record| record.user_id != user_id);
        Ok((before - inner.refresh_tokens.len()) as u64)
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut inner = self.lock()?;
        let before = inner.refresh_tokens.len();
        inner
            .refresh_tokens
            .retain(|_, record| record.expires_at >= now);
        Ok((before - inner.refresh_tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn create_user_enforces_unique_username_and_email() {
        let store = MemoryStore::new();
        store
            .create_user("alice", "alice@example.com", "hash", "Alice")
            .unwrap();

        let err = store
            .create_user("ALICE", "other@example.com", "hash", "Alice 2")
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));

        let err = store
            .create_user("alice2", "Alice@Example.com", "hash", "Alice 2")
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn lookup_by_email_returns_password_hash() {
        let store = MemoryStore::new();
        let created = store
            .create_user("bob", "bob@example.com", "secret-hash", "Bob")
            .unwrap();

        let (user, hash) = store.get_user_by_email("BOB@example.com").unwrap().unwrap();
        assert_eq!(user.id, created.id);
        assert_eq!(hash, "secret-hash");
    }

    #[test]
    fn update_user_applies_partial_changes() {
        let store = MemoryStore::new();
        let user = store
            .create_user("carol", "carol@example.com", "hash", "Carol")
            .unwrap();

        let updated = store
            .update_user(
                &user.id,
                &UserUpdate {
                    display_name: None,
                    bio: Some("writing about storage engines".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.display_name, "Carol");
        assert_eq!(updated.bio, "writing about storage engines");

        let err = store.update_user("missing", &UserUpdate::default()).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn timeline_is_newest_first_with_cursor() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let post = store.create_post("author", &format!("post {i}")).unwrap();
            ids.push(post.id);
        }

        let page = store.get_timeline(None, 3).unwrap();
        assert_eq!(page.len(), 3);
        assert!(page[0].created_at >= page[1].created_at);

        let older = store
            .get_timeline(Some(page[2].created_at), 10)
            .unwrap();
        assert!(older.iter().all(|p| p.created_at < page[2].created_at));
    }

    #[test]
    fn user_posts_filters_by_author() {
        let store = MemoryStore::new();
        store.create_post("a", "from a").unwrap();
        store.create_post("b", "from b").unwrap();
        store.create_post("a", "more from a").unwrap();

        let posts = store.get_user_posts("a", None, 10).unwrap();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.author_id == "a"));
    }

    #[test]
    fn delete_by_hash_reports_removal_exactly_once() {
        let store = MemoryStore::new();
        let expiry = Utc::now() + Duration::days(7);
        store.store_token("u1", "hash-1", expiry).unwrap();

        assert!(store.delete_by_hash("hash-1").unwrap());
        assert!(!store.delete_by_hash("hash-1").unwrap());
        assert!(store.get_by_hash("hash-1").unwrap().is_none());
    }

    #[test]
    fn delete_all_for_user_counts_removed_records() {
        let store = MemoryStore::new();
        let expiry = Utc::now() + Duration::days(7);
        store.store_token("u1", "h1", expiry).unwrap();
        store.store_token("u1", "h2", expiry).unwrap();
        store.store_token("u2", "h3", expiry).unwrap();

        assert_eq!(store.delete_all_for_user("u1").unwrap(), 2);
        assert!(store.get_by_hash("h3").unwrap().is_some());
    }

    #[test]
    fn delete_expired_spares_valid_records() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.store_token("u1", "old-1", now - Duration::hours(1)).unwrap();
        store.store_token("u1", "old-2", now - Duration::days(2)).unwrap();
        store.store_token("u1", "fresh", now + Duration::days(7)).unwrap();

        assert_eq!(store.delete_expired(now).unwrap(), 2);
        assert!(store.get_by_hash("fresh").unwrap().is_some());
        assert!(store.get_by_hash("old-1").unwrap().is_none());
    }
}
