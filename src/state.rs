// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

use std::sync::Arc;

use crate::auth::AuthService;
use crate::storage::{MemoryStore, PostStore, RefreshTokenStore, UserStore};

/// Shared application state: the auth service plus the storage traits the
/// handlers read from. Cloning is cheap (everything is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub users: Arc<dyn UserStore>,
    pub posts: Arc<dyn PostStore>,
    pub tokens: Arc<dyn RefreshTokenStore>,
}

impl AppState {
    pub fn new(
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        jwt_secret: &str,
    ) -> Self {
        Self {
            auth: AuthService::new(users.clone(), tokens.clone(), jwt_secret),
            users,
            posts,
            tokens,
        }
    }

    /// State backed entirely by the in-memory store. Used by tests and
    /// ephemeral runs.
    pub fn in_memory(jwt_secret: &str) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store.clone(), store, jwt_secret)
    }

    /// Replace the auth service, e.g. with test-friendly TTLs or a cheaper
    /// password hasher.
    pub fn with_auth(mut self, auth: AuthService) -> Self {
        self.auth = auth;
        self
    }
}
