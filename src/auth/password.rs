// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Password hashing with Argon2id.
//!
//! Hashing and verification are offloaded to the blocking thread pool so a
//! burst of logins cannot starve the async runtime.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, PasswordHasher as _, Version,
};

use crate::error::ApiError;

/// Argon2id password hasher.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// OWASP minimum recommended memory cost: 19 MiB.
    const MEMORY_COST: u32 = 19_456;
    const TIME_COST: u32 = 2;
    const PARALLELISM: u32 = 1;
    const OUTPUT_LEN: usize = 32;

    pub fn new() -> Self {
        let params = Params::new(
            Self::MEMORY_COST,
            Self::TIME_COST,
            Self::PARALLELISM,
            Some(Self::OUTPUT_LEN),
        )
        .expect("default Argon2 parameters are valid");

        Self { params }
    }

    /// Custom cost parameters, e.g. cheaper settings for tests.
    pub fn with_params(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        let params = Params::new(memory_cost, time_cost, parallelism, Some(Self::OUTPUT_LEN))
            .expect("invalid Argon2 parameters");

        Self { params }
    }

    /// Hash a password into PHC string format.
    pub async fn hash(&self, password: String) -> Result<String, ApiError> {
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "password hash task panicked");
            ApiError::internal()
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            ApiError::internal()
        })
    }

    /// Verify a password against a stored PHC-format hash.
    pub async fn verify(&self, password: String, hash: String) -> Result<bool, ApiError> {
        tokio::task::spawn_blocking(move || {
            let parsed = match PasswordHash::new(&hash) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::error!(error = %e, "stored password hash is unparseable");
                    return Err(());
                }
            };
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "password verify task panicked");
            ApiError::internal()
        })?
        .map_err(|_| ApiError::internal())
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}
