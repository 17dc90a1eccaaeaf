// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Credential issuance and rotation.
//!
//! [`AuthService`] owns the signing secret and the stores it needs to turn a
//! verified identity into a token pair, and to redeem refresh credentials.
//!
//! Refresh credentials are opaque 256-bit random values. The service stores
//! only their SHA-256 hash; redemption deletes the stored record *before*
//! issuing a replacement pair. Two concurrent redemptions of the same value
//! race on that deletion and exactly one wins — the loser sees "nothing
//! removed" and fails as expired. This ordering is the replay defense and
//! must not be reordered.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, TokenPair, User};
use crate::storage::{RefreshTokenStore, UserStore};
use crate::validation::{validate_email, validate_password, validate_username};

use super::claims::{AccessClaims, AuthenticatedUser};
use super::error::AuthError;
use super::password::PasswordHasher;

/// Access-token lifetime: 24 hours.
const ACCESS_TTL_HOURS: i64 = 24;

/// Refresh-credential lifetime: 7 days.
const REFRESH_TTL_DAYS: i64 = 7;

/// Entropy of a refresh credential, in bytes.
const REFRESH_TOKEN_BYTES: usize = 32;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Issues, verifies, and rotates credentials.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
    hasher: PasswordHasher,
    secret: Arc<String>,
    rng: SystemRandom,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        jwt_secret: &str,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher: PasswordHasher::new(),
            secret: Arc::new(jwt_secret.to_string()),
            rng: SystemRandom::new(),
            access_ttl: Duration::hours(ACCESS_TTL_HOURS),
            refresh_ttl: Duration::days(REFRESH_TTL_DAYS),
        }
    }

    /// Override token lifetimes. Tests use this to mint pre-expired tokens.
    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    /// Override the password hasher, e.g. with cheaper test parameters.
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Create an account and issue its first token pair.
    pub async fn register(&self, req: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        validate_username(&req.username)?;
        validate_email(&req.email)?;
        validate_password(&req.password)?;

        let password_hash = self.hasher.hash(req.password.clone()).await?;

        let user = self.users.create_user(
            &req.username,
            &req.email,
            &password_hash,
            &req.username,
        )?;

        let tokens = self.issue_token_pair(&user)?;
        Ok(AuthResponse { user, tokens })
    }

    /// Verify an email/password pair and issue a token pair.
    ///
    /// A missing account and a wrong password produce the identical error so
    /// login cannot be used to enumerate accounts.
    pub async fn login(&self, req: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let invalid = || ApiError::unauthorized("invalid email or password");

        let (user, password_hash) = self
            .users
            .get_user_by_email(&req.email)?
            .ok_or_else(invalid)?;

        let valid = self
            .hasher
            .verify(req.password.clone(), password_hash)
            .await?;
        if !valid {
            return Err(invalid());
        }

        let tokens = self.issue_token_pair(&user)?;
        Ok(AuthResponse { user, tokens })
    }

    /// Redeem a refresh credential for a brand-new token pair.
    ///
    /// Single-use: the stored record is deleted before reissue. "Never
    /// existed", "already used", and "expired" are indistinguishable to the
    /// caller.
    pub fn refresh(&self, raw_token: &str) -> Result<TokenPair, ApiError> {
        let expired = || ApiError::token_expired("refresh token has expired");

        let token_hash = hash_refresh_value(raw_token);

        let record = self.tokens.get_by_hash(&token_hash)?.ok_or_else(expired)?;

        if record.expires_at <= Utc::now() {
            self.tokens.delete_by_hash(&token_hash)?;
            return Err(expired());
        }

        // Consume the credential first. A concurrent redemption of the same
        // value loses this race and observes `false`.
        if !self.tokens.delete_by_hash(&token_hash)? {
            return Err(expired());
        }

        let user = self
            .users
            .get_user_by_id(&record.user_id)?
            .ok_or_else(expired)?;

        self.issue_token_pair(&user)
    }

    /// Delete every refresh credential belonging to a user
    /// (logout-everywhere, password change). Returns the number revoked.
    pub fn revoke_all_sessions(&self, user_id: &str) -> Result<u64, ApiError> {
        Ok(self.tokens.delete_all_for_user(user_id)?)
    }

    /// Sign an access token and mint a fresh refresh credential.
    ///
    /// The plaintext refresh value exists only in the returned pair; the
    /// store receives its hash.
    pub fn issue_token_pair(&self, user: &User) -> Result<TokenPair, ApiError> {
        let now = Utc::now();
        let expires_at = now + self.access_ttl;

        let claims = AccessClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| {
            tracing::error!(error = %e, "failed to sign access token");
            ApiError::internal()
        })?;

        let raw_refresh = self.generate_refresh_value()?;
        let refresh_hash = hash_refresh_value(&raw_refresh);
        self.tokens
            .store_token(&user.id, &refresh_hash, now + self.refresh_ttl)?;

        Ok(TokenPair {
            access_token,
            refresh_token: raw_refresh,
            expires_at,
        })
    }

    /// Verify an access token and return the identity it proves.
    ///
    /// Only HS256 is accepted. Expiry gets its own error so callers can
    /// attempt a refresh; everything else is `unauthorized` on the wire.
    pub fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;

        let token_data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        })?;

        Ok(AuthenticatedUser::from_claims(token_data.claims))
    }

    fn generate_refresh_value(&self) -> Result<String, ApiError> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| {
            tracing::error!("system CSPRNG failed");
            ApiError::internal()
        })?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }
}

/// One-way hash of a refresh credential, as used for storage keys.
pub(crate) fn hash_refresh_value(raw: &str) -> String {
    Base64UrlUnpadded::encode_string(Sha256::digest(raw.as_bytes()).as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::storage::{MemoryStore, RefreshTokenStore};

    const SECRET: &str = "unit-test-signing-secret-at-least-32-bytes";

    fn service() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let svc = AuthService::new(store.clone(), store.clone(), SECRET)
            .with_hasher(PasswordHasher::with_params(4096, 1, 1));
        (svc, store)
    }

    fn seeded_user(store: &MemoryStore) -> User {
        store
            .create_user("alice", "alice@example.com", "hash", "Alice")
            .unwrap()
    }

    #[tokio::test]
    async fn register_then_login_roundtrip() {
        let (svc, _store) = service();
        let registered = svc
            .register(&RegisterRequest {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "hunter2hunter2".into(),
            })
            .await
            .unwrap();
        assert_eq!(registered.user.username, "alice");
        assert!(!registered.tokens.refresh_token.is_empty());

        let logged_in = svc
            .login(&LoginRequest {
                email: "alice@example.com".into(),
                password: "hunter2hunter2".into(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (svc, _store) = service();
        let req = RegisterRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "hunter2hunter2".into(),
        };
        svc.register(&req).await.unwrap();

        let err = svc.register(&req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn login_does_not_reveal_which_credential_failed() {
        let (svc, _store) = service();
        svc.register(&RegisterRequest {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: "hunter2hunter2".into(),
        })
        .await
        .unwrap();

        let wrong_password = svc
            .login(&LoginRequest {
                email: "alice@example.com".into(),
                password: "not-the-password".into(),
            })
            .await
            .unwrap_err();
        let unknown_email = svc
            .login(&LoginRequest {
                email: "nobody@example.com".into(),
                password: "hunter2hunter2".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(wrong_password.code, ErrorCode::Unauthorized);
        assert_eq!(unknown_email.code, ErrorCode::Unauthorized);
        assert_eq!(wrong_password.message, unknown_email.message);
    }

    #[test]
    fn issued_access_token_verifies() {
        let (svc, store) = service();
        let user = seeded_user(&store);

        let pair = svc.issue_token_pair(&user).unwrap();
        let identity = svc.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(identity.user_id, user.id);
        assert_eq!(identity.username, "alice");
    }

    #[test]
    fn expired_access_token_fails_with_token_expired() {
        let (svc, store) = service();
        let svc = svc.with_ttls(Duration::seconds(-120), Duration::days(7));
        let user = seeded_user(&store);

        let pair = svc.issue_token_pair(&user).unwrap();
        let err = svc.verify_access_token(&pair.access_token).unwrap_err();
        assert_eq!(err, AuthError::TokenExpired);
    }

    #[test]
    fn foreign_signature_fails_as_invalid_not_expired() {
        let (svc, store) = service();
        let user = seeded_user(&store);
        let pair = svc.issue_token_pair(&user).unwrap();

        let other = AuthService::new(
            store.clone(),
            store.clone(),
            "a-completely-different-32-byte-secret!!",
        );
        let err = other.verify_access_token(&pair.access_token).unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature);
        assert_eq!(err.error_code(), "unauthorized");
    }

    #[test]
    fn garbage_token_is_malformed() {
        let (svc, _store) = service();
        let err = svc.verify_access_token("not-a-jwt").unwrap_err();
        assert_eq!(err, AuthError::MalformedToken);
    }

    #[test]
    fn refresh_rotates_and_consumes_the_credential() {
        let (svc, store) = service();
        let user = seeded_user(&store);
        let pair = svc.issue_token_pair(&user).unwrap();

        let rotated = svc.refresh(&pair.refresh_token).unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        // the consumed credential can never be redeemed again
        let err = svc.refresh(&pair.refresh_token).unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);

        // but the replacement works
        svc.refresh(&rotated.refresh_token).unwrap();
    }

    #[test]
    fn unknown_refresh_value_reads_as_expired() {
        let (svc, _store) = service();
        let err = svc.refresh("never-issued").unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);
    }

    #[test]
    fn expired_refresh_record_is_deleted_on_redemption() {
        let (svc, store) = service();
        let svc = svc.with_ttls(Duration::hours(24), Duration::seconds(-5));
        let user = seeded_user(&store);
        let pair = svc.issue_token_pair(&user).unwrap();

        let err = svc.refresh(&pair.refresh_token).unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenExpired);

        let hash = hash_refresh_value(&pair.refresh_token);
        assert!(store.get_by_hash(&hash).unwrap().is_none());
    }

    #[test]
    fn concurrent_redemption_has_exactly_one_winner() {
        let (svc, store) = service();
        let user = seeded_user(&store);
        let pair = svc.issue_token_pair(&user).unwrap();

        let raw = pair.refresh_token;
        let mut handles = Vec::new();
        for _ in 0..2 {
            let svc = svc.clone();
            let raw = raw.clone();
            handles.push(std::thread::spawn(move || svc.refresh(&raw)));
        }

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("redemption thread panicked"))
            .collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one concurrent redemption must win");
        let loser = results
            .iter()
            .find_map(|r| r.as_ref().err())
            .expect("one redemption must lose");
        assert_eq!(loser.code, ErrorCode::TokenExpired);
    }

    #[test]
    fn revoke_all_sessions_counts_revoked_credentials() {
        let (svc, store) = service();
        let user = seeded_user(&store);
        let pair_a = svc.issue_token_pair(&user).unwrap();
        let pair_b = svc.issue_token_pair(&user).unwrap();

        assert_eq!(svc.revoke_all_sessions(&user.id).unwrap(), 2);

        for raw in [pair_a.refresh_token, pair_b.refresh_token] {
            let err = svc.refresh(&raw).unwrap_err();
            assert_eq!(err.code, ErrorCode::TokenExpired);
        }
    }

    #[test]
    fn refresh_hash_is_deterministic_and_opaque() {
        let h1 = hash_refresh_value("credential");
        let h2 = hash_refresh_value("credential");
        assert_eq!(h1, h2);
        assert_ne!(h1, "credential");
        assert_ne!(hash_refresh_value("other"), h1);
    }
}
