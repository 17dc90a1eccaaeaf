// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! Session client: the request wrapper terminal frontends talk through.
//!
//! Every call goes through one pipeline:
//!
//! - the current access token is attached as a bearer credential where the
//!   call requires authentication;
//! - a network-level failure (connect error, timeout — not a valid HTTP
//!   response) is retried up to 3 attempts with exponential backoff;
//! - a `token_expired` authorization failure triggers exactly one refresh
//!   redemption followed by exactly one retry of the original request. A
//!   second failure is surfaced, never retried again, so an invalidated
//!   session cannot loop.
//!
//! Any other HTTP error response is decoded into [`ClientError::Api`] and
//! returned immediately. Concurrent callers that each observe an expired
//! token each redeem independently; the rotation's single-use guarantee
//! means only the first wins and the rest surface their error.

use std::time::Duration;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::error::{ApiErrorBody, ErrorEnvelope};
use crate::models::{
    AuthResponse, CreatePostRequest, LoginRequest, PostResponse, RefreshRequest, RefreshResponse,
    RegisterRequest, TimelineResponse, TokenPair, UserResponse, UserUpdate,
};

/// Network retry budget: total attempts per logical request.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay of the exponential backoff between network retries.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error returned by the session client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with a decoded API error.
    #[error("api error: {0}")]
    Api(ApiErrorBody),

    /// No valid HTTP response after exhausting the retry budget.
    #[error("network failure after {attempts} attempt(s): {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The transparent credential refresh itself failed.
    #[error("token refresh failed: {0}")]
    Refresh(#[source] Box<ClientError>),

    /// An authenticated call was made with no stored credentials.
    #[error("no stored credentials")]
    NotAuthenticated,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl ClientError {
    /// Whether this is the `token_expired` authorization failure that
    /// permits a refresh attempt.
    pub fn is_token_expired(&self) -> bool {
        matches!(self, ClientError::Api(body) if body.code == "token_expired")
    }

    /// The wire error code, when the server produced one.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            ClientError::Api(body) => Some(&body.code),
            _ => None,
        }
    }
}

/// Callback invoked after a successful refresh so the caller can persist
/// the rotated credentials.
pub type RefreshCallback = Box<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Default, Clone)]
struct Credentials {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// API client with transparent credential renewal and network retry.
pub struct SessionClient {
    base_url: String,
    http: reqwest::Client,
    credentials: Mutex<Credentials>,
    on_refresh: Mutex<Option<RefreshCallback>>,
    backoff_base: Duration,
}

impl SessionClient {
    /// Create a client pointing at the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            credentials: Mutex::new(Credentials::default()),
            on_refresh: Mutex::new(None),
            backoff_base: BACKOFF_BASE,
        })
    }

    /// Shrink the retry backoff, e.g. for tests.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Install a credential pair, e.g. restored from persisted config.
    pub async fn set_tokens(&self, access_token: &str, refresh_token: &str) {
        let mut credentials = self.credentials.lock().await;
        credentials.access_token = Some(access_token.to_string());
        credentials.refresh_token = Some(refresh_token.to_string());
    }

    /// The currently held access token, if any.
    pub async fn access_token(&self) -> Option<String> {
        self.credentials.lock().await.access_token.clone()
    }

    /// True when both an access and a refresh credential are held.
    pub async fn is_authenticated(&self) -> bool {
        let credentials = self.credentials.lock().await;
        credentials.access_token.is_some() && credentials.refresh_token.is_some()
    }

    /// Register a callback invoked whenever tokens rotate.
    pub async fn on_token_refresh(&self, callback: RefreshCallback) {
        *self.on_refresh.lock().await = Some(callback);
    }

    /// Create an account and adopt its credentials.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ClientError> {
        let response: AuthResponse = self
            .request_json(
                Method::POST,
                "/api/v1/auth/register",
                &[],
                Some(&RegisterRequest {
                    username: username.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                }),
                false,
            )
            .await?;
        self.install_tokens(&response.tokens).await;
        Ok(response)
    }

    /// Authenticate and adopt the returned credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let response: AuthResponse = self
            .request_json(
                Method::POST,
                "/api/v1/auth/login",
                &[],
                Some(&LoginRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                }),
                false,
            )
            .await?;
        self.install_tokens(&response.tokens).await;
        Ok(response)
    }

    /// Redeem the stored refresh credential for a new pair.
    pub async fn refresh(&self) -> Result<TokenPair, ClientError> {
        let refresh_token = self
            .credentials
            .lock()
            .await
            .refresh_token
            .clone()
            .ok_or(ClientError::NotAuthenticated)?;

        let response: RefreshResponse = self
            .request_json(
                Method::POST,
                "/api/v1/auth/refresh",
                &[],
                Some(&RefreshRequest { refresh_token }),
                false,
            )
            .await?;
        self.install_tokens(&response.tokens).await;
        Ok(response.tokens)
    }

    /// Revoke every session of the authenticated user and drop the local
    /// credentials.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.execute::<()>(Method::POST, "/api/v1/auth/logout", &[], None, true)
            .await?;
        *self.credentials.lock().await = Credentials::default();
        Ok(())
    }

    /// Fetch the global timeline.
    pub async fn get_timeline(
        &self,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<TimelineResponse, ClientError> {
        self.request_json(
            Method::GET,
            "/api/v1/timeline",
            &page_query(cursor, limit),
            None::<&()>,
            true,
        )
        .await
    }

    /// Publish a post.
    pub async fn create_post(&self, content: &str) -> Result<PostResponse, ClientError> {
        self.request_json(
            Method::POST,
            "/api/v1/posts",
            &[],
            Some(&CreatePostRequest {
                content: content.to_string(),
            }),
            true,
        )
        .await
    }

    /// Fetch a single post.
    pub async fn get_post(&self, post_id: &str) -> Result<PostResponse, ClientError> {
        self.request_json(
            Method::GET,
            &format!("/api/v1/posts/{post_id}"),
            &[],
            None::<&()>,
            true,
        )
        .await
    }

    /// Fetch a user profile. Pass `me` for the authenticated user.
    pub async fn get_user(&self, user_id: &str) -> Result<UserResponse, ClientError> {
        self.request_json(
            Method::GET,
            &format!("/api/v1/users/{user_id}"),
            &[],
            None::<&()>,
            true,
        )
        .await
    }

    /// Fetch a user's posts.
    pub async fn get_user_posts(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> Result<TimelineResponse, ClientError> {
        self.request_json(
            Method::GET,
            &format!("/api/v1/users/{user_id}/posts"),
            &page_query(cursor, limit),
            None::<&()>,
            true,
        )
        .await
    }

    /// Update the authenticated user's profile.
    pub async fn update_user(&self, update: &UserUpdate) -> Result<UserResponse, ClientError> {
        self.request_json(Method::PATCH, "/api/v1/users/me", &[], Some(update), true)
            .await
    }

    async fn install_tokens(&self, pair: &TokenPair) {
        {
            let mut credentials = self.credentials.lock().await;
            credentials.access_token = Some(pair.access_token.clone());
            credentials.refresh_token = Some(pair.refresh_token.clone());
        }
        if let Some(callback) = self.on_refresh.lock().await.as_ref() {
            callback(&pair.access_token, &pair.refresh_token);
        }
    }

    async fn request_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        with_auth: bool,
    ) -> Result<T, ClientError> {
        let response = self.execute(method, path, query, body, with_auth).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Run the full pipeline and return a success-status response.
    ///
    /// A `token_expired` failure on an authenticated call triggers exactly
    /// one refresh and one retry; the retry's outcome is final either way.
    async fn execute<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        with_auth: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let response = self
            .send_with_retry(&method, path, query, body, with_auth)
            .await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let err = decode_error(response).await;
        if !(with_auth && err.is_token_expired()) {
            return Err(err);
        }

        Box::pin(self.refresh())
            .await
            .map_err(|e| ClientError::Refresh(Box::new(e)))?;

        let retried = self
            .send_with_retry(&method, path, query, body, with_auth)
            .await?;
        if retried.status().is_success() {
            Ok(retried)
        } else {
            Err(decode_error(retried).await)
        }
    }

    /// Send one request, retrying transient network failures with
    /// exponential backoff. A valid HTTP response of any status ends the
    /// retry loop.
    async fn send_with_retry<B: Serialize>(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        with_auth: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            let mut request = self.http.request(method.clone(), &url);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            if with_auth {
                if let Some(token) = self.credentials.lock().await.access_token.clone() {
                    request = request.bearer_auth(token);
                }
            }

            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if is_transient(&e) && attempt + 1 < MAX_ATTEMPTS => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %e, "transient network failure, retrying");
                    tokio::time::sleep(self.backoff_base * 2u32.pow(attempt - 1)).await;
                }
                Err(e) => {
                    return Err(ClientError::Network {
                        attempts: attempt + 1,
                        source: e,
                    })
                }
            }
        }
    }
}

fn page_query(cursor: Option<&str>, limit: Option<usize>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(cursor) = cursor {
        query.push(("cursor", cursor.to_string()));
    }
    if let Some(limit) = limit {
        query.push(("limit", limit.to_string()));
    }
    query
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Decode an HTTP error response into a typed error.
async fn decode_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    match response.bytes().await {
        Ok(bytes) => match serde_json::from_slice::<ErrorEnvelope>(&bytes) {
            Ok(envelope) => ClientError::Api(envelope.error),
            Err(_) => ClientError::Decode(format!("api error (status {status})")),
        },
        Err(e) => ClientError::Decode(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{
        extract::State,
        http::{header, HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use chrono::Utc;

    const FRESH: &str = "fresh-access-token";
    const STALE: &str = "stale-access-token";

    #[derive(Clone, Default)]
    struct MockState {
        refresh_calls: Arc<AtomicUsize>,
        timeline_calls: Arc<AtomicUsize>,
        /// When set, the timeline always reports an expired token.
        always_expired: Arc<AtomicUsize>,
    }

    fn expired_envelope() -> (AxumStatus, Json<ErrorEnvelope>) {
        (
            AxumStatus::UNAUTHORIZED,
            Json(ErrorEnvelope {
                error: ApiErrorBody {
                    code: "token_expired".into(),
                    message: "Invalid or expired token".into(),
                    field: None,
                },
            }),
        )
    }

    async fn mock_timeline(
        State(state): State<MockState>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        state.timeline_calls.fetch_add(1, Ordering::SeqCst);

        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some(&format!("Bearer {FRESH}"));

        if state.always_expired.load(Ordering::SeqCst) == 1 || !authorized {
            return expired_envelope().into_response();
        }

        Json(TimelineResponse {
            posts: vec![],
            next_cursor: None,
            has_more: false,
        })
        .into_response()
    }

    async fn mock_refresh(
        State(state): State<MockState>,
        Json(req): Json<RefreshRequest>,
    ) -> axum::response::Response {
        state.refresh_calls.fetch_add(1, Ordering::SeqCst);
        assert!(!req.refresh_token.is_empty());

        Json(RefreshResponse {
            tokens: TokenPair {
                access_token: FRESH.into(),
                refresh_token: "rotated-refresh".into(),
                expires_at: Utc::now() + chrono::Duration::hours(24),
            },
        })
        .into_response()
    }

    async fn spawn(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn mock_router(state: MockState) -> Router {
        Router::new()
            .route("/api/v1/timeline", get(mock_timeline))
            .route("/api/v1/auth/refresh", post(mock_refresh))
            .with_state(state)
    }

    fn client_for(addr: SocketAddr) -> SessionClient {
        SessionClient::new(format!("http://{addr}"))
            .unwrap()
            .with_backoff(Duration::from_millis(5))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn expired_token_triggers_one_refresh_then_succeeds() {
        let state = MockState::default();
        let addr = spawn(mock_router(state.clone())).await;

        let client = client_for(addr);
        client.set_tokens(STALE, "initial-refresh").await;

        let persisted: Arc<std::sync::Mutex<Vec<(String, String)>>> = Arc::default();
        let sink = persisted.clone();
        client
            .on_token_refresh(Box::new(move |access, refresh| {
                sink.lock().unwrap().push((access.into(), refresh.into()));
            }))
            .await;

        let page = client.get_timeline(None, None).await.unwrap();
        assert!(page.posts.is_empty());

        assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.timeline_calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.access_token().await.as_deref(), Some(FRESH));

        let persisted = persisted.lock().unwrap();
        assert_eq!(persisted.as_slice(), &[(FRESH.into(), "rotated-refresh".into())]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_expiry_surfaces_without_another_refresh() {
        let state = MockState::default();
        state.always_expired.store(1, Ordering::SeqCst);
        let addr = spawn(mock_router(state.clone())).await;

        let client = client_for(addr);
        client.set_tokens(STALE, "initial-refresh").await;

        let err = client.get_timeline(None, None).await.unwrap_err();
        assert!(err.is_token_expired(), "got {err:?}");

        // one refresh, one retry, then give up
        assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.timeline_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_errors_are_returned_without_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/api/v1/timeline",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    (
                        AxumStatus::INTERNAL_SERVER_ERROR,
                        Json(ErrorEnvelope {
                            error: ApiErrorBody {
                                code: "internal_error".into(),
                                message: "Something went wrong. Please try again.".into(),
                                field: None,
                            },
                        }),
                    )
                }
            }),
        );
        let addr = spawn(router).await;

        let client = client_for(addr);
        client.set_tokens(FRESH, "refresh").await;

        let err = client.get_timeline(None, None).await.unwrap_err();
        assert_eq!(err.api_code(), Some("internal_error"));
        assert_eq!(hits.load(Ordering::SeqCst), 1, "HTTP errors are never retried");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connection_failures_exhaust_the_retry_budget() {
        // bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(addr);
        client.set_tokens(FRESH, "refresh").await;

        let err = client.get_timeline(None, None).await.unwrap_err();
        match err {
            ClientError::Network { attempts, .. } => assert_eq!(attempts, MAX_ATTEMPTS),
            other => panic!("expected Network error, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_without_credentials_is_not_authenticated() {
        let addr = spawn(mock_router(MockState::default())).await;
        let client = client_for(addr);

        let err = client.refresh().await.unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_refresh_is_reported_as_refresh_error() {
        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let counter = refresh_calls.clone();
        let router = Router::new()
            .route("/api/v1/timeline", get(|| async { expired_envelope() }))
            .route(
                "/api/v1/auth/refresh",
                post(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { expired_envelope() }
                }),
            );
        let addr = spawn(router).await;

        let client = client_for(addr);
        client.set_tokens(STALE, "already-used").await;

        let err = client.get_timeline(None, None).await.unwrap_err();
        match err {
            ClientError::Refresh(inner) => assert!(inner.is_token_expired()),
            other => panic!("expected Refresh error, got {other:?}"),
        }
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
    }
}
