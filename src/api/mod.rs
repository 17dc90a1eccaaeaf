// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! HTTP API: routing, middleware stack, and OpenAPI documentation.
//!
//! Middleware order (outermost first): panic recovery, request-id, trace,
//! throttle, CORS (when configured), then authentication inside the
//! `/api/v1` tree. The throttle sits in front of everything except the
//! health check so abusive sources are rejected before any work happens.

use std::any::Any;
use std::sync::Arc;

use axum::{
    http::{header::HeaderValue, Method},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{middleware::require_auth, CurrentUser};
use crate::error::ApiError;
use crate::models::{
    AuthResponse, CreatePostRequest, LoginRequest, Post, PostResponse, RefreshRequest,
    RefreshResponse, RegisterRequest, TimelineResponse, TokenPair, User, UserResponse, UserUpdate,
};
use crate::ratelimit::{self, RateLimiter};
use crate::state::AppState;

pub mod auth;
pub mod health;
pub mod posts;
pub mod timeline;
pub mod users;

/// Build the full application router.
///
/// `allowed_origin` controls browser CORS: `None` adds no cross-origin
/// headers at all.
pub fn router(
    state: AppState,
    limiter: Arc<RateLimiter>,
    allowed_origin: Option<HeaderValue>,
) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/posts", post(posts::create_post))
        .route("/posts/{post_id}", get(posts::get_post))
        .route("/timeline", get(timeline::get_timeline))
        .route("/users/me", patch(users::update_me).get(get_me))
        .route("/users/{user_id}", get(users::get_user))
        .route("/users/{user_id}/posts", get(users::get_user_posts))
        .with_state(state.clone());

    // The auth layer sits outside the nest so it sees full request paths,
    // and before the docs merge so the docs stay public.
    let mut app = Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health::health))
        .layer(axum_middleware::from_fn_with_state(state, require_auth))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()));

    if let Some(origin) = allowed_origin {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        );
    }

    app.layer(
        ServiceBuilder::new()
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(axum_middleware::from_fn_with_state(
                limiter,
                ratelimit::throttle,
            )),
    )
}

/// `GET /api/v1/users/me`: the authenticated caller's own profile.
async fn get_me(
    CurrentUser(current): CurrentUser,
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .users
        .get_user_by_id(&current.user_id)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(UserResponse { user }))
}

/// Map a handler panic to the generic internal error.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "handler panicked");

    ApiError::internal().into_response()
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        posts::create_post,
        posts::get_post,
        timeline::get_timeline,
        users::get_user,
        users::get_user_posts,
        users::update_me,
        health::health,
    ),
    components(
        schemas(
            User,
            UserUpdate,
            Post,
            TokenPair,
            AuthResponse,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            RefreshResponse,
            CreatePostRequest,
            PostResponse,
            UserResponse,
            TimelineResponse,
            health::HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Credential issuance and rotation"),
        (name = "Posts", description = "Publishing and reading posts"),
        (name = "Timeline", description = "Reverse-chronological timeline"),
        (name = "Users", description = "Profiles"),
        (name = "Health", description = "Liveness")
    )
)]
struct ApiDoc;
