// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::http::header::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use murmur::api::router;
use murmur::config::Config;
use murmur::ratelimit::RateLimiter;
use murmur::state::AppState;
use murmur::storage::Database;
use murmur::sweeper::TokenSweeper;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let database = match Database::open(&config.database_path()) {
        Ok(database) => Arc::new(database),
        Err(e) => {
            tracing::error!(error = %e, path = %config.database_path().display(), "failed to open database");
            return ExitCode::FAILURE;
        }
    };

    let state = AppState::new(
        database.clone(),
        database.clone(),
        database.clone(),
        &config.jwt_secret,
    );

    let allowed_origin = match parse_origin(config.cors_origin.as_deref()) {
        Ok(origin) => origin,
        Err(e) => {
            tracing::error!(error = %e, "invalid MURMUR_CORS_ORIGIN");
            return ExitCode::FAILURE;
        }
    };

    // Background tasks: expired-credential sweep (hourly) and idle-visitor
    // eviction (every 10 minutes), both halted by the shutdown token.
    let shutdown = CancellationToken::new();
    let limiter = Arc::new(RateLimiter::new());
    tokio::spawn(TokenSweeper::new(state.tokens.clone()).run(shutdown.clone()));
    tokio::spawn(limiter.clone().run_sweeper(shutdown.clone()));

    let app = router(state, limiter, allowed_origin);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse bind address");
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%addr, "murmur server listening (docs at /docs)");

    let serve_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    // Stop background sweeps once the HTTP server has drained.
    shutdown.cancel();

    match serve_result {
        Ok(()) => {
            tracing::info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn parse_origin(origin: Option<&str>) -> Result<Option<HeaderValue>, String> {
    origin
        .map(|value| HeaderValue::from_str(value).map_err(|e| e.to_string()))
        .transpose()
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
