// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Murmur

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup and validated
//! before anything binds a socket.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `MURMUR_JWT_SECRET` | Access-token signing secret, min 32 bytes | Required |
//! | `MURMUR_DATA_DIR` | Directory for the embedded database | `/data` |
//! | `MURMUR_HOST` | Server bind address | `0.0.0.0` |
//! | `MURMUR_PORT` | Server bind port | `8080` |
//! | `MURMUR_CORS_ORIGIN` | Allowed browser origin; unset disables CORS headers entirely | Unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;

/// Environment variable name for the token-signing secret.
pub const JWT_SECRET_ENV: &str = "MURMUR_JWT_SECRET";

/// Environment variable name for the data directory.
pub const DATA_DIR_ENV: &str = "MURMUR_DATA_DIR";

/// Environment variable name for the bind host.
pub const HOST_ENV: &str = "MURMUR_HOST";

/// Environment variable name for the bind port.
pub const PORT_ENV: &str = "MURMUR_PORT";

/// Environment variable name for the allowed CORS origin.
pub const CORS_ORIGIN_ENV: &str = "MURMUR_CORS_ORIGIN";

/// Minimum signing-secret length in bytes. An HS256 secret shorter than the
/// hash output materially weakens the tokens, so startup refuses it.
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{JWT_SECRET_ENV} must be at least {MIN_JWT_SECRET_LEN} bytes (got {0})")]
    SecretTooShort(usize),

    #[error("invalid {PORT_ENV}: {0}")]
    InvalidPort(String),
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    /// Allowed browser origin. `None` disables cross-origin headers rather
    /// than reflecting the caller's origin.
    pub cors_origin: Option<String>,
}

impl Config {
    /// Load and validate configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret =
            env::var(JWT_SECRET_ENV).map_err(|_| ConfigError::Missing(JWT_SECRET_ENV))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::SecretTooShort(jwt_secret.len()));
        }

        let host = env_or_default(HOST_ENV, "0.0.0.0");
        let port = env_or_default(PORT_ENV, "8080")
            .parse()
            .map_err(|_| ConfigError::InvalidPort(env_or_default(PORT_ENV, "8080")))?;

        let data_dir = PathBuf::from(env_or_default(DATA_DIR_ENV, "/data"));

        let cors_origin = env::var(CORS_ORIGIN_ENV).ok().filter(|s| !s.is_empty());

        Ok(Self {
            host,
            port,
            data_dir,
            jwt_secret,
            cors_origin,
        })
    }

    /// Path of the embedded database file inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("murmur.redb")
    }
}

fn env_or_default(key: &str, fallback: &str) -> String {
    env::var(key).unwrap_or_else(|_| fallback.to_string())
}
