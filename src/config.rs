//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct,
//! then checks the cross-field rules envy cannot express (a backend needs its connection URL, the
//! session signing key must be present).

use serde::Deserialize;

use crate::services::redemption_service::DirectFetchPolicy;
use crate::storage::StorageBackend;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `JWT_SECRET` (required): HMAC key used to sign admin session tokens
/// - `STORAGE_BACKEND` (optional): `json` (default), `redis` or `postgres`
/// - `DATA_PATH` (optional): JSON document path for the `json` backend
/// - `REDIS_URL` (required for `redis`): Redis connection string
/// - `DATABASE_URL` (required for `postgres`): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `BASE_URL` (optional): public origin used to build redemption links
/// - `COOKIE_SECURE` (optional): mark the session cookie `Secure`
/// - `DIRECT_FETCH_POLICY` (optional): `open` (default) or `gated`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage_backend: StorageBackend,

    #[serde(default = "default_data_path")]
    pub data_path: String,

    pub redis_url: Option<String>,

    pub database_url: Option<String>,

    pub jwt_secret: Option<String>,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub cookie_secure: bool,

    #[serde(default)]
    pub direct_fetch_policy: DirectFetchPolicy,
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    /// Refuse to serve rather than sign sessions with a well-known key.
    #[error("JWT_SECRET must be set to a non-empty value")]
    MissingJwtSecret,

    #[error("{0} must be set when STORAGE_BACKEND={1}")]
    MissingBackendUrl(&'static str, StorageBackend),

    #[error("BASE_URL must be an absolute http(s) URL: {0}")]
    InvalidBaseUrl(String),
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_data_path() -> String {
    "./cardkeys.json".to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `JWT_SECRET` is missing or empty
    /// - The selected storage backend has no connection URL
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        Self::from_vars(std::env::vars())
    }

    /// Build configuration from an explicit set of key/value pairs.
    ///
    /// Field names are converted the same way as for the process environment:
    /// `database_url` <- `DATABASE_URL`.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// The session signing key. Only valid after `validate` has passed.
    pub fn signing_key(&self) -> &str {
        self.jwt_secret.as_deref().unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.jwt_secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => {}
            _ => return Err(ConfigError::MissingJwtSecret),
        }

        match url::Url::parse(&self.base_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(_) => return Err(ConfigError::InvalidBaseUrl(self.base_url.clone())),
            Err(e) => return Err(ConfigError::InvalidBaseUrl(format!("{} ({e})", self.base_url))),
        }

        match self.storage_backend {
            StorageBackend::Redis if self.redis_url.is_none() => Err(
                ConfigError::MissingBackendUrl("REDIS_URL", StorageBackend::Redis),
            ),
            StorageBackend::Postgres if self.database_url.is_none() => Err(
                ConfigError::MissingBackendUrl("DATABASE_URL", StorageBackend::Postgres),
            ),
            _ => Ok(()),
        }
    }
}
