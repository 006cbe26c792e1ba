//! Admin authentication service.
//!
//! This service handles:
//! - bcrypt password hashing and verification
//! - HS256 session tokens (24 hour lifetime) carried in the `admin-token` cookie
//! - Username/password login
//! - Bootstrapping the default admin account
//!
//! # Signing Key
//!
//! The service is built from `JWT_SECRET`; configuration loading refuses to
//! start without it, so there is no fallback key.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::admin::{Admin, AdminProfile};
use crate::storage::Storage;

/// Session lifetime, shared by the JWT `exp` claim and the cookie `Max-Age`.
pub const SESSION_TTL_HOURS: i64 = 24;

/// bcrypt work factor for stored admin passwords.
pub const BCRYPT_COST: u32 = 12;

/// Well-known bootstrap account. Must be rotated right after first login.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

pub const MIN_PASSWORD_LEN: usize = 6;

/// Claims carried by an admin session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Admin id
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Successful login: the signed session token and who it belongs to.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub token: String,
    pub admin: AdminProfile,
}

#[derive(Clone)]
pub struct AuthService {
    storage: Arc<dyn Storage>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(storage: Arc<dyn Storage>, signing_key: &str) -> Self {
        Self {
            storage,
            encoding_key: EncodingKey::from_secret(signing_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(signing_key.as_bytes()),
            bcrypt_cost: BCRYPT_COST,
        }
    }

    /// Override the bcrypt work factor (tests use the minimum of 4).
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Hash a password with bcrypt on the blocking pool.
    pub async fn hash_password(&self, password: &str) -> Result<String, AppError> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    }

    /// Check a password against a stored hash. A malformed hash never matches.
    pub async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let password = password.to_string();
        let hash = hash.to_string();

        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
            .await
            .unwrap_or(false)
    }

    /// Sign a session token for `admin`, valid for [`SESSION_TTL_HOURS`].
    pub fn create_session_token(&self, admin: &Admin) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: admin.id.to_string(),
            username: admin.username.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(SESSION_TTL_HOURS)).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("failed to sign session token: {e}")))
    }

    /// Validate signature and expiry. Any failure yields `None`.
    pub fn verify_session_token(&self, token: &str) -> Option<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .ok()
            .map(|data| data.claims)
    }

    /// Look up `username`, check the password, and issue a session on success.
    pub async fn authenticate_admin(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<LoginSuccess>, AppError> {
        let Some(admin) = self.storage.get_admin_by_username(username).await? else {
            return Ok(None);
        };

        if !self.verify_password(password, &admin.password_hash).await {
            return Ok(None);
        }

        let token = self.create_session_token(&admin)?;
        Ok(Some(LoginSuccess {
            token,
            admin: AdminProfile::from(&admin),
        }))
    }

    /// Create the default admin if it does not exist yet.
    ///
    /// Returns `true` when the account was created by this call.
    pub async fn ensure_default_admin(&self) -> Result<bool, AppError> {
        if self
            .storage
            .get_admin_by_username(DEFAULT_ADMIN_USERNAME)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let hash = self.hash_password(DEFAULT_ADMIN_PASSWORD).await?;
        match self.storage.add_admin(DEFAULT_ADMIN_USERNAME, &hash).await {
            Ok(_) => {
                tracing::warn!(
                    username = DEFAULT_ADMIN_USERNAME,
                    "default admin account created with the well-known password; change it now"
                );
                Ok(true)
            }
            // Another request bootstrapped it first.
            Err(AppError::Conflict(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Replace an admin's password after checking the current one.
    pub async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(AppError::Validation(
                "Current and new password are required".to_string(),
            ));
        }
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "New password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let admin = self
            .storage
            .get_admin_by_username(username)
            .await?
            .ok_or(AppError::NotFound("Admin"))?;

        if !self.verify_password(current_password, &admin.password_hash).await {
            return Err(AppError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        let hash = self.hash_password(new_password).await?;
        if !self.storage.update_admin_password(username, &hash).await? {
            return Err(AppError::NotFound("Admin"));
        }

        tracing::info!(username, "admin password changed");
        Ok(())
    }
}
