//! Card key and admin persistence.
//!
//! Every backend implements the same [`Storage`] contract:
//!
//! - **json** - one JSON document on local disk, mutations serialized in-process
//! - **redis** - two JSON collections under fixed keys, optimistic `WATCH`/`MULTI` writes
//! - **postgres** - `card_keys` and `admins` tables, conditional `UPDATE`s
//!
//! Exactly one backend is built at startup from configuration and shared with
//! handlers as `Arc<dyn Storage>`.
//!
//! ## Used-flag transitions
//!
//! ```text
//! Unused --mark_card_key_as_used--> Used
//! Used   --restore_card_key-------> Unused
//! ```
//!
//! Both transitions are guarded compare-and-swap operations: a call made from
//! the wrong state returns `false` and changes nothing.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::admin::Admin;
use crate::models::card_key::{CardKey, CardKeyStats, NewCardKey};

pub mod document;
mod json_file;
mod kv;
mod postgres;

pub use json_file::JsonFileStorage;
pub use kv::RedisStorage;
pub use postgres::PostgresStorage;

/// Which backend variant is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Redis,
    Postgres,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Json => "json",
            StorageBackend::Redis => "redis",
            StorageBackend::Postgres => "postgres",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage contract shared by all backends.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend variant, reported by the status endpoint.
    fn backend(&self) -> StorageBackend;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), AppError>;

    /// Persist a new card key and return its secure token.
    async fn add_card_key(&self, new: NewCardKey) -> Result<String, AppError> {
        self.batch_add_card_keys(vec![new])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("insert returned no token".to_string()))
    }

    /// Persist several card keys at once.
    ///
    /// Tokens come back in input order. Either every record is stored or none is.
    async fn batch_add_card_keys(&self, news: Vec<NewCardKey>) -> Result<Vec<String>, AppError>;

    async fn get_card_key_by_token(&self, secure_token: &str) -> Result<Option<CardKey>, AppError>;

    async fn get_card_key_by_id(&self, id: Uuid) -> Result<Option<CardKey>, AppError>;

    /// Unused -> Used, stamping `used_at`. `false` if already used or unknown.
    async fn mark_card_key_as_used(&self, secure_token: &str) -> Result<bool, AppError>;

    /// Used -> Unused, clearing `used_at`. `false` if already unused or unknown.
    async fn restore_card_key(&self, secure_token: &str) -> Result<bool, AppError>;

    /// All card keys, newest first.
    async fn get_all_card_keys(&self) -> Result<Vec<CardKey>, AppError>;

    async fn delete_card_key(&self, id: Uuid) -> Result<bool, AppError>;

    async fn get_stats(&self) -> Result<CardKeyStats, AppError>;

    /// Create an admin. Fails with `Conflict` if the username is taken.
    async fn add_admin(&self, username: &str, password_hash: &str) -> Result<Uuid, AppError>;

    async fn get_admin_by_username(&self, username: &str) -> Result<Option<Admin>, AppError>;

    async fn update_admin_password(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<bool, AppError>;
}
