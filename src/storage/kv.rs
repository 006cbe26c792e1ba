//! Redis-compatible key-value store backend.
//!
//! Two keys hold the whole store as JSON arrays:
//!
//! ```text
//! cardkeys  → [CardKey, ...]
//! admins    → [Admin, ...]
//! ```
//!
//! Writes are optimistic: `WATCH` the key, read and modify the collection,
//! then `MULTI`/`SET`/`EXEC`. If another writer touched the key in between,
//! `EXEC` returns nil and the whole read-modify-write is retried, so
//! concurrent redemptions of different keys cannot overwrite each other.

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::document::{AdminCollection, CardKeyCollection, Mutation};
use super::{Storage, StorageBackend};
use crate::error::AppError;
use crate::models::admin::Admin;
use crate::models::card_key::{CardKey, CardKeyStats, NewCardKey};

const CARD_KEYS_KEY: &str = "cardkeys";
const ADMINS_KEY: &str = "admins";

/// Attempts before a contended write gives up.
const MAX_WRITE_ATTEMPTS: usize = 8;

pub struct RedisStorage {
    client: redis::Client,
}

impl RedisStorage {
    pub fn open(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// A dedicated connection, so a `WATCH` only covers this operation.
    async fn connection(&self) -> Result<MultiplexedConnection, AppError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn read<C>(&self, key: &str) -> Result<C, AppError>
    where
        C: DeserializeOwned + Default,
    {
        let mut con = self.connection().await?;
        load(&mut con, key).await
    }

    async fn update<C, T, F>(&self, key: &str, mut change: F) -> Result<T, AppError>
    where
        C: Serialize + DeserializeOwned + Default + Send,
        T: Send,
        F: FnMut(&mut C) -> Result<Mutation<T>, AppError> + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut con = self.connection().await?;
            redis::cmd("WATCH")
                .arg(key)
                .query_async::<()>(&mut con)
                .await?;

            let mut collection: C = load(&mut con, key).await?;
            let (value, dirty) = match change(&mut collection) {
                Ok(outcome) => outcome,
                Err(err) => {
                    redis::cmd("UNWATCH").query_async::<()>(&mut con).await?;
                    return Err(err);
                }
            };

            if !dirty {
                redis::cmd("UNWATCH").query_async::<()>(&mut con).await?;
                return Ok(value);
            }

            let payload = serde_json::to_string(&collection)?;
            let committed: Option<(i64,)> = redis::pipe()
                .atomic()
                .set(key, payload)
                .ignore()
                .exists(key)
                .query_async(&mut con)
                .await?;

            if committed.is_some() {
                return Ok(value);
            }
            tracing::debug!(key, attempt, "concurrent write detected, retrying");
        }

        tracing::warn!(key, attempts = MAX_WRITE_ATTEMPTS, "write contention not resolved");
        Err(AppError::StorageUnavailable(format!(
            "too much write contention on '{key}'"
        )))
    }
}

async fn load<C>(con: &mut MultiplexedConnection, key: &str) -> Result<C, AppError>
where
    C: DeserializeOwned + Default,
{
    let raw: Option<String> = con.get(key).await?;
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(C::default()),
    }
}

#[async_trait]
impl Storage for RedisStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Redis
    }

    async fn ping(&self) -> Result<(), AppError> {
        let mut con = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut con).await?;
        Ok(())
    }

    async fn batch_add_card_keys(&self, news: Vec<NewCardKey>) -> Result<Vec<String>, AppError> {
        self.update(CARD_KEYS_KEY, |cards: &mut CardKeyCollection| {
            cards.insert(news.clone(), Utc::now())
        })
        .await
    }

    async fn get_card_key_by_token(&self, secure_token: &str) -> Result<Option<CardKey>, AppError> {
        let cards: CardKeyCollection = self.read(CARD_KEYS_KEY).await?;
        Ok(cards.find_by_token(secure_token).cloned())
    }

    async fn get_card_key_by_id(&self, id: Uuid) -> Result<Option<CardKey>, AppError> {
        let cards: CardKeyCollection = self.read(CARD_KEYS_KEY).await?;
        Ok(cards.find_by_id(id).cloned())
    }

    async fn mark_card_key_as_used(&self, secure_token: &str) -> Result<bool, AppError> {
        self.update(CARD_KEYS_KEY, |cards: &mut CardKeyCollection| {
            Ok(cards.mark_used(secure_token, Utc::now()))
        })
        .await
    }

    async fn restore_card_key(&self, secure_token: &str) -> Result<bool, AppError> {
        self.update(CARD_KEYS_KEY, |cards: &mut CardKeyCollection| {
            Ok(cards.restore(secure_token))
        })
        .await
    }

    async fn get_all_card_keys(&self) -> Result<Vec<CardKey>, AppError> {
        let cards: CardKeyCollection = self.read(CARD_KEYS_KEY).await?;
        Ok(cards.newest_first())
    }

    async fn delete_card_key(&self, id: Uuid) -> Result<bool, AppError> {
        self.update(CARD_KEYS_KEY, |cards: &mut CardKeyCollection| {
            Ok(cards.delete(id))
        })
        .await
    }

    async fn get_stats(&self) -> Result<CardKeyStats, AppError> {
        let cards: CardKeyCollection = self.read(CARD_KEYS_KEY).await?;
        Ok(cards.stats())
    }

    async fn add_admin(&self, username: &str, password_hash: &str) -> Result<Uuid, AppError> {
        self.update(ADMINS_KEY, |admins: &mut AdminCollection| {
            admins.insert(username, password_hash, Utc::now())
        })
        .await
    }

    async fn get_admin_by_username(&self, username: &str) -> Result<Option<Admin>, AppError> {
        let admins: AdminCollection = self.read(ADMINS_KEY).await?;
        Ok(admins.find(username).cloned())
    }

    async fn update_admin_password(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        self.update(ADMINS_KEY, |admins: &mut AdminCollection| {
            Ok(admins.update_password(username, password_hash))
        })
        .await
    }
}
