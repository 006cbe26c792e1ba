//! PostgreSQL backend.
//!
//! Point lookups go through the `secure_token` and `username` indexes, and the
//! used-flag transitions are single conditional `UPDATE`s, so the database
//! decides which of two concurrent redemptions wins.

use async_trait::async_trait;
use uuid::Uuid;

use super::{Storage, StorageBackend};
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::admin::Admin;
use crate::models::card_key::{CardKey, CardKeyStats, NewCardKey};
use crate::tokens::generate_secure_token;

const CARD_KEY_COLUMNS: &str = "id, tenant_url, access_token, email, balance_url, expiry_date, \
     query_params, secure_token, is_used, created_at, used_at";

const INSERT_CARD_KEY: &str = r#"
    INSERT INTO card_keys (
        tenant_url, access_token, email, balance_url,
        expiry_date, query_params, secure_token
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    RETURNING secure_token
"#;

pub struct PostgresStorage {
    pool: DbPool,
}

impl PostgresStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Map a unique-constraint violation to `Conflict`, pass anything else through.
fn conflict_on_duplicate(err: sqlx::Error, message: &str) -> AppError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => AppError::Conflict(message.to_string()),
        _ => AppError::Database(err),
    }
}

async fn insert_card_key<'e, E>(executor: E, new: NewCardKey) -> Result<String, AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let balance_url = new.balance_url.filter(|url| !url.trim().is_empty());

    sqlx::query_scalar::<_, String>(INSERT_CARD_KEY)
        .bind(new.tenant_url)
        .bind(new.access_token)
        .bind(new.email)
        .bind(balance_url)
        .bind(new.expiry_date)
        .bind(new.query_params)
        .bind(generate_secure_token())
        .fetch_one(executor)
        .await
        .map_err(|err| conflict_on_duplicate(err, "Secure token collision"))
}

#[async_trait]
impl Storage for PostgresStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Postgres
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn add_card_key(&self, new: NewCardKey) -> Result<String, AppError> {
        insert_card_key(&self.pool, new).await
    }

    /// One transaction for the whole batch; any failure rolls every row back.
    async fn batch_add_card_keys(&self, news: Vec<NewCardKey>) -> Result<Vec<String>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut tokens = Vec::with_capacity(news.len());

        for new in news {
            tokens.push(insert_card_key(&mut *tx, new).await?);
        }

        tx.commit().await?;
        Ok(tokens)
    }

    async fn get_card_key_by_token(&self, secure_token: &str) -> Result<Option<CardKey>, AppError> {
        let card = sqlx::query_as::<_, CardKey>(&format!(
            "SELECT {CARD_KEY_COLUMNS} FROM card_keys WHERE secure_token = $1"
        ))
        .bind(secure_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(card)
    }

    async fn get_card_key_by_id(&self, id: Uuid) -> Result<Option<CardKey>, AppError> {
        let card = sqlx::query_as::<_, CardKey>(&format!(
            "SELECT {CARD_KEY_COLUMNS} FROM card_keys WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(card)
    }

    async fn mark_card_key_as_used(&self, secure_token: &str) -> Result<bool, AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE card_keys
            SET is_used = TRUE, used_at = NOW()
            WHERE secure_token = $1 AND is_used = FALSE
            "#,
        )
        .bind(secure_token)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn restore_card_key(&self, secure_token: &str) -> Result<bool, AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE card_keys
            SET is_used = FALSE, used_at = NULL
            WHERE secure_token = $1 AND is_used = TRUE
            "#,
        )
        .bind(secure_token)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn get_all_card_keys(&self) -> Result<Vec<CardKey>, AppError> {
        let cards = sqlx::query_as::<_, CardKey>(&format!(
            "SELECT {CARD_KEY_COLUMNS} FROM card_keys ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    async fn delete_card_key(&self, id: Uuid) -> Result<bool, AppError> {
        let deleted = sqlx::query("DELETE FROM card_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    async fn get_stats(&self) -> Result<CardKeyStats, AppError> {
        let (total, used) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_used) FROM card_keys",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CardKeyStats::new(total.max(0) as u64, used.max(0) as u64))
    }

    async fn add_admin(&self, username: &str, password_hash: &str) -> Result<Uuid, AppError> {
        sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO admins (username, password_hash) VALUES ($1, $2) RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| conflict_on_duplicate(err, &format!("Admin '{username}' already exists")))
    }

    async fn get_admin_by_username(&self, username: &str) -> Result<Option<Admin>, AppError> {
        let admin = sqlx::query_as::<_, Admin>(
            "SELECT id, username, password_hash, created_at FROM admins WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(admin)
    }

    async fn update_admin_password(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<bool, AppError> {
        let updated = sqlx::query("UPDATE admins SET password_hash = $1 WHERE username = $2")
            .bind(password_hash)
            .bind(username)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(updated > 0)
    }
}
