//! PostgreSQL connection pool and migration management.
//!
//! Only used when `STORAGE_BACKEND=postgres`. This module provides utilities for:
//! - Creating and managing a PostgreSQL connection pool
//! - Running the embedded `card_keys` / `admins` migrations

use sqlx::{Pool, Postgres};

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// # Configuration
///
/// - Maximum connections: 5
/// - Connections are created lazily as needed
///
/// # Errors
///
/// Returns an error if:
/// - Database connection string is invalid
/// - Cannot connect to PostgreSQL server
/// - Database authentication fails
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each one runs only once.
///
/// # Migration Files
///
/// - `20250101000001_create_card_keys.sql`: `card_keys` plus indexes on `secure_token` and `is_used`
/// - `20250101000002_create_admins.sql`: `admins` plus an index on `username`
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    // The macro reads migrations at compile time from ./migrations directory
    sqlx::migrate!("./migrations").run(pool).await
}
