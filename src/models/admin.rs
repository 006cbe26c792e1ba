//! Admin account model.
//!
//! Admin accounts are operators of the portal. Passwords are stored as bcrypt
//! hashes only; the hash never leaves the service in a response body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an admin record.
///
/// # Storage
///
/// Maps to the `admins` table for PostgreSQL, and to one element of the
/// `admins` array for the JSON file and Redis backends.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Admin {
    pub id: Uuid,

    /// Unique login name
    pub username: String,

    /// bcrypt hash of the password
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

/// Public view of an admin, returned after login.
#[derive(Debug, Clone, Serialize)]
pub struct AdminProfile {
    pub id: Uuid,
    pub username: String,
}

impl From<&Admin> for AdminProfile {
    fn from(admin: &Admin) -> Self {
        Self {
            id: admin.id,
            username: admin.username.clone(),
        }
    }
}
