//! Card key data models and API request/response types.
//!
//! This module defines:
//! - `CardKey`: stored entity, one single-use credential bundle
//! - `NewCardKey`: the admin-supplied fields of a card key (import and single add)
//! - `CardKeyStats`: aggregate counts shown on the admin panel
//! - `RevealedCardKey` / `MaskedCardKey`: the two views a redemption caller can get

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a card key record.
///
/// # Storage
///
/// Maps to the `card_keys` table for PostgreSQL, and to one element of the
/// `cardKeys` array for the JSON file and Redis backends.
///
/// # Invariants
///
/// - `secure_token` is unique and never changes after creation
/// - `used_at` is `Some` exactly when `is_used` is true
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct CardKey {
    /// Internal identifier, used only for admin-side addressing
    pub id: Uuid,

    pub tenant_url: String,

    /// The secret payload being protected
    pub access_token: String,

    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_url: Option<String>,

    /// Free-form, never parsed
    pub expiry_date: String,

    /// Free-form, never parsed
    pub query_params: String,

    /// Public redemption secret carried in the link
    pub secure_token: String,

    pub is_used: bool,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
}

impl CardKey {
    /// Build a fresh, unused card key from admin-supplied fields.
    pub fn issue(new: NewCardKey, secure_token: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_url: new.tenant_url,
            access_token: new.access_token,
            email: new.email,
            balance_url: new.balance_url.filter(|url| !url.trim().is_empty()),
            expiry_date: new.expiry_date,
            query_params: new.query_params,
            secure_token,
            is_used: false,
            created_at,
            used_at: None,
        }
    }
}

/// Admin-supplied fields of a card key.
///
/// Produced by the batch text parser, or deserialized directly for a single add.
///
/// # JSON Example
///
/// ```json
/// {
///   "tenant_url": "https://tenant.example.com",
///   "access_token": "tok_abc",
///   "email": "user@example.com",
///   "balance_url": "https://tenant.example.com/balance",
///   "expiry_date": "2025-01-01",
///   "query_params": "q=1"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCardKey {
    pub tenant_url: String,
    pub access_token: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_url: Option<String>,
    pub expiry_date: String,
    pub query_params: String,
}

impl NewCardKey {
    /// Reject records with a blank required field.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("tenant_url", &self.tenant_url),
            ("access_token", &self.access_token),
            ("email", &self.email),
            ("expiry_date", &self.expiry_date),
            ("query_params", &self.query_params),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Aggregate card key counts. `unused` is always `total - used`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CardKeyStats {
    pub total: u64,
    pub used: u64,
    pub unused: u64,
}

impl CardKeyStats {
    pub fn new(total: u64, used: u64) -> Self {
        Self {
            total,
            used,
            unused: total.saturating_sub(used),
        }
    }

    pub fn from_cards<'a>(cards: impl IntoIterator<Item = &'a CardKey>) -> Self {
        let (total, used) = cards.into_iter().fold((0, 0), |(total, used), card| {
            (total + 1, used + u64::from(card.is_used))
        });
        Self::new(total, used)
    }
}

/// Full card key view returned to a redemption caller.
///
/// Removes the internal `id` and the `secure_token` itself.
#[derive(Debug, Clone, Serialize)]
pub struct RevealedCardKey {
    pub tenant_url: String,
    pub access_token: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_url: Option<String>,
    pub expiry_date: String,
    pub query_params: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
}

impl From<CardKey> for RevealedCardKey {
    fn from(card: CardKey) -> Self {
        Self {
            tenant_url: card.tenant_url,
            access_token: card.access_token,
            email: card.email,
            balance_url: card.balance_url,
            expiry_date: card.expiry_date,
            query_params: card.query_params,
            is_used: card.is_used,
            created_at: card.created_at,
            used_at: card.used_at,
        }
    }
}

/// Withheld view of an unused card key, shown before the holder confirms.
#[derive(Debug, Clone, Serialize)]
pub struct MaskedCardKey {
    pub email: String,
    pub expiry_date: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&CardKey> for MaskedCardKey {
    fn from(card: &CardKey) -> Self {
        Self {
            email: mask_email(&card.email),
            expiry_date: card.expiry_date.clone(),
            is_used: card.is_used,
            created_at: card.created_at,
        }
    }
}

/// `alice@example.com` -> `a***@example.com`
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}
