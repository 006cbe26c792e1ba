//! In-memory collections shared by the JSON file and Redis backends.
//!
//! Both backends load a whole collection, apply one of these mutations and
//! write the collection back. Each mutation reports whether it changed
//! anything so callers can skip the write.
//!
//! File layout:
//!
//! ```json
//! { "cardKeys": [ ... ], "admins": [ ... ] }
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::admin::Admin;
use crate::models::card_key::{CardKey, CardKeyStats, NewCardKey};
use crate::tokens::generate_secure_token;

/// Result of a mutation: the value to return and whether a write is needed.
pub type Mutation<T> = (T, bool);

/// Whole persisted state of the file backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub card_keys: CardKeyCollection,
    #[serde(default)]
    pub admins: AdminCollection,
}

/// Flat list of card keys in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardKeyCollection(pub Vec<CardKey>);

impl CardKeyCollection {
    /// Append fresh card keys, all or none.
    ///
    /// A generated token that already exists is reported as a conflict rather
    /// than stored twice.
    pub fn insert(
        &mut self,
        news: Vec<NewCardKey>,
        now: DateTime<Utc>,
    ) -> Result<Mutation<Vec<String>>, AppError> {
        self.insert_with(news, now, &mut generate_secure_token)
    }

    /// Same as `insert`, drawing secure tokens from `next_token`.
    pub fn insert_with<F>(
        &mut self,
        news: Vec<NewCardKey>,
        now: DateTime<Utc>,
        next_token: &mut F,
    ) -> Result<Mutation<Vec<String>>, AppError>
    where
        F: FnMut() -> String,
    {
        let mut seen: HashSet<String> = self.0.iter().map(|c| c.secure_token.clone()).collect();
        let mut issued = Vec::with_capacity(news.len());

        for new in news {
            let card = CardKey::issue(new, next_token(), now);
            if !seen.insert(card.secure_token.clone()) {
                return Err(AppError::Conflict("Secure token collision".to_string()));
            }
            issued.push(card);
        }

        let tokens: Vec<String> = issued.iter().map(|c| c.secure_token.clone()).collect();
        let dirty = !issued.is_empty();
        self.0.extend(issued);
        Ok((tokens, dirty))
    }

    pub fn find_by_token(&self, secure_token: &str) -> Option<&CardKey> {
        self.0.iter().find(|c| c.secure_token == secure_token)
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<&CardKey> {
        self.0.iter().find(|c| c.id == id)
    }

    pub fn mark_used(&mut self, secure_token: &str, now: DateTime<Utc>) -> Mutation<bool> {
        match self
            .0
            .iter_mut()
            .find(|c| c.secure_token == secure_token && !c.is_used)
        {
            Some(card) => {
                card.is_used = true;
                card.used_at = Some(now);
                (true, true)
            }
            None => (false, false),
        }
    }

    pub fn restore(&mut self, secure_token: &str) -> Mutation<bool> {
        match self
            .0
            .iter_mut()
            .find(|c| c.secure_token == secure_token && c.is_used)
        {
            Some(card) => {
                card.is_used = false;
                card.used_at = None;
                (true, true)
            }
            None => (false, false),
        }
    }

    pub fn delete(&mut self, id: Uuid) -> Mutation<bool> {
        let before = self.0.len();
        self.0.retain(|c| c.id != id);
        let removed = self.0.len() != before;
        (removed, removed)
    }

    /// Copy of the collection, newest first.
    pub fn newest_first(&self) -> Vec<CardKey> {
        let mut cards = self.0.clone();
        cards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        cards
    }

    pub fn stats(&self) -> CardKeyStats {
        CardKeyStats::from_cards(&self.0)
    }
}

/// Flat list of admin accounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminCollection(pub Vec<Admin>);

impl AdminCollection {
    pub fn insert(
        &mut self,
        username: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Mutation<Uuid>, AppError> {
        if self.find(username).is_some() {
            return Err(AppError::Conflict(format!(
                "Admin '{username}' already exists"
            )));
        }

        let admin = Admin {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        };
        let id = admin.id;
        self.0.push(admin);
        Ok((id, true))
    }

    pub fn find(&self, username: &str) -> Option<&Admin> {
        self.0.iter().find(|a| a.username == username)
    }

    pub fn update_password(&mut self, username: &str, password_hash: &str) -> Mutation<bool> {
        match self.0.iter_mut().find(|a| a.username == username) {
            Some(admin) => {
                admin.password_hash = password_hash.to_string();
                (true, true)
            }
            None => (false, false),
        }
    }
}
