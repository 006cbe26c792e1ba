//! Redemption flow for card key links.
//!
//! A holder of a link goes through:
//!
//! 1. **check** - an unused key answers with a masked view and asks for
//!    confirmation; an already used key is shown in full
//! 2. **confirm** - the key is consumed, then shown in full
//!
//! A plain fetch without either flag is governed by [`DirectFetchPolicy`].
//! Responses built from these results never include the internal id or the
//! secure token.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::card_key::{CardKey, MaskedCardKey, RevealedCardKey};
use crate::parser::format_card_key_for_display;
use crate::storage::Storage;
use crate::tokens::token_fingerprint;

/// What a plain `GET /api/key/{token}` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectFetchPolicy {
    /// Consume the key if needed and reveal it, skipping the confirm step.
    #[default]
    Open,
    /// Same as `check`: unused keys require an explicit confirm.
    Gated,
}

/// Outcome of a redemption step.
#[derive(Debug, Clone)]
pub enum Redemption {
    /// Key is unused; the payload is withheld until the holder confirms.
    ConfirmRequired(MaskedCardKey),
    /// Full record plus its display text.
    Revealed {
        card_key: RevealedCardKey,
        formatted: String,
    },
}

impl Redemption {
    fn reveal(card: CardKey) -> Self {
        let formatted = format_card_key_for_display(&card);
        Redemption::Revealed {
            card_key: card.into(),
            formatted,
        }
    }
}

async fn load(storage: &dyn Storage, secure_token: &str) -> Result<CardKey, AppError> {
    storage
        .get_card_key_by_token(secure_token)
        .await?
        .ok_or(AppError::NotFound("Card key"))
}

/// Report the key's state without consuming it.
pub async fn check(storage: &dyn Storage, secure_token: &str) -> Result<Redemption, AppError> {
    let card = load(storage, secure_token).await?;

    if card.is_used {
        Ok(Redemption::reveal(card))
    } else {
        Ok(Redemption::ConfirmRequired(MaskedCardKey::from(&card)))
    }
}

/// Consume the key (if still unused) and reveal it.
///
/// Losing a race against another confirm is not an error: the key ends up
/// used either way and is shown again.
pub async fn confirm(storage: &dyn Storage, secure_token: &str) -> Result<Redemption, AppError> {
    let card = load(storage, secure_token).await?;

    if !card.is_used {
        consume(storage, secure_token).await?;
    }

    let card = load(storage, secure_token).await?;
    Ok(Redemption::reveal(card))
}

/// Plain fetch with neither `check` nor `confirm`.
pub async fn direct_fetch(
    storage: &dyn Storage,
    secure_token: &str,
    policy: DirectFetchPolicy,
) -> Result<Redemption, AppError> {
    match policy {
        DirectFetchPolicy::Open => confirm(storage, secure_token).await,
        DirectFetchPolicy::Gated => check(storage, secure_token).await,
    }
}

async fn consume(storage: &dyn Storage, secure_token: &str) -> Result<(), AppError> {
    let token = token_fingerprint(secure_token);
    if storage.mark_card_key_as_used(secure_token).await? {
        tracing::info!(token = %token, "card key redeemed");
    } else {
        tracing::info!(token = %token, "card key already redeemed concurrently");
    }
    Ok(())
}
