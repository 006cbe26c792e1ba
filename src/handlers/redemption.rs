//! Public redemption endpoint.
//!
//! `GET /api/key/:token` with optional query flags:
//! - `check=true` - report state; unused keys come back masked
//! - `confirm=true` - consume the key and reveal it
//! - neither - handled per the configured direct-fetch policy

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    AppState,
    error::AppError,
    extract::{ApiPath, ApiQuery},
    services::redemption_service::{self, Redemption},
};

#[derive(Debug, Default, Deserialize)]
pub struct RedemptionQuery {
    #[serde(default)]
    pub check: bool,
    #[serde(default)]
    pub confirm: bool,
}

/// Redeem or inspect a card key by its secure token.
///
/// # Response (200 OK, confirmation required)
///
/// ```json
/// {
///   "cardKey": { "email": "u***@example.com", "expiry_date": "2025-01-01", "is_used": false, "created_at": "..." },
///   "requiresConfirmation": true
/// }
/// ```
///
/// # Response (200 OK, revealed)
///
/// ```json
/// {
///   "cardKey": { "tenant_url": "...", "access_token": "...", "email": "...", "is_used": true, ... },
///   "formatted": "您的登录信息如下\n...",
///   "requiresConfirmation": false
/// }
/// ```
///
/// # Errors
///
/// - **404**: Unknown token
pub async fn get_card_key(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
    ApiQuery(query): ApiQuery<RedemptionQuery>,
) -> Result<Json<Value>, AppError> {
    let storage = state.storage.as_ref();

    let redemption = if query.confirm {
        redemption_service::confirm(storage, &token).await?
    } else if query.check {
        redemption_service::check(storage, &token).await?
    } else {
        redemption_service::direct_fetch(storage, &token, state.config.direct_fetch_policy)
            .await?
    };

    let body = match redemption {
        Redemption::ConfirmRequired(masked) => json!({
            "cardKey": masked,
            "requiresConfirmation": true,
        }),
        Redemption::Revealed {
            card_key,
            formatted,
        } => json!({
            "cardKey": card_key,
            "formatted": formatted,
            "requiresConfirmation": false,
        }),
    };

    Ok(Json(body))
}
