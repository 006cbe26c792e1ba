//! Card key management HTTP handlers.
//!
//! This module implements the admin card key endpoints:
//! - GET /api/admin/cardkeys - List card keys (optionally filtered) with stats
//! - POST /api/admin/cardkeys - Single add or batch text import
//! - PATCH /api/admin/cardkeys/:id - Mark used / restore
//! - DELETE /api/admin/cardkeys/:id - Delete
//! - GET /api/admin/cardkeys/export/links - Unused redemption links as text
//! - GET /api/admin/cardkeys/export/details - Unused card key details as text
//! - GET /api/admin/backup - Full JSON export

use axum::{
    Extension, Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    middleware::auth::AdminSession,
    models::card_key::{CardKey, CardKeyStats, NewCardKey},
    parser::{format_unused_details, parse_card_keys_text, redemption_link},
};

/// Version tag written into backups.
const BACKUP_VERSION: &str = "1.0";

/// Which card keys the list endpoint returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Used,
    Unused,
}

impl StatusFilter {
    fn matches(&self, card: &CardKey) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Used => card.is_used,
            StatusFilter::Unused => !card.is_used,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: StatusFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardKeyListResponse {
    pub card_keys: Vec<CardKey>,
    /// Counts over the whole collection, not just the filtered page
    pub stats: CardKeyStats,
}

/// Request body for adding card keys.
///
/// With `single = true`, `text` is a JSON-encoded card key. Otherwise `text`
/// is the dashed block import format.
#[derive(Debug, Deserialize)]
pub struct CreateCardKeysRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub single: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKeyAction {
    MarkUsed,
    Restore,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCardKeyRequest {
    pub action: CardKeyAction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResponse {
    pub export_time: DateTime<Utc>,
    pub stats: CardKeyStats,
    pub card_keys: Vec<CardKey>,
    pub version: &'static str,
}

/// List card keys, newest first.
///
/// # Query Parameters
///
/// - `status` - `all` (default), `used` or `unused`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "cardKeys": [ { "id": "...", "secure_token": "...", "is_used": false, ... } ],
///   "stats": { "total": 10, "used": 3, "unused": 7 }
/// }
/// ```
pub async fn list_card_keys(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<CardKeyListResponse>, AppError> {
    let card_keys = state
        .storage
        .get_all_card_keys()
        .await?
        .into_iter()
        .filter(|card| query.status.matches(card))
        .collect();
    let stats = state.storage.get_stats().await?;

    Ok(Json(CardKeyListResponse { card_keys, stats }))
}

/// Add one card key or import a batch.
///
/// # Request Body
///
/// ```json
/// { "text": "租户URL：...\n...\n----------------", "single": false }
/// ```
///
/// # Response
///
/// - **Single (201 Created)**: `{ "message", "token", "link" }`
/// - **Batch (201 Created)**: `{ "message", "count", "links" }`
/// - **Error (400)**: Empty text, invalid single record, or no valid block in the batch
///
/// A batch is stored all or nothing.
pub async fn create_card_keys(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    ApiJson(request): ApiJson<CreateCardKeysRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.text.trim().is_empty() {
        return Err(AppError::Validation(
            "Card key data must not be empty".to_string(),
        ));
    }

    let base_url = &state.config.base_url;

    let body = if request.single {
        let new: NewCardKey = serde_json::from_str(&request.text)
            .map_err(|e| AppError::Validation(format!("Invalid card key: {e}")))?;
        if let Some(field) = new.missing_field() {
            return Err(AppError::Validation(format!("Missing field: {field}")));
        }

        let token = state.storage.add_card_key(new).await?;
        tracing::info!(admin = %session.username, admin_id = %session.admin_id, "card key added");

        json!({
            "message": "Card key added",
            "link": redemption_link(base_url, &token),
            "token": token,
        })
    } else {
        let records = parse_card_keys_text(&request.text);
        if records.is_empty() {
            return Err(AppError::Validation(
                "No valid card key blocks found".to_string(),
            ));
        }

        let tokens = state.storage.batch_add_card_keys(records).await?;
        tracing::info!(
            admin = %session.username,
            admin_id = %session.admin_id,
            count = tokens.len(),
            "card keys imported"
        );

        let links: Vec<String> = tokens
            .iter()
            .map(|token| redemption_link(base_url, token))
            .collect();
        json!({
            "message": format!("Imported {} card keys", tokens.len()),
            "count": tokens.len(),
            "links": links,
        })
    };

    Ok((StatusCode::CREATED, Json(body)))
}

/// Delete a card key by id.
///
/// # Response
///
/// - **Success (200 OK)**
/// - **Error (404)**: Unknown id
pub async fn delete_card_key(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.storage.delete_card_key(id).await? {
        return Err(AppError::NotFound("Card key"));
    }

    tracing::info!(
        admin = %session.username,
        admin_id = %session.admin_id,
        %id,
        "card key deleted"
    );
    Ok(Json(json!({ "message": "Card key deleted" })))
}

/// Mark a card key used, or restore it to unused.
///
/// # Request Body
///
/// ```json
/// { "action": "mark_used" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**
/// - **Error (404)**: Unknown id
/// - **Error (409)**: Key already in the requested state
pub async fn update_card_key(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateCardKeyRequest>,
) -> Result<Json<Value>, AppError> {
    let card = state
        .storage
        .get_card_key_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Card key"))?;

    let message = match request.action {
        CardKeyAction::MarkUsed => {
            if !state.storage.mark_card_key_as_used(&card.secure_token).await? {
                return Err(AppError::Conflict("Card key is already used".to_string()));
            }
            "Card key marked as used"
        }
        CardKeyAction::Restore => {
            if !state.storage.restore_card_key(&card.secure_token).await? {
                return Err(AppError::Conflict("Card key is not used".to_string()));
            }
            "Card key restored to unused"
        }
    };

    tracing::info!(
        admin = %session.username,
        admin_id = %session.admin_id,
        %id,
        action = ?request.action,
        "card key updated"
    );
    Ok(Json(json!({ "message": message })))
}

async fn unused_card_keys(state: &AppState) -> Result<Vec<CardKey>, AppError> {
    let unused: Vec<CardKey> = state
        .storage
        .get_all_card_keys()
        .await?
        .into_iter()
        .filter(|card| !card.is_used)
        .collect();

    if unused.is_empty() {
        return Err(AppError::Validation("No unused card keys".to_string()));
    }
    Ok(unused)
}

fn text_attachment(prefix: &str, body: String) -> impl IntoResponse {
    let filename = format!("{prefix}-{}.txt", Utc::now().format("%Y-%m-%d"));
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
}

/// Download the redemption links of every unused card key, one per line.
pub async fn export_unused_links(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let base_url = &state.config.base_url;
    let links: Vec<String> = unused_card_keys(&state)
        .await?
        .iter()
        .map(|card| redemption_link(base_url, &card.secure_token))
        .collect();

    Ok(text_attachment("unused-cardkey-links", links.join("\n")))
}

/// Download numbered detail blocks of every unused card key.
pub async fn export_unused_details(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let unused = unused_card_keys(&state).await?;
    let details = format_unused_details(&unused, &state.config.base_url);

    Ok(text_attachment("unused-cardkey-details", details))
}

/// Full JSON export of all card keys.
///
/// # Response (200 OK)
///
/// Served as `cardkeys-backup-YYYY-MM-DD.json` attachment:
///
/// ```json
/// {
///   "exportTime": "2025-12-21T19:00:00Z",
///   "stats": { "total": 2, "used": 1, "unused": 1 },
///   "cardKeys": [ ... ],
///   "version": "1.0"
/// }
/// ```
pub async fn backup(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let export_time = Utc::now();
    let body = BackupResponse {
        export_time,
        stats: state.storage.get_stats().await?,
        card_keys: state.storage.get_all_card_keys().await?,
        version: BACKUP_VERSION,
    };

    let disposition = format!(
        "attachment; filename=\"cardkeys-backup-{}.json\"",
        export_time.format("%Y-%m-%d")
    );

    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(body)))
}
