//! Admin account HTTP handlers.
//!
//! This module implements:
//! - POST /api/admin/login - Password login, sets the session cookie
//! - POST /api/admin/logout - Clears the session cookie
//! - POST /api/admin/init - One-time default admin bootstrap
//! - POST /api/admin/change-password - Rotate the current admin's password
//! - GET /api/admin/status - Storage backend and redemption policy in use

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    AppState,
    error::AppError,
    extract::ApiJson,
    middleware::{
        auth::AdminSession,
        cookies::{clear_session_cookie, session_cookie},
    },
    services::auth_service::{DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME},
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Log in with username and password.
///
/// # Request Body
///
/// ```json
/// { "username": "admin", "password": "admin123" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: sets the `admin-token` cookie
/// - **Error (400)**: Username or password missing
/// - **Error (401)**: Wrong credentials
///
/// ```json
/// {
///   "message": "Login successful",
///   "admin": { "id": "550e8400-...", "username": "admin" }
/// }
/// ```
///
/// The default admin is bootstrapped first if no account exists yet.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.ensure_default_admin().await?;

    if request.username.is_empty() || request.password.is_empty() {
        return Err(AppError::Validation(
            "Username and password are required".to_string(),
        ));
    }

    let Some(login) = state
        .auth
        .authenticate_admin(&request.username, &request.password)
        .await?
    else {
        tracing::warn!(username = %request.username, "failed admin login");
        return Err(AppError::Unauthorized);
    };

    tracing::info!(username = %login.admin.username, "admin logged in");
    let jar = jar.add(session_cookie(&login.token, state.config.cookie_secure));

    Ok((
        jar,
        Json(json!({
            "message": "Login successful",
            "admin": login.admin,
        })),
    ))
}

/// Clear the session cookie.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.add(clear_session_cookie(state.config.cookie_secure));
    (jar, Json(json!({ "message": "Logged out" })))
}

/// Create the default admin account once.
///
/// # Response
///
/// - **Success (201 Created)**: returns the bootstrap credentials, which must be changed
/// - **Error (409)**: an admin account already exists
pub async fn init_admin(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    if !state.auth.ensure_default_admin().await? {
        return Err(AppError::Conflict(
            "Admin account already exists".to_string(),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Default admin account created",
            "username": DEFAULT_ADMIN_USERNAME,
            "password": DEFAULT_ADMIN_PASSWORD,
            "note": "Log in and change this password immediately",
        })),
    ))
}

/// Change the logged-in admin's password.
///
/// # Request Body
///
/// ```json
/// { "currentPassword": "admin123", "newPassword": "something-longer" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**
/// - **Error (400)**: Missing fields, new password shorter than 6, or wrong current password
/// - **Error (404)**: Admin no longer exists
pub async fn change_password(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    state
        .auth
        .change_password(
            &session.username,
            &request.current_password,
            &request.new_password,
        )
        .await?;

    tracing::info!(
        admin = %session.username,
        admin_id = %session.admin_id,
        "admin password changed"
    );
    Ok(Json(json!({ "message": "Password changed" })))
}

/// Report which storage backend and direct-fetch policy are active.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "storageBackend": state.storage.backend(),
        "directFetchPolicy": state.config.direct_fetch_policy,
        "timestamp": Utc::now(),
    }))
}
