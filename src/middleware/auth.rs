//! Admin session middleware.
//!
//! This middleware intercepts every admin request to:
//! 1. Read the session token from the `admin-token` cookie
//! 2. Verify its signature and expiry
//! 3. Inject the admin identity into the request
//! 4. Reject anything else with HTTP 401

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::{AppState, error::AppError, middleware::cookies::SESSION_COOKIE};

/// Authenticated admin attached to the request.
///
/// Route handlers extract it with `Extension<AdminSession>`.
#[derive(Debug, Clone)]
pub struct AdminSession {
    /// Admin id from the `sub` claim
    pub admin_id: String,

    pub username: String,
}

/// Session middleware function.
///
/// # Flow
///
/// 1. Take the `admin-token` cookie
/// 2. Verify it with the configured signing key
/// 3. If valid: inject `AdminSession`, call next handler
/// 4. If missing or invalid: return 401 Unauthorized
pub async fn require_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or(AppError::Unauthorized)?;

    let claims = state
        .auth
        .verify_session_token(&token)
        .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(AdminSession {
        admin_id: claims.sub,
        username: claims.username,
    });

    Ok(next.run(request).await)
}
