//! Session cookie construction.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::services::auth_service::SESSION_TTL_HOURS;

/// Cookie carrying the admin session token.
pub const SESSION_COOKIE: &str = "admin-token";

/// HttpOnly, SameSite=Strict cookie holding a fresh session token.
pub fn session_cookie(token: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::hours(SESSION_TTL_HOURS))
        .build()
}

/// Expired cookie that clears the session on the client.
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}
