//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls storage or a service
//! 3. Returns HTTP response (JSON, status code)

/// Admin login, logout, bootstrap and password endpoints
pub mod auth;
/// Admin card key endpoints
pub mod card_keys;
pub mod health;
/// Public redemption endpoint
pub mod redemption;
