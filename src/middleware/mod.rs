//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Short-circuit requests (reject unauthorized)

/// Admin session middleware
pub mod auth;
/// Session cookie helpers
pub mod cookies;
