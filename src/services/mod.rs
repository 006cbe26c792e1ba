//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They work against the `Storage` trait, never a concrete backend.

pub mod auth_service;
pub mod redemption_service;
