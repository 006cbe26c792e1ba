//! Data models representing stored entities.
//!
//! This module contains all data structures that map to storage records,
//! plus the request/response views built from them.

/// Admin account model
pub mod admin;
/// Card key model
pub mod card_key;
