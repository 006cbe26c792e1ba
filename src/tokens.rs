//! Secure token generation.
//!
//! Redemption links carry a 64-character hex token (32 random bytes, 256 bits).
//! At that size no uniqueness check is done up front; storage backends still
//! refuse a duplicate on insert.

use sha2::{Digest, Sha256};

/// Length in bytes of the random part of a secure token.
pub const SECURE_TOKEN_BYTES: usize = 32;

/// Generate a new redemption token (32 bytes = 64 hex chars).
pub fn generate_secure_token() -> String {
    let bytes: [u8; SECURE_TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Short, non-reversible identifier for a secure token, safe to put in logs.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..12].to_string()
}
