//! Account pseudonym hashing
//!
//! The ledger and every published artifact identify an account only by a
//! one-way hash of its upstream user id. The raw id is hashed as soon as the
//! profile response arrives and is never stored or logged.

use sha2::{Digest, Sha256};

/// Derive the privacy-preserving account pseudonym from an upstream user id.
///
/// Returns the lowercase hex SHA-256 digest (64 characters).
pub fn account_pseudonym(upstream_user_id: &str) -> String {
    format!("{:x}", Sha256::digest(upstream_user_id.as_bytes()))
}
