//! Password hashing for stored credentials.
//!
//! bcrypt was chosen over argon2 because the pack's only credential-store
//! precedent (a sibling ircd project) hashes passwords with bcrypt; nothing
//! in the corpus pulls in an argon2 crate.

use bcrypt::{hash, verify, BcryptError};

/// Default bcrypt cost. Matches bcrypt's own `DEFAULT_COST`; kept as our own
/// constant so a config override has somewhere explicit to point at.
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, BcryptError> {
    hash(plaintext, cost)
}

pub fn verify_password(plaintext: &str, hashed: &str) -> Result<bool, BcryptError> {
    verify(plaintext, hashed)
}
