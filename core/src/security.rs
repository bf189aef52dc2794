//! Password hashing, session tokens, and content hashing.

use sha2::{Digest, Sha256};

/// Bcrypt-hash a plaintext password (salt is embedded in the hash string).
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

/// Check a plaintext password against a stored bcrypt hash. A malformed
/// hash counts as a mismatch rather than an error.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

/// Random opaque session token.
pub fn generate_session_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Hex SHA-256 of arbitrary bytes; used for content-addressed audio filenames.
pub fn content_hash(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
