use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

use crate::error::AuthError;

/// Salted argon2id hash in PHC string form.
pub fn hash(plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Internal(format!("argon2 hash: {e}")))
}

/// Checks `plain` against a stored PHC hash. Argon2 compares in constant time.
pub fn verify(plain: &str, stored: &str) -> Result<bool, AuthError> {
    let parsed =
        PasswordHash::new(stored).map_err(|e| AuthError::Internal(format!("argon2 parse: {e}")))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
