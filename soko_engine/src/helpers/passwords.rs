use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::traits::AuthApiError;

/// Hash a password with Argon2id and a fresh salt, returning the PHC string to store.
pub fn hash_password(password: &str) -> Result<String, AuthApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthApiError::PasswordHash(e.to_string()))
}

/// Check a password against a stored PHC string. Argon2 is deliberately slow; call this from
/// a blocking context (the API objects use `spawn_blocking`).
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AuthApiError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| AuthApiError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}
