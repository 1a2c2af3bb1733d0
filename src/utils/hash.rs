// src/utils/hash.rs
//
// Argon2 hashing for portal account passwords. Hall ticket numbers are
// identifiers for display and audit, never credentials, so only the
// password column is ever hashed.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::AppError;

/// Hashes a plaintext password with a fresh random salt, producing the
/// PHC string stored in the users table.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .to_string();

    Ok(password_hash)
}

/// Checks a login attempt against a stored hash. A mismatch is just
/// `false`; a malformed stored hash is an internal error, since only
/// `hash_password` output should ever reach the database.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies_and_rejects_wrong_input() {
        let hash = hash_password("pass123").unwrap();

        assert!(verify_password("pass123", &hash).unwrap());
        assert!(!verify_password("pass124", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted_per_call() {
        let first = hash_password("pass123").unwrap();
        let second = hash_password("pass123").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn malformed_stored_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("pass123", "not-a-phc-string").is_err());
    }
}
