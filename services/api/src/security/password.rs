//! services/api/src/security/password.rs

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};
use roma_core::ports::{PasswordHasher, PortError, PortResult};
use tracing::error;

/// Argon2id with the crate's default parameters, PHC string output.
#[derive(Clone, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> PortResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| {
                error!("Failed to hash password: {:?}", e);
                PortError::Unexpected("password hashing failed".to_string())
            })
    }

    fn verify(&self, password: &str, hash: &str) -> PortResult<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!("Failed to parse password hash: {:?}", e);
            PortError::Unexpected("stored password hash is malformed".to_string())
        })?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_and_differ_per_salt() {
        let hasher = Argon2Hasher;
        let a = hasher.hash("correct horse").unwrap();
        let b = hasher.hash("correct horse").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify("correct horse", &a).unwrap());
        assert!(!hasher.verify("battery staple", &a).unwrap());
        assert!(hasher.verify("x", "not-a-phc-string").is_err());
    }
}
