//! Password hashing strategies
//!
//! Argon2id is the default; the trait keeps the comparison pluggable for
//! stores with legacy hash formats.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Argon2,
};

/// Pluggable password hashing strategy
pub trait PasswordHasher: Send + Sync {
    /// Hash a secret for storage
    ///
    /// # Errors
    ///
    /// Returns an error if hashing fails
    fn hash(&self, secret: &str) -> anyhow::Result<String>;

    /// Verify a secret against a stored hash, in constant time
    fn verify(&self, secret: &str, stored_hash: &str) -> bool;
}

/// Argon2id strategy producing PHC-format hash strings
#[derive(Default, Clone, Copy)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Password hashing failed: {e}"))?;
        Ok(hash.to_string())
    }

    fn verify(&self, secret: &str, stored_hash: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(stored_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed_hash)
            .is_ok()
    }
}
