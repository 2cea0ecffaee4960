//! Password authentication
//!
//! The credential verifier checks an identifier/secret pair against the user
//! store, delegating hash comparison to a pluggable [`PasswordHasher`]
//! strategy (Argon2id by default).

pub mod hasher;
pub mod verifier;

pub use hasher::{Argon2Hasher, PasswordHasher};
pub use verifier::CredentialVerifier;
