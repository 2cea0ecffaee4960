//! Credential verification against the user store

use std::sync::Arc;

use crate::models::{AuthFailure, AuthenticatedPrincipal};
use crate::password::PasswordHasher;
use crate::users::UserStore;

/// Secret hashed once at construction so the unknown-identifier path costs
/// the same as a real comparison
const TIMING_EQUALIZER_SECRET: &str = "passgate-timing-equalizer";

/// Verifies identifier/secret pairs
///
/// Unknown identifiers and wrong secrets are indistinguishable: both return
/// [`AuthFailure::BadCredentials`], and the unknown-identifier path still
/// runs a full hash verification against a dummy hash. The disabled-account
/// check runs only after the secret comparison succeeds, so account state
/// does not leak through timing.
pub struct CredentialVerifier {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    dummy_hash: String,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        let dummy_hash = hasher
            .hash(TIMING_EQUALIZER_SECRET)
            .unwrap_or_else(|_| String::new());
        Self {
            users,
            hasher,
            dummy_hash,
        }
    }

    /// Verify a credential pair
    ///
    /// Both outcomes produce an audit log entry carrying the identifier and
    /// reason; the secret itself is never logged.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthFailure`] describing why verification failed
    pub async fn verify(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<AuthenticatedPrincipal, AuthFailure> {
        let user = self.users.find_by_identifier(identifier).await;

        let Some(user) = user else {
            // Burn the same hashing work as the known-identifier path
            let _ = self.hasher.verify(secret, &self.dummy_hash);
            log::warn!("Login failed for identifier '{identifier}': unknown identifier");
            return Err(AuthFailure::BadCredentials(format!(
                "unknown identifier '{identifier}'"
            )));
        };

        let Some(ref stored_hash) = user.password_hash else {
            // Federated-only account; same external outcome as a wrong secret
            let _ = self.hasher.verify(secret, &self.dummy_hash);
            log::warn!("Login failed for identifier '{identifier}': no password set");
            return Err(AuthFailure::BadCredentials(format!(
                "no password set for '{identifier}'"
            )));
        };

        if !self.hasher.verify(secret, stored_hash) {
            log::warn!("Login failed for identifier '{identifier}': secret mismatch");
            return Err(AuthFailure::BadCredentials(format!(
                "secret mismatch for '{identifier}'"
            )));
        }

        // Checked after the secret comparison; see type docs
        if user.disabled {
            log::warn!("Login failed for identifier '{identifier}': account disabled");
            return Err(AuthFailure::AccountDisabled(format!(
                "account '{identifier}' is disabled"
            )));
        }

        log::info!("Login succeeded for identifier '{identifier}'");
        Ok(AuthenticatedPrincipal {
            principal_id: user.id,
            identifier: user.identifier,
            name: user.display_name,
            email: user.email,
            provider: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::Argon2Hasher;
    use crate::users::{InMemoryUserStore, UserRecord};

    fn store_with_alice(disabled: bool) -> Arc<InMemoryUserStore> {
        let hasher = Argon2Hasher;
        let store = InMemoryUserStore::new().with_user(UserRecord {
            id: "id-alice".to_string(),
            identifier: "alice".to_string(),
            password_hash: Some(hasher.hash("correct-pw").unwrap()),
            display_name: Some("Alice Example".to_string()),
            email: Some("alice@example.com".to_string()),
            disabled,
            identities: vec![],
        });
        Arc::new(store)
    }

    fn verifier(store: Arc<InMemoryUserStore>) -> CredentialVerifier {
        CredentialVerifier::new(store, Arc::new(Argon2Hasher))
    }

    #[actix_web::test]
    async fn test_correct_secret_succeeds() {
        let verifier = verifier(store_with_alice(false));
        let principal = verifier.verify("alice", "correct-pw").await.unwrap();
        assert_eq!(principal.identifier, "alice");
        assert_eq!(principal.principal_id, "id-alice");
        assert!(principal.provider.is_none());
    }

    #[actix_web::test]
    async fn test_wrong_secret_and_unknown_user_are_indistinguishable() {
        let verifier = verifier(store_with_alice(false));

        let wrong_secret = verifier.verify("alice", "wrong-pw").await.unwrap_err();
        let unknown_user = verifier.verify("mallory", "wrong-pw").await.unwrap_err();

        assert_eq!(wrong_secret.reason(), "BadCredentials");
        assert_eq!(unknown_user.reason(), "BadCredentials");
        assert_eq!(wrong_secret.public_reason(), unknown_user.public_reason());
        assert_eq!(wrong_secret.public_message(), unknown_user.public_message());
    }

    #[actix_web::test]
    async fn test_disabled_account_rejected_after_secret_check() {
        let verifier = verifier(store_with_alice(true));

        // Correct secret on a disabled account
        let failure = verifier.verify("alice", "correct-pw").await.unwrap_err();
        assert_eq!(failure.reason(), "AccountDisabled");

        // Wrong secret on a disabled account reports BadCredentials,
        // not the account state
        let failure = verifier.verify("alice", "wrong-pw").await.unwrap_err();
        assert_eq!(failure.reason(), "BadCredentials");
    }

    #[actix_web::test]
    async fn test_federated_only_account_cannot_password_login() {
        let store = InMemoryUserStore::new().with_user(UserRecord {
            id: "id-fed".to_string(),
            identifier: "fed-only".to_string(),
            password_hash: None,
            display_name: None,
            email: None,
            disabled: false,
            identities: vec![],
        });
        let verifier = verifier(Arc::new(store));

        let failure = verifier.verify("fed-only", "anything").await.unwrap_err();
        assert_eq!(failure.reason(), "BadCredentials");
    }
}
