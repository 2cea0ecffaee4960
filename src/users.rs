//! User store collaborator seam
//!
//! Lookup by identifier and by federated subject, plus policy-gated
//! provisioning, live behind the [`UserStore`] trait so the backing store
//! (database, directory, remote service) is swappable. The crate ships an
//! in-memory reference implementation used by the default wiring and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::FederatedProfile;

/// A federated identity linked to a local principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedIdentity {
    pub provider: String,
    pub subject: String,
}

/// A stored user record
///
/// `password_hash` is a PHC-format string owned by the hashing strategy;
/// `None` marks a federated-only account that cannot log in by password.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub identifier: String,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub disabled: bool,
    pub identities: Vec<LinkedIdentity>,
}

/// Pluggable user store
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a principal by login identifier
    async fn find_by_identifier(&self, identifier: &str) -> Option<UserRecord>;

    /// Look up a principal by a linked federated identity
    async fn find_by_subject(&self, provider: &str, subject: &str) -> Option<UserRecord>;

    /// Provision a fresh principal for a federated profile
    ///
    /// Only called when the provisioning policy allows it. Implementations
    /// must not link the profile to any existing account.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the new record
    async fn create_federated(
        &self,
        provider: &str,
        profile: &FederatedProfile,
    ) -> anyhow::Result<UserRecord>;
}

/// In-memory reference implementation
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, keyed by identifier
    pub fn insert(&self, record: UserRecord) {
        if let Ok(mut users) = self.users.write() {
            users.insert(record.identifier.clone(), record);
        }
    }

    /// Builder-style insert for wiring and tests
    #[must_use]
    pub fn with_user(self, record: UserRecord) -> Self {
        self.insert(record);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().map(|u| u.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_identifier(&self, identifier: &str) -> Option<UserRecord> {
        self.users.read().ok()?.get(identifier).cloned()
    }

    async fn find_by_subject(&self, provider: &str, subject: &str) -> Option<UserRecord> {
        let users = self.users.read().ok()?;
        users
            .values()
            .find(|u| {
                u.identities
                    .iter()
                    .any(|i| i.provider == provider && i.subject == subject)
            })
            .cloned()
    }

    async fn create_federated(
        &self,
        provider: &str,
        profile: &FederatedProfile,
    ) -> anyhow::Result<UserRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        // Identifier must be unique; the provider-qualified subject is,
        // the profile e-mail may not be
        let identifier = format!("{provider}:{}", profile.subject);
        let record = UserRecord {
            id,
            identifier,
            password_hash: None,
            display_name: profile.name.clone(),
            email: profile.email.clone(),
            disabled: false,
            identities: vec![LinkedIdentity {
                provider: provider.to_string(),
                subject: profile.subject.clone(),
            }],
        };
        self.insert(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserRecord {
        UserRecord {
            id: "id-alice".to_string(),
            identifier: "alice".to_string(),
            password_hash: Some("$argon2id$fake".to_string()),
            display_name: Some("Alice Example".to_string()),
            email: Some("alice@example.com".to_string()),
            disabled: false,
            identities: vec![LinkedIdentity {
                provider: "google".to_string(),
                subject: "g-123".to_string(),
            }],
        }
    }

    #[actix_web::test]
    async fn test_find_by_identifier() {
        let store = InMemoryUserStore::new().with_user(alice());
        assert!(store.find_by_identifier("alice").await.is_some());
        assert!(store.find_by_identifier("bob").await.is_none());
    }

    #[actix_web::test]
    async fn test_find_by_subject_requires_exact_pair() {
        let store = InMemoryUserStore::new().with_user(alice());
        assert!(store.find_by_subject("google", "g-123").await.is_some());
        assert!(store.find_by_subject("google", "g-999").await.is_none());
        assert!(store.find_by_subject("github", "g-123").await.is_none());
    }

    #[actix_web::test]
    async fn test_create_federated_provisions_fresh_principal() {
        let store = InMemoryUserStore::new().with_user(alice());
        let profile = FederatedProfile {
            subject: "gh-42".to_string(),
            // Same e-mail as alice: must NOT link to her account
            email: Some("alice@example.com".to_string()),
            name: Some("Alice on GitHub".to_string()),
        };

        let record = store.create_federated("github", &profile).await.unwrap();
        assert_ne!(record.id, "id-alice");
        assert_eq!(record.identifier, "github:gh-42");
        assert!(record.password_hash.is_none());
        assert_eq!(store.len(), 2);

        let found = store.find_by_subject("github", "gh-42").await.unwrap();
        assert_eq!(found.id, record.id);
    }
}
