//! Test fixtures: settings, seeded users, and wired services

use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::authentication::{AuthenticationServiceFactory, AuthenticationServices};
use crate::password::{Argon2Hasher, PasswordHasher};
use crate::settings::{PassgateSettings, ProviderSettings};
use crate::users::{InMemoryUserStore, LinkedIdentity, UserRecord, UserStore};

pub const TEST_AUTHREQ_SECRET: &str = "test-authreq-secret-32-chars-min!";
pub const TEST_TOKEN_SECRET: &str = "test-token-secret-32-chars-long!!";

/// Argon2 hashing is deliberately slow; hash the fixture passwords once
static CORRECT_PW_HASH: Lazy<String> =
    Lazy::new(|| Argon2Hasher.hash("correct-pw").expect("hashing fixture password"));

/// Settings wired for tests: fixed secrets, insecure cookies, localhost URLs
#[must_use]
pub fn create_test_settings() -> PassgateSettings {
    let mut settings = PassgateSettings::default();
    settings.application.public_url = "http://localhost:8080".to_string();
    settings.authorization_request.secret = TEST_AUTHREQ_SECRET.to_string();
    settings.token.secret = TEST_TOKEN_SECRET.to_string();
    settings.token.issuer = "https://passgate.test".to_string();
    settings.token.audience = "https://api.passgate.test".to_string();
    settings.cookies.secure = false;
    settings.provisioning.auto_provision = true;
    settings
}

/// A provider with fixed endpoints, for tests that never reach a network
/// or point these at a local mock server
#[must_use]
pub fn test_provider(name: &str, base_url: &str) -> ProviderSettings {
    ProviderSettings {
        name: name.to_string(),
        authorization_endpoint: Some(format!("{base_url}/authorize")),
        token_endpoint: Some(format!("{base_url}/token")),
        userinfo_endpoint: Some(format!("{base_url}/userinfo")),
        client_id: Some("test-client-id".to_string()),
        client_secret: Some("test-client-secret".to_string()),
        scopes: vec!["profile".to_string(), "email".to_string()],
        ..Default::default()
    }
}

/// A user store holding alice (password `correct-pw`), a disabled account,
/// and a principal linked to the `acme` provider
#[must_use]
pub fn seeded_user_store() -> Arc<InMemoryUserStore> {
    let store = InMemoryUserStore::new()
        .with_user(UserRecord {
            id: "id-alice".to_string(),
            identifier: "alice".to_string(),
            password_hash: Some(CORRECT_PW_HASH.clone()),
            display_name: Some("Alice Example".to_string()),
            email: Some("alice@example.com".to_string()),
            disabled: false,
            identities: vec![],
        })
        .with_user(UserRecord {
            id: "id-dora".to_string(),
            identifier: "dora".to_string(),
            password_hash: Some(CORRECT_PW_HASH.clone()),
            display_name: None,
            email: None,
            disabled: true,
            identities: vec![],
        })
        .with_user(UserRecord {
            id: "id-linked".to_string(),
            identifier: "linked".to_string(),
            password_hash: None,
            display_name: Some("Linked Account".to_string()),
            email: Some("linked@example.com".to_string()),
            disabled: false,
            identities: vec![LinkedIdentity {
                provider: "acme".to_string(),
                subject: "linked-subject".to_string(),
            }],
        });
    Arc::new(store)
}

/// Build the full service graph for the given settings and store
///
/// # Panics
///
/// Panics if factory construction fails; test settings never require a
/// reachable discovery endpoint
pub async fn build_test_services(
    settings: &PassgateSettings,
    users: Arc<dyn UserStore>,
) -> AuthenticationServices {
    AuthenticationServiceFactory::build(settings, users)
        .await
        .expect("building test services")
}
