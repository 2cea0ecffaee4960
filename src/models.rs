//! Core data types shared across the authentication pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A login credential pair, parsed from the form-encoded login body.
///
/// Transient: lives only for the duration of the login request. The secret
/// is redacted from debug output and never serialized or logged.
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub identifier: String,
    pub secret: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Profile data extracted from an identity provider (ID token claims or
/// the userinfo response)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedProfile {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// An authenticated principal, produced by the credential verifier or the
/// federated identity resolver. Immutable once constructed; the outcome
/// handler turns it into an [`AuthenticationResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    pub principal_id: String,
    pub identifier: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Set for federated logins: which provider vouched for this principal
    pub provider: Option<String>,
}

impl AuthenticatedPrincipal {
    /// The client-facing summary of this principal
    #[must_use]
    pub fn to_summary(&self) -> UserSummary {
        UserSummary {
            id: self.principal_id.clone(),
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            provider: self.provider.clone(),
        }
    }
}

/// User summary serialized into success response bodies and bearer tokens
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// The uniform success payload: a bearer token plus the user summary.
/// Produced exactly once per successful authentication.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationResult {
    pub token: String,
    pub user: UserSummary,
}

/// Terminal authentication failures
///
/// Constructed at the point of failure and propagated unchanged to the
/// outcome handler. None of these are retried; the client must re-initiate.
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("invalid credentials: {0}")]
    BadCredentials(String),
    #[error("account disabled: {0}")]
    AccountDisabled(String),
    #[error("identity provider error: {0}")]
    ProviderError(String),
    #[error("authorization state invalid: {0}")]
    InvalidState(String),
    #[error("authorization request expired: {0}")]
    Expired(String),
}

impl AuthFailure {
    /// Internal reason name, used for audit logging
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::BadCredentials(_) => "BadCredentials",
            AuthFailure::AccountDisabled(_) => "AccountDisabled",
            AuthFailure::ProviderError(_) => "ProviderError",
            AuthFailure::InvalidState(_) => "InvalidState",
            AuthFailure::Expired(_) => "Expired",
        }
    }

    /// Externally visible reason
    ///
    /// `Expired` is reported as `InvalidState`: a stale tab and a forged
    /// state must be indistinguishable to the caller.
    #[must_use]
    pub fn public_reason(&self) -> &'static str {
        match self {
            AuthFailure::Expired(_) => "InvalidState",
            other => other.reason(),
        }
    }

    /// Externally visible message, scrubbed of internal detail
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthFailure::BadCredentials(_) | AuthFailure::AccountDisabled(_) => {
                "Invalid identifier or secret"
            }
            AuthFailure::ProviderError(_) => "Federated sign-in failed, please try again",
            AuthFailure::InvalidState(_) | AuthFailure::Expired(_) => {
                "Login expired, please try again"
            }
        }
    }
}
