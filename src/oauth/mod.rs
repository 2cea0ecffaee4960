//! OAuth2 / OIDC federated login
//!
//! Provider configuration and discovery, authorization-code exchange, ID
//! token validation, and the identity resolver that maps a provider subject
//! onto a local principal.

pub mod config;
pub mod jwt_validation;
pub mod resolver;

pub use config::{OAuthConfig, RuntimeProvider, TokenExchange};
pub use jwt_validation::{IdTokenClaims, JwtValidationError, JwtValidator};
pub use resolver::FederatedIdentityResolver;

use serde::Deserialize;

/// Callback parameters sent by the identity provider
#[derive(Deserialize, Debug)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}
