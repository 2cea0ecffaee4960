#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the passgate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod authentication;
pub mod authreq;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod outcome;
pub mod password;
pub mod pipeline;
pub mod settings;
pub mod token;
pub mod users;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use authentication::{AuthenticationServiceFactory, AuthenticationServices};
pub use authreq::AuthorizationRequestStore;
pub use models::{AuthFailure, AuthenticatedPrincipal, AuthenticationResult};
pub use oauth::{FederatedIdentityResolver, OAuthConfig};
pub use password::CredentialVerifier;
pub use pipeline::Pipeline;
pub use settings::PassgateSettings;
