//! Explicit construction of the authentication services
//!
//! Every collaborator is passed at construction, no ambient container: the
//! factory reads settings, derives keys, and wires the verifier, resolver,
//! stores, and outcome handler together. Applications swap any piece by
//! building [`AuthenticationServices`] by hand.

pub mod factory;

pub use factory::{AuthenticationConfig, AuthenticationServiceFactory, AuthenticationServices};
