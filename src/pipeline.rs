//! Security pipeline assembly
//!
//! An explicit path-to-handler mapping, built once at startup. Handler
//! implementations are swapped by registering different trait objects as
//! app data (see [`crate::authentication`]); endpoint paths are swapped
//! here. Requests outside these paths are untouched and fall through to
//! whatever the embedding application mounts.

use actix_web::web;

use crate::handlers::{
    exchange_code, federated_callback, federated_sign_in, health, password_login, userinfo,
};
use crate::settings::PassgateSettings;

/// Path-keyed dispatch table for the authentication endpoints
#[derive(Debug, Clone)]
pub struct Pipeline {
    login_path: String,
    federated_sign_in_path: String,
    callback_path: String,
    exchange_path: String,
    userinfo_path: String,
}

impl Pipeline {
    #[must_use]
    pub fn from_settings(settings: &PassgateSettings) -> Self {
        Self {
            login_path: settings.login.path.clone(),
            federated_sign_in_path: settings.login.federated_path.clone(),
            callback_path: settings.login.callback_path.clone(),
            exchange_path: settings.login.exchange_path.clone(),
            userinfo_path: settings.login.userinfo_path.clone(),
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, path: &str) -> Self {
        self.login_path = path.to_string();
        self
    }

    #[must_use]
    pub fn with_callback_path(mut self, path: &str) -> Self {
        self.callback_path = path.to_string();
        self
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    /// Register all authentication routes on an actix service config
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg
            // Password login
            .route(&self.login_path, web::post().to(password_login))
            // Federated login
            .route(
                &self.federated_sign_in_path,
                web::get().to(federated_sign_in),
            )
            .route(&self.callback_path, web::get().to(federated_callback))
            // One-time code exchange for the SPA hand-off
            .route(&self.exchange_path, web::post().to(exchange_code))
            // Bearer-token introspection
            .route(&self.userinfo_path, web::get().to(userinfo))
            // Health endpoint
            .route("/ping", web::get().to(health));
    }
}
