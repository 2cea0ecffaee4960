//! Service factory for the authentication pipeline

use actix_web::web;
use std::sync::Arc;

use crate::authreq::AuthorizationRequestStore;
use crate::oauth::{FederatedIdentityResolver, OAuthConfig};
use crate::outcome::{OutcomeHandler, TokenOutcomeHandler};
use crate::password::{Argon2Hasher, CredentialVerifier};
use crate::settings::PassgateSettings;
use crate::token::{ExchangeCodeStore, HmacTokenIssuer, TokenIssuer};
use crate::users::UserStore;

/// Key material and policy distilled from settings
#[derive(Debug, Clone)]
pub struct AuthenticationConfig {
    pub authreq_secret: Vec<u8>,
    pub token_secret: Vec<u8>,
    pub cookie_secure: bool,
    pub authreq_ttl_minutes: i64,
    pub exchange_code_ttl_seconds: i64,
    pub auto_provision: bool,
}

impl AuthenticationConfig {
    #[must_use]
    pub fn from_settings(settings: &PassgateSettings) -> Self {
        Self {
            authreq_secret: settings.authorization_request.secret.as_bytes().to_vec(),
            token_secret: settings.token.secret.as_bytes().to_vec(),
            cookie_secure: settings.cookies.secure,
            authreq_ttl_minutes: i64::try_from(settings.authorization_request.ttl_minutes)
                .unwrap_or(5),
            exchange_code_ttl_seconds: i64::try_from(settings.login.exchange_code_ttl_seconds)
                .unwrap_or(60),
            auto_provision: settings.provisioning.auto_provision,
        }
    }
}

/// The complete, wired authentication pipeline services
pub struct AuthenticationServices {
    pub verifier: Arc<CredentialVerifier>,
    pub resolver: Arc<FederatedIdentityResolver>,
    pub authreq_store: Arc<AuthorizationRequestStore>,
    pub oauth_config: Arc<OAuthConfig>,
    pub issuer: Arc<dyn TokenIssuer>,
    pub exchange: Arc<ExchangeCodeStore>,
    pub outcome: Arc<dyn OutcomeHandler>,
    pub settings: PassgateSettings,
}

impl AuthenticationServices {
    /// Register every service as actix app data
    ///
    /// Handlers extract these by type; tests and `main` share this wiring.
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.settings.clone()))
            .app_data(web::Data::from(self.verifier.clone()))
            .app_data(web::Data::from(self.resolver.clone()))
            .app_data(web::Data::from(self.authreq_store.clone()))
            .app_data(web::Data::from(self.oauth_config.clone()))
            .app_data(web::Data::from(self.exchange.clone()))
            .app_data(web::Data::from(self.issuer.clone()))
            .app_data(web::Data::from(self.outcome.clone()));
    }
}

/// Factory for creating authentication services with explicit dependencies
pub struct AuthenticationServiceFactory;

impl AuthenticationServiceFactory {
    /// Build the complete service graph from settings and a user store
    ///
    /// # Errors
    ///
    /// Returns an error if provider initialization fails (unreachable
    /// discovery endpoint, missing provider endpoints)
    pub async fn build(
        settings: &PassgateSettings,
        users: Arc<dyn UserStore>,
    ) -> anyhow::Result<AuthenticationServices> {
        let config = AuthenticationConfig::from_settings(settings);

        let mut oauth_config = OAuthConfig::new();
        oauth_config.initialize_from_settings(settings).await?;
        let oauth_config = Arc::new(oauth_config);

        let enabled = oauth_config.enabled_providers();
        if enabled.is_empty() {
            log::info!("No identity providers configured; password login only");
        } else {
            log::info!("Federated login enabled for: {}", enabled.join(", "));
        }

        let verifier = Arc::new(CredentialVerifier::new(
            users.clone(),
            Arc::new(Argon2Hasher),
        ));

        let resolver = Arc::new(FederatedIdentityResolver::new(
            oauth_config.clone(),
            users,
            config.auto_provision,
        ));

        let authreq_store = Arc::new(AuthorizationRequestStore::new(
            &config.authreq_secret,
            config.authreq_ttl_minutes,
            config.cookie_secure,
        ));

        let issuer: Arc<dyn TokenIssuer> = Arc::new(HmacTokenIssuer::new(
            &config.token_secret,
            &settings.token.issuer,
            &settings.token.audience,
            i64::try_from(settings.token.duration_hours).unwrap_or(24),
        ));

        let exchange = Arc::new(ExchangeCodeStore::new(
            &config.token_secret,
            config.exchange_code_ttl_seconds,
        ));

        let outcome: Arc<dyn OutcomeHandler> = Arc::new(TokenOutcomeHandler::new(
            issuer.clone(),
            exchange.clone(),
            &settings.login.spa_callback_url,
        ));

        Ok(AuthenticationServices {
            verifier,
            resolver,
            authreq_store,
            oauth_config,
            issuer,
            exchange,
            outcome,
            settings: settings.clone(),
        })
    }
}
