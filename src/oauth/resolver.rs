//! Federated identity resolution
//!
//! Completes a federated login after the authorization-request store has
//! validated the callback state: exchange the code, establish the provider's
//! view of the user (validated ID token or userinfo response), and map the
//! provider subject onto a local principal under the provisioning policy.

use std::sync::Arc;

use crate::authreq::AuthorizationRequest;
use crate::models::{AuthFailure, AuthenticatedPrincipal, FederatedProfile};
use crate::oauth::jwt_validation::ExpectedClaims;
use crate::oauth::{JwtValidator, OAuthCallback, OAuthConfig};
use crate::users::UserStore;

pub struct FederatedIdentityResolver {
    config: Arc<OAuthConfig>,
    validator: JwtValidator,
    users: Arc<dyn UserStore>,
    auto_provision: bool,
}

impl FederatedIdentityResolver {
    #[must_use]
    pub fn new(config: Arc<OAuthConfig>, users: Arc<dyn UserStore>, auto_provision: bool) -> Self {
        Self {
            config,
            validator: JwtValidator::new(),
            users,
            auto_provision,
        }
    }

    /// Resolve a callback into an authenticated principal
    ///
    /// The caller has already matched `callback.state` against the stored
    /// authorization request; this method trusts `request` and performs the
    /// remaining transitions. Provider failures are terminal: the
    /// authorization code is single-use, so nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` for provider-reported errors, exchange
    /// failures, and unusable profiles; `BadCredentials` when the identity
    /// is not linked and auto-provisioning is off; `AccountDisabled` when
    /// the mapped principal is disabled
    pub async fn resolve(
        &self,
        callback: &OAuthCallback,
        request: &AuthorizationRequest,
    ) -> Result<AuthenticatedPrincipal, AuthFailure> {
        if let Some(ref error) = callback.error {
            let description = callback.error_description.as_deref().unwrap_or("");
            log::warn!(
                "Provider '{}' returned error on callback: {error} {description}",
                request.provider
            );
            return Err(AuthFailure::ProviderError(format!(
                "provider returned '{error}'"
            )));
        }

        let code = callback.code.as_deref().ok_or_else(|| {
            log::warn!("Callback for '{}' carried no code", request.provider);
            AuthFailure::ProviderError("no authorization code received".to_string())
        })?;

        let exchange = self.config.exchange_code(&request.provider, code).await?;

        let profile = self.fetch_profile(request, &exchange).await?;
        log::info!(
            "Resolved federated profile for provider '{}' (subject '{}')",
            request.provider,
            profile.subject
        );

        self.map_to_principal(&request.provider, profile).await
    }

    /// Establish the provider's view of the user
    ///
    /// OIDC providers must present a valid ID token; plain OAuth2 providers
    /// fall back to the userinfo endpoint.
    async fn fetch_profile(
        &self,
        request: &AuthorizationRequest,
        exchange: &crate::oauth::TokenExchange,
    ) -> Result<FederatedProfile, AuthFailure> {
        let runtime = self.config.provider(&request.provider).ok_or_else(|| {
            AuthFailure::ProviderError(format!("provider '{}' not configured", request.provider))
        })?;

        if let Some(ref jwks_uri) = runtime.jwks_uri {
            let id_token = exchange.id_token.as_deref().ok_or_else(|| {
                AuthFailure::ProviderError("OIDC provider returned no ID token".to_string())
            })?;
            let client_id = runtime.settings.get_client_id().ok_or_else(|| {
                AuthFailure::ProviderError("client id missing".to_string())
            })?;

            let expected = ExpectedClaims {
                issuer: runtime.issuer.as_deref(),
                audience: &client_id,
                nonce: Some(&request.nonce),
            };
            let claims = self
                .validator
                .validate_id_token(id_token, &request.provider, jwks_uri, &expected)
                .await
                .map_err(|e| {
                    log::warn!("ID token validation failed for '{}': {e}", request.provider);
                    AuthFailure::ProviderError(format!("ID token validation failed: {e}"))
                })?;

            let subject = claims.sub.clone().ok_or_else(|| {
                AuthFailure::ProviderError("ID token missing 'sub' claim".to_string())
            })?;
            return Ok(FederatedProfile {
                subject,
                email: claims.email.clone(),
                name: claims.display_name(),
            });
        }

        let access_token = exchange.access_token.as_deref().ok_or_else(|| {
            AuthFailure::ProviderError("provider returned no access token".to_string())
        })?;
        let userinfo = self
            .config
            .fetch_userinfo(&request.provider, access_token)
            .await?;
        profile_from_userinfo(&userinfo)
    }

    /// Map a federated profile onto a local principal
    async fn map_to_principal(
        &self,
        provider: &str,
        profile: FederatedProfile,
    ) -> Result<AuthenticatedPrincipal, AuthFailure> {
        let existing = self.users.find_by_subject(provider, &profile.subject).await;

        let record = match existing {
            Some(record) => record,
            None if self.auto_provision => {
                log::info!(
                    "Provisioning new principal for provider '{provider}' subject '{}'",
                    profile.subject
                );
                self.users
                    .create_federated(provider, &profile)
                    .await
                    .map_err(|e| {
                        log::error!("Provisioning failed for '{provider}': {e}");
                        AuthFailure::ProviderError(format!("provisioning failed: {e}"))
                    })?
            }
            None => {
                log::warn!(
                    "No linked principal for provider '{provider}' subject '{}' \
                     and auto-provisioning is disabled",
                    profile.subject
                );
                return Err(AuthFailure::BadCredentials(
                    "federated identity not linked to any account".to_string(),
                ));
            }
        };

        if record.disabled {
            log::warn!(
                "Federated login rejected: account '{}' is disabled",
                record.identifier
            );
            return Err(AuthFailure::AccountDisabled(format!(
                "account '{}' is disabled",
                record.identifier
            )));
        }

        Ok(AuthenticatedPrincipal {
            principal_id: record.id,
            identifier: record.identifier,
            // Prefer stored attributes; fall back to the fresh profile
            name: record.display_name.or(profile.name),
            email: record.email.or(profile.email),
            provider: Some(provider.to_string()),
        })
    }
}

/// Extract a profile from a userinfo response
///
/// The subject is `sub` per OIDC, with `id` as a fallback for plain OAuth2
/// providers that predate the convention.
fn profile_from_userinfo(userinfo: &serde_json::Value) -> Result<FederatedProfile, AuthFailure> {
    let subject = userinfo
        .get("sub")
        .or_else(|| userinfo.get("id"))
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| {
            AuthFailure::ProviderError("userinfo response missing subject".to_string())
        })?;

    Ok(FederatedProfile {
        subject,
        email: userinfo
            .get("email")
            .and_then(|v| v.as_str())
            .map(ToString::to_string),
        name: userinfo
            .get("name")
            .and_then(|v| v.as_str())
            .map(ToString::to_string),
    })
}
