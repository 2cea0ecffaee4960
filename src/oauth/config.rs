//! Runtime provider configuration and provider HTTP calls
//!
//! Endpoints come from OIDC discovery when a `discovery_url` is configured,
//! explicit settings otherwise. All provider traffic goes through one
//! timeout-bounded `reqwest::Client`; a timeout or protocol error surfaces
//! as `ProviderError` and is never retried, because the authorization code
//! is single-use and already spent by the first attempt.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::models::AuthFailure;
use crate::settings::{PassgateSettings, ProviderSettings};

/// Timeout for token-endpoint and userinfo calls
const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(8);

/// A provider with its endpoints resolved
#[derive(Debug, Clone)]
pub struct RuntimeProvider {
    pub settings: ProviderSettings,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: Option<String>,
    pub jwks_uri: Option<String>,
    pub issuer: Option<String>,
}

/// OIDC discovery document, reduced to the fields this crate consumes
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    id_token: Option<String>,
    expires_in: Option<u64>,
}

/// Result of a successful authorization-code exchange
#[derive(Debug, Clone)]
pub struct TokenExchange {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Configured identity providers and the shared HTTP client
pub struct OAuthConfig {
    providers: HashMap<String, RuntimeProvider>,
    redirect_uri: String,
    http_client: reqwest::Client,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            redirect_uri: String::new(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Resolve all enabled providers from settings
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, a discovery
    /// document cannot be fetched, or a provider is missing endpoints
    pub async fn initialize_from_settings(
        &mut self,
        settings: &PassgateSettings,
    ) -> anyhow::Result<()> {
        self.http_client = reqwest::Client::builder()
            .timeout(PROVIDER_HTTP_TIMEOUT)
            .build()?;
        self.redirect_uri = settings.redirect_uri();

        for provider_settings in settings.get_enabled_providers() {
            let runtime = Self::resolve_provider(&self.http_client, provider_settings).await?;
            log::info!(
                "Configured identity provider '{}' (oidc: {})",
                runtime.settings.name,
                runtime.jwks_uri.is_some()
            );
            self.providers
                .insert(runtime.settings.name.clone(), runtime);
        }

        Ok(())
    }

    /// Resolve one provider's endpoints, via discovery when configured
    async fn resolve_provider(
        client: &reqwest::Client,
        settings: &ProviderSettings,
    ) -> anyhow::Result<RuntimeProvider> {
        let discovery = match &settings.discovery_url {
            Some(url) => Some(fetch_discovery_document(client, url).await?),
            None => None,
        };

        let auth_url = settings
            .authorization_endpoint
            .clone()
            .or_else(|| discovery.as_ref().map(|d| d.authorization_endpoint.clone()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No authorization endpoint for provider '{}'",
                    settings.name
                )
            })?;
        let token_url = settings
            .token_endpoint
            .clone()
            .or_else(|| discovery.as_ref().map(|d| d.token_endpoint.clone()))
            .ok_or_else(|| {
                anyhow::anyhow!("No token endpoint for provider '{}'", settings.name)
            })?;
        let userinfo_url = settings
            .userinfo_endpoint
            .clone()
            .or_else(|| discovery.as_ref().and_then(|d| d.userinfo_endpoint.clone()));
        let jwks_uri = settings
            .jwks_uri
            .clone()
            .or_else(|| discovery.as_ref().and_then(|d| d.jwks_uri.clone()));
        let issuer = settings
            .issuer
            .clone()
            .or_else(|| discovery.as_ref().map(|d| d.issuer.clone()));

        Ok(RuntimeProvider {
            settings: settings.clone(),
            auth_url,
            token_url,
            userinfo_url,
            jwks_uri,
            issuer,
        })
    }

    #[must_use]
    pub fn is_configured(&self, provider: &str) -> bool {
        self.providers
            .get(provider)
            .is_some_and(|p| p.settings.get_client_id().is_some())
    }

    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&RuntimeProvider> {
        self.providers.get(name)
    }

    #[must_use]
    pub fn enabled_providers(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Build the authorization URL for a provider
    ///
    /// The nonce is only attached for OIDC providers, where it binds the ID
    /// token to this authorization request.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown, has no client ID, or its
    /// authorization endpoint is not a valid URL
    pub fn authorization_url(
        &self,
        provider: &str,
        state: &str,
        nonce: &str,
    ) -> anyhow::Result<String> {
        let runtime = self
            .providers
            .get(provider)
            .ok_or_else(|| anyhow::anyhow!("Provider '{provider}' not configured"))?;
        let client_id = runtime
            .settings
            .get_client_id()
            .ok_or_else(|| anyhow::anyhow!("Client ID not configured for '{provider}'"))?;

        let scopes = runtime.settings.scopes.join(" ");
        let mut url = url::Url::parse(&runtime.auth_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes)
            .append_pair("state", state);

        if runtime.jwks_uri.is_some() {
            url.query_pairs_mut().append_pair("nonce", nonce);
        }

        if let Some(ref extra) = runtime.settings.extra_auth_params {
            for (key, value) in extra {
                url.query_pairs_mut().append_pair(key, value);
            }
        }

        log::debug!("Built authorization URL for '{provider}' with scopes '{scopes}'");
        Ok(url.to_string())
    }

    /// Exchange an authorization code at the provider's token endpoint
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on any network, timeout, or protocol failure
    pub async fn exchange_code(
        &self,
        provider: &str,
        code: &str,
    ) -> Result<TokenExchange, AuthFailure> {
        let runtime = self.providers.get(provider).ok_or_else(|| {
            AuthFailure::ProviderError(format!("provider '{provider}' not configured"))
        })?;
        let client_id = runtime.settings.get_client_id().ok_or_else(|| {
            AuthFailure::ProviderError(format!("client id missing for '{provider}'"))
        })?;
        let client_secret = runtime.settings.get_client_secret().ok_or_else(|| {
            AuthFailure::ProviderError(format!("client secret missing for '{provider}'"))
        })?;

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", &self.redirect_uri);
        params.insert("client_id", &client_id);
        params.insert("client_secret", &client_secret);

        log::info!("Exchanging authorization code with provider '{provider}'");
        let response = self
            .http_client
            .post(&runtime.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                log::error!("Token exchange request to '{provider}' failed: {e}");
                AuthFailure::ProviderError(format!("token exchange request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Token exchange with '{provider}' returned {status}: {body}");
            return Err(AuthFailure::ProviderError(format!(
                "token endpoint returned {status}"
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            log::error!("Token response from '{provider}' unparseable: {e}");
            AuthFailure::ProviderError(format!("invalid token response: {e}"))
        })?;

        let expires_at = token_response.expires_in.map_or_else(
            || Utc::now() + chrono::Duration::hours(1),
            |expires_in| {
                Utc::now() + chrono::Duration::seconds(i64::try_from(expires_in).unwrap_or(3600))
            },
        );

        log::debug!(
            "Token exchange with '{provider}' succeeded (id_token: {}, access_token: {})",
            token_response.id_token.is_some(),
            token_response.access_token.is_some()
        );

        Ok(TokenExchange {
            access_token: token_response.access_token,
            id_token: token_response.id_token,
            expires_at,
        })
    }

    /// Fetch the provider's userinfo endpoint with a bearer access token
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` on any network, timeout, or protocol failure
    pub async fn fetch_userinfo(
        &self,
        provider: &str,
        access_token: &str,
    ) -> Result<serde_json::Value, AuthFailure> {
        let runtime = self.providers.get(provider).ok_or_else(|| {
            AuthFailure::ProviderError(format!("provider '{provider}' not configured"))
        })?;
        let userinfo_url = runtime.userinfo_url.as_ref().ok_or_else(|| {
            AuthFailure::ProviderError(format!("no userinfo endpoint for '{provider}'"))
        })?;

        let response = self
            .http_client
            .get(userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                log::error!("Userinfo request to '{provider}' failed: {e}");
                AuthFailure::ProviderError(format!("userinfo request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            log::error!("Userinfo endpoint of '{provider}' returned {status}");
            return Err(AuthFailure::ProviderError(format!(
                "userinfo endpoint returned {status}"
            )));
        }

        response.json().await.map_err(|e| {
            log::error!("Userinfo response from '{provider}' unparseable: {e}");
            AuthFailure::ProviderError(format!("invalid userinfo response: {e}"))
        })
    }
}

/// Fetch and parse an OIDC discovery document
///
/// # Errors
///
/// Returns an error if the request fails or the document is not valid JSON
pub async fn fetch_discovery_document(
    client: &reqwest::Client,
    discovery_url: &str,
) -> anyhow::Result<DiscoveryDocument> {
    log::debug!("Fetching discovery document from {discovery_url}");

    let response = client.get(discovery_url).send().await?;
    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "Discovery document request failed with status {}",
            response.status()
        ));
    }

    Ok(response.json().await?)
}
