use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PassgateSettings {
    pub application: ApplicationSettings,
    pub login: LoginSettings,
    pub authorization_request: AuthorizationRequestSettings,
    pub token: TokenSettings,
    pub cookies: CookieSettings,
    pub logging: LoggingSettings,
    pub provisioning: ProvisioningSettings,
    pub providers: Vec<ProviderSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used to build the OAuth2 redirect URI
    pub public_url: String,
    pub cors_origins: String,
}

/// Endpoint paths and SPA hand-off configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSettings {
    pub path: String,
    pub federated_path: String,
    pub callback_path: String,
    pub exchange_path: String,
    pub userinfo_path: String,
    /// Where federated logins land after success, carrying a one-time code
    pub spa_callback_url: String,
    /// Lifetime of the one-time exchange code handed to the SPA
    pub exchange_code_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequestSettings {
    /// Key material for sealing in-flight authorization requests.
    /// Generated at startup when empty.
    pub secret: String,
    /// TTL embedded in the sealed payload; the cookie max-age matches
    pub ttl_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    pub issuer: String,
    pub audience: String,
    pub secret: String,
    pub duration_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

/// Federated principal provisioning policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// When true, an unknown (provider, subject) pair provisions a fresh
    /// principal. When false, the identity must be linked beforehand.
    /// E-mail-based linking to existing accounts is never performed.
    pub auto_provision: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub display_name: Option<String>,
    pub discovery_url: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: Option<String>,
    /// Expected `iss` claim; resolved from discovery when absent
    pub issuer: Option<String>,
    pub scopes: Vec<String>,

    // Direct values (can be overridden by environment variables)
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    // Environment variable names for overrides
    pub client_id_env: Option<String>,
    pub client_secret_env: Option<String>,

    pub enabled: bool,
    pub extra_auth_params: Option<HashMap<String, String>>,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: "http://localhost:8080".to_string(),
            cors_origins: "http://localhost:3000,http://localhost:8080".to_string(),
        }
    }
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            path: "/auth/login".to_string(),
            federated_path: "/auth/federated/sign_in".to_string(),
            callback_path: "/auth/federated/callback".to_string(),
            exchange_path: "/auth/exchange".to_string(),
            userinfo_path: "/auth/userinfo".to_string(),
            spa_callback_url: "http://localhost:3000/auth/complete".to_string(),
            exchange_code_ttl_seconds: 60,
        }
    }
}

impl Default for AuthorizationRequestSettings {
    fn default() -> Self {
        Self {
            secret: String::new(), // Will be generated if empty
            ttl_minutes: 5,
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            issuer: "https://passgate.app".to_string(),
            audience: "https://api.example.com".to_string(),
            secret: String::new(), // Will be generated if empty
            duration_hours: 24,
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true, // Default to secure cookies
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            auto_provision: true,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: None,
            discovery_url: None,
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            jwks_uri: None,
            issuer: None,
            scopes: vec!["openid".to_string(), "email".to_string()],
            client_id: None,
            client_secret: None,
            client_id_env: None,
            client_secret_env: None,
            enabled: true,
            extra_auth_params: Some(HashMap::new()),
        }
    }
}

impl ProviderSettings {
    /// Client ID, preferring the configured environment variable
    #[must_use]
    pub fn get_client_id(&self) -> Option<String> {
        if let Some(ref env_name) = self.client_id_env {
            if let Ok(value) = std::env::var(env_name) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        self.client_id.clone()
    }

    /// Client secret, preferring the configured environment variable
    #[must_use]
    pub fn get_client_secret(&self) -> Option<String> {
        if let Some(ref env_name) = self.client_secret_env {
            if let Ok(value) = std::env::var(env_name) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        self.client_secret.clone()
    }

    /// A provider is OIDC when it can validate ID tokens (discovery or JWKS)
    #[must_use]
    pub fn is_oidc(&self) -> bool {
        self.discovery_url.is_some() || self.jwks_uri.is_some()
    }
}

impl PassgateSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be read or parsed
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Self::initialize_logging(&settings.logging);
        Ok(settings)
    }

    /// Initialize the logger from the configured level, honoring `RUST_LOG`
    fn initialize_logging(logging: &LoggingSettings) {
        let env = env_logger::Env::default().default_filter_or(&logging.level);
        let _ = env_logger::Builder::from_env(env).try_init();
    }

    /// Load base settings from TOML file(s) or use defaults
    ///
    /// Priority (highest to lowest): environment variables (applied after
    /// this function), Passgate.toml in `PASSGATE_SECRETS_DIR`, Passgate.toml
    /// in the current directory, defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file cannot be read or parsed
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Passgate.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)?;
            settings = basic_toml::from_str(&toml_content)?;
            log::info!(
                "Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("PASSGATE_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Passgate.toml");
            if secrets_path.exists() {
                let secrets_toml_content = fs::read_to_string(&secrets_path)?;
                settings = basic_toml::from_str(&secrets_toml_content)?;
                log::info!("Overriding settings from {}", secrets_path.display());
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_secret_overrides(settings);
        if let Ok(secure) = std::env::var("PASSGATE_COOKIE_SECURE") {
            settings.cookies.secure = secure != "false" && secure != "0";
        }
        if let Ok(level) = std::env::var("PASSGATE_LOG_LEVEL") {
            settings.logging.level = level;
        }
        if let Ok(auto) = std::env::var("PASSGATE_AUTO_PROVISION") {
            settings.provisioning.auto_provision = auto != "false" && auto != "0";
        }
    }

    /// Apply environment overrides for application settings
    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("PASSGATE_HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PASSGATE_PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(public_url) = std::env::var("PASSGATE_PUBLIC_URL") {
            app_settings.public_url = public_url;
        }
        if let Ok(cors_origins) = std::env::var("PASSGATE_CORS_ORIGINS") {
            app_settings.cors_origins = cors_origins;
        }
    }

    /// Apply secret overrides and generate missing secrets
    ///
    /// Both the authorization-request sealing secret and the token signing
    /// secret must exist before the server starts; a generated secret keeps
    /// a single instance working but breaks across restarts and replicas,
    /// so a warning is logged.
    fn apply_secret_overrides(settings: &mut Self) {
        if let Ok(secret) = std::env::var("PASSGATE_AUTHREQ_SECRET") {
            if !secret.is_empty() {
                settings.authorization_request.secret = secret;
            }
        }
        if let Ok(secret) = std::env::var("PASSGATE_TOKEN_SECRET") {
            if !secret.is_empty() {
                settings.token.secret = secret;
            }
        }

        if settings.authorization_request.secret.is_empty() {
            settings.authorization_request.secret = Self::generate_random_secret();
            log::warn!(
                "No authorization-request secret configured; generated one for this process. \
                 In-flight logins will not survive a restart or load-balance across replicas."
            );
        }
        if settings.token.secret.is_empty() {
            settings.token.secret = Self::generate_random_secret();
            log::warn!(
                "No token secret configured; generated one for this process. \
                 Issued tokens will not survive a restart."
            );
        }
    }

    /// Generate a 256-bit random secret, base64-encoded
    fn generate_random_secret() -> String {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        general_purpose::STANDARD.encode(secret)
    }

    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// The redirect URI registered with identity providers
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.application.public_url.trim_end_matches('/'),
            self.login.callback_path
        )
    }

    #[must_use]
    pub fn get_enabled_providers(&self) -> Vec<&ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled).collect()
    }
}
