//! Bearer tokens and one-time exchange codes
//!
//! The [`TokenIssuer`] trait is the seam for the token service collaborator;
//! the default implementation signs HS256 JWTs. [`ExchangeCodeStore`] backs
//! the federated hand-off: the callback redirect carries a short-lived
//! sealed code instead of the bearer token itself, so the token never
//! transits a URL.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{AuthFailure, AuthenticatedPrincipal, UserSummary};
use crate::utils::crypto::{
    create_jwt_hs256, derive_sealing_key, random_urlsafe, seal, verify_jwt_hs256,
    SEALING_KEY_SIZE,
};

/// Pluggable bearer-token service
pub trait TokenIssuer: Send + Sync {
    /// Issue a bearer token for an authenticated principal
    ///
    /// # Errors
    ///
    /// Returns an error if token construction fails
    fn issue(&self, principal: &AuthenticatedPrincipal) -> anyhow::Result<String>;

    /// Validate a bearer token and return the embedded user summary
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, mis-signed, expired, or
    /// issued for a different issuer/audience
    fn validate(&self, token: &str) -> anyhow::Result<UserSummary>;
}

/// HS256 JWT issuer
pub struct HmacTokenIssuer {
    secret: Vec<u8>,
    issuer: String,
    audience: String,
    duration_hours: i64,
}

impl HmacTokenIssuer {
    #[must_use]
    pub fn new(secret: &[u8], issuer: &str, audience: &str, duration_hours: i64) -> Self {
        Self {
            secret: secret.to_vec(),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            duration_hours,
        }
    }
}

impl TokenIssuer for HmacTokenIssuer {
    fn issue(&self, principal: &AuthenticatedPrincipal) -> anyhow::Result<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.duration_hours);

        let header = json!({"alg": "HS256", "typ": "JWT"});
        let mut payload = json!({
            "iss": self.issuer,
            "aud": self.audience,
            "sub": principal.principal_id,
            "identifier": principal.identifier,
            "iat": now.timestamp(),
            "exp": exp.timestamp(),
        });
        if let Some(ref name) = principal.name {
            payload["name"] = json!(name);
        }
        if let Some(ref email) = principal.email {
            payload["email"] = json!(email);
        }
        if let Some(ref provider) = principal.provider {
            payload["idp"] = json!(provider);
        }

        create_jwt_hs256(&header, &payload, &self.secret)
    }

    fn validate(&self, token: &str) -> anyhow::Result<UserSummary> {
        let claims = verify_jwt_hs256(token, &self.secret)?;

        let exp = claims["exp"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("token missing exp claim"))?;
        if Utc::now().timestamp() > exp {
            return Err(anyhow::anyhow!("token expired"));
        }
        if claims["iss"].as_str() != Some(self.issuer.as_str()) {
            return Err(anyhow::anyhow!("token issuer mismatch"));
        }
        if claims["aud"].as_str() != Some(self.audience.as_str()) {
            return Err(anyhow::anyhow!("token audience mismatch"));
        }

        Ok(UserSummary {
            id: claims["sub"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("token missing sub claim"))?
                .to_string(),
            identifier: claims["identifier"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("token missing identifier claim"))?
                .to_string(),
            name: claims["name"].as_str().map(ToString::to_string),
            email: claims["email"].as_str().map(ToString::to_string),
            provider: claims["idp"].as_str().map(ToString::to_string),
        })
    }
}

/// Sealed payload behind an exchange code
#[derive(Serialize, Deserialize)]
struct ExchangeGrant {
    code_id: String,
    principal: AuthenticatedPrincipal,
    created_at: DateTime<Utc>,
}

/// One-time exchange codes for the federated SPA hand-off
///
/// A code is a sealed principal with a short TTL. Redemption is single-use,
/// enforced by the same TTL-pruned replay-guard construction as the
/// authorization-request store.
pub struct ExchangeCodeStore {
    sealing_key: [u8; SEALING_KEY_SIZE],
    ttl: Duration,
    redeemed: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ExchangeCodeStore {
    #[must_use]
    pub fn new(secret: &[u8], ttl_seconds: i64) -> Self {
        Self {
            sealing_key: derive_sealing_key(secret),
            ttl: Duration::seconds(ttl_seconds),
            redeemed: Mutex::new(HashMap::new()),
        }
    }

    /// Grant a one-time code for a principal
    ///
    /// # Errors
    ///
    /// Returns an error if sealing fails
    pub fn grant(&self, principal: &AuthenticatedPrincipal) -> anyhow::Result<String> {
        let grant = ExchangeGrant {
            code_id: random_urlsafe(16),
            principal: principal.clone(),
            created_at: Utc::now(),
        };
        seal(&grant, &self.sealing_key)
    }

    /// Redeem a code, consuming it
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` on seal failure or replay, `Expired` past TTL
    pub fn redeem(&self, code: &str) -> Result<AuthenticatedPrincipal, AuthFailure> {
        let grant: ExchangeGrant =
            crate::utils::crypto::open(code, &self.sealing_key).map_err(|e| {
                log::warn!("Exchange code rejected: {e}");
                AuthFailure::InvalidState("exchange code seal verification failed".to_string())
            })?;

        if Utc::now() - grant.created_at > self.ttl {
            log::warn!("Exchange code expired for principal '{}'", grant.principal.principal_id);
            return Err(AuthFailure::Expired("exchange code ttl exceeded".to_string()));
        }

        let mut redeemed = self
            .redeemed
            .lock()
            .map_err(|_| AuthFailure::InvalidState("replay guard poisoned".to_string()))?;
        let horizon = Utc::now() - self.ttl;
        redeemed.retain(|_, seen_at| *seen_at > horizon);
        if redeemed.contains_key(&grant.code_id) {
            log::warn!("Replay of an already-redeemed exchange code detected");
            return Err(AuthFailure::InvalidState(
                "exchange code already redeemed".to_string(),
            ));
        }
        redeemed.insert(grant.code_id.clone(), Utc::now());

        log::debug!(
            "Exchange code redeemed for principal '{}'",
            grant.principal.principal_id
        );
        Ok(grant.principal)
    }
}
