//! ID token validation
//!
//! Verifies the signature (RS256 family, keys fetched from the provider's
//! JWKS endpoint and cached), then the registered claims: issuer, audience,
//! expiry with clock skew, and the nonce bound to the authorization request.
//! No claim is trusted before all checks pass.

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::utils::crypto::constant_time_eq;

/// Clock skew tolerance for exp/iat validation
const CLOCK_SKEW_SECONDS: i64 = 300;

/// How long fetched JWKS keys stay cached
const JWKS_CACHE_DURATION: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
pub enum JwtValidationError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("key decoding failed: {0}")]
    KeyDecodingFailed(String),
    #[error("no key with id '{0}' in provider JWKS")]
    KeyNotFound(String),
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("JWKS fetch failed: {0}")]
    JwksFetch(String),
    #[error("claim '{claim}' invalid: expected {expected}, got {actual}")]
    ClaimValidationFailed {
        claim: String,
        expected: String,
        actual: String,
    },
    #[error("token expired")]
    TokenExpired,
}

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
    kid: Option<String>,
}

/// Claims this crate reads from an ID token
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub aud: Option<serde_json::Value>,
    pub exp: Option<i64>,
    pub nonce: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

impl IdTokenClaims {
    /// Display name, falling back to given/family name assembly
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        if let Some(ref name) = self.name {
            return Some(name.clone());
        }
        let assembled = format!(
            "{} {}",
            self.given_name.as_deref().unwrap_or(""),
            self.family_name.as_deref().unwrap_or("")
        );
        let assembled = assembled.trim();
        if assembled.is_empty() {
            None
        } else {
            Some(assembled.to_string())
        }
    }

    /// Audience values, whether the claim is a string or an array
    #[must_use]
    pub fn audiences(&self) -> Vec<String> {
        match &self.aud {
            Some(serde_json::Value::String(aud)) => vec![aud.clone()],
            Some(serde_json::Value::Array(auds)) => auds
                .iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect(),
            _ => vec![],
        }
    }
}

/// Expected claim values for one validation
pub struct ExpectedClaims<'a> {
    pub issuer: Option<&'a str>,
    pub audience: &'a str,
    pub nonce: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct JsonWebKeySet {
    keys: Vec<JsonWebKey>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// Per-provider JWKS cache
struct JwksCache {
    keys: HashMap<String, (Vec<JsonWebKey>, Instant)>,
}

impl JwksCache {
    fn get(&self, provider: &str, kid: &str) -> Option<JsonWebKey> {
        let (keys, fetched_at) = self.keys.get(provider)?;
        if fetched_at.elapsed() > JWKS_CACHE_DURATION {
            return None;
        }
        keys.iter()
            .find(|k| k.kid.as_deref() == Some(kid))
            .cloned()
    }

    fn store(&mut self, provider: &str, keys: Vec<JsonWebKey>) {
        self.keys.insert(provider.to_string(), (keys, Instant::now()));
    }
}

/// Validates ID tokens against provider JWKS
pub struct JwtValidator {
    http_client: reqwest::Client,
    cache: Mutex<JwksCache>,
}

impl Default for JwtValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl JwtValidator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
            cache: Mutex::new(JwksCache {
                keys: HashMap::new(),
            }),
        }
    }

    /// Validate an ID token end to end and return its claims
    ///
    /// # Errors
    ///
    /// Returns an error if the structure, signature, or any expected claim
    /// fails to validate
    pub async fn validate_id_token(
        &self,
        token: &str,
        provider: &str,
        jwks_uri: &str,
        expected: &ExpectedClaims<'_>,
    ) -> Result<IdTokenClaims, JwtValidationError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(JwtValidationError::InvalidToken(
                "Invalid JWT format".to_string(),
            ));
        }

        let header = decode_jwt_header(parts[0])?;
        if header.alg != "RS256" {
            return Err(JwtValidationError::UnsupportedAlgorithm(header.alg));
        }

        let kid = header.kid.as_deref().unwrap_or("default");
        let public_key = self.get_public_key(provider, kid, jwks_uri).await?;

        let signing_input = format!("{}.{}", parts[0], parts[1]);
        let signature = general_purpose::URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|e| {
                JwtValidationError::InvalidToken(format!("Invalid signature encoding: {e}"))
            })?;
        verify_rsa_signature(&signing_input, &signature, &public_key)?;
        log::debug!("ID token signature verified for provider '{provider}'");

        let claims = decode_jwt_claims(parts[1])?;
        validate_claims(&claims, expected)?;
        log::debug!("ID token claims validated for provider '{provider}'");

        Ok(claims)
    }

    /// Get a verification key, from cache or by fetching the JWKS
    async fn get_public_key(
        &self,
        provider: &str,
        kid: &str,
        jwks_uri: &str,
    ) -> Result<JsonWebKey, JwtValidationError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(key) = cache.get(provider, kid) {
                return Ok(key);
            }
        }

        let keys = self.fetch_jwks(jwks_uri).await?;
        let key = keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid))
            .cloned()
            .ok_or_else(|| JwtValidationError::KeyNotFound(kid.to_string()))?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.store(provider, keys);
        }
        Ok(key)
    }

    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<Vec<JsonWebKey>, JwtValidationError> {
        log::debug!("Fetching JWKS from {jwks_uri}");

        let response = self
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| JwtValidationError::JwksFetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(JwtValidationError::JwksFetch(format!(
                "JWKS request returned {}",
                response.status()
            )));
        }

        let key_set: JsonWebKeySet = response
            .json()
            .await
            .map_err(|e| JwtValidationError::JwksFetch(format!("invalid JWKS JSON: {e}")))?;
        Ok(key_set.keys)
    }
}

fn decode_jwt_header(header_b64: &str) -> Result<JwtHeader, JwtValidationError> {
    let header_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| JwtValidationError::InvalidToken(format!("Invalid header encoding: {e}")))?;
    serde_json::from_slice(&header_bytes)
        .map_err(|e| JwtValidationError::InvalidToken(format!("Invalid header JSON: {e}")))
}

fn decode_jwt_claims(claims_b64: &str) -> Result<IdTokenClaims, JwtValidationError> {
    let claims_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|e| JwtValidationError::InvalidToken(format!("Invalid claims encoding: {e}")))?;
    serde_json::from_slice(&claims_bytes)
        .map_err(|e| JwtValidationError::InvalidToken(format!("Invalid claims JSON: {e}")))
}

/// Verify an RS256 (RSA PKCS#1 v1.5, SHA-256) signature over the signing input
fn verify_rsa_signature(
    signing_input: &str,
    signature: &[u8],
    public_key: &JsonWebKey,
) -> Result<(), JwtValidationError> {
    use rsa::pkcs1v15::{Signature, VerifyingKey};
    use rsa::signature::Verifier;
    use rsa::RsaPublicKey;
    use sha2::Sha256;

    let n = public_key.n.as_ref().ok_or_else(|| {
        JwtValidationError::KeyDecodingFailed("Missing RSA modulus (n)".to_string())
    })?;
    let e = public_key.e.as_ref().ok_or_else(|| {
        JwtValidationError::KeyDecodingFailed("Missing RSA exponent (e)".to_string())
    })?;

    let n_bytes = general_purpose::URL_SAFE_NO_PAD.decode(n).map_err(|e| {
        JwtValidationError::KeyDecodingFailed(format!("Invalid modulus encoding: {e}"))
    })?;
    let e_bytes = general_purpose::URL_SAFE_NO_PAD.decode(e).map_err(|e| {
        JwtValidationError::KeyDecodingFailed(format!("Invalid exponent encoding: {e}"))
    })?;

    let rsa_key = RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n_bytes),
        rsa::BigUint::from_bytes_be(&e_bytes),
    )
    .map_err(|e| JwtValidationError::KeyDecodingFailed(format!("Invalid RSA key: {e}")))?;

    let verifying_key = VerifyingKey::<Sha256>::new(rsa_key);
    let signature = Signature::try_from(signature)
        .map_err(|e| JwtValidationError::InvalidToken(format!("Invalid signature format: {e}")))?;
    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| JwtValidationError::SignatureInvalid)
}

/// Validate registered claims against expectations
///
/// # Errors
///
/// Returns an error when any expected claim is absent or mismatched
pub fn validate_claims(
    claims: &IdTokenClaims,
    expected: &ExpectedClaims<'_>,
) -> Result<(), JwtValidationError> {
    let now = Utc::now().timestamp();
    match claims.exp {
        Some(exp) if now <= exp + CLOCK_SKEW_SECONDS => {}
        Some(_) => return Err(JwtValidationError::TokenExpired),
        None => {
            return Err(JwtValidationError::ClaimValidationFailed {
                claim: "exp".to_string(),
                expected: "present".to_string(),
                actual: "missing".to_string(),
            })
        }
    }

    if let Some(expected_issuer) = expected.issuer {
        let actual = claims.iss.as_deref().unwrap_or("");
        if actual != expected_issuer {
            return Err(JwtValidationError::ClaimValidationFailed {
                claim: "iss".to_string(),
                expected: expected_issuer.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    let audiences = claims.audiences();
    if !audiences.iter().any(|aud| aud == expected.audience) {
        return Err(JwtValidationError::ClaimValidationFailed {
            claim: "aud".to_string(),
            expected: expected.audience.to_string(),
            actual: format!("{audiences:?}"),
        });
    }

    if let Some(expected_nonce) = expected.nonce {
        let actual = claims.nonce.as_deref().unwrap_or("");
        if !constant_time_eq(actual, expected_nonce) {
            return Err(JwtValidationError::ClaimValidationFailed {
                claim: "nonce".to_string(),
                expected: "authorization request nonce".to_string(),
                actual: "mismatch".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> IdTokenClaims {
        serde_json::from_value(value).unwrap()
    }

    fn expected<'a>() -> ExpectedClaims<'a> {
        ExpectedClaims {
            issuer: Some("https://idp.example.com"),
            audience: "client-123",
            nonce: Some("nonce-token"),
        }
    }

    fn future_exp() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_validate_claims_accepts_valid_token() {
        let claims = claims(json!({
            "iss": "https://idp.example.com",
            "sub": "subject-1",
            "aud": "client-123",
            "exp": future_exp(),
            "nonce": "nonce-token",
        }));
        assert!(validate_claims(&claims, &expected()).is_ok());
    }

    #[test]
    fn test_validate_claims_accepts_audience_array() {
        let claims = claims(json!({
            "iss": "https://idp.example.com",
            "aud": ["other-client", "client-123"],
            "exp": future_exp(),
            "nonce": "nonce-token",
        }));
        assert!(validate_claims(&claims, &expected()).is_ok());
    }

    #[test]
    fn test_validate_claims_rejects_wrong_issuer() {
        let claims = claims(json!({
            "iss": "https://evil.example.com",
            "aud": "client-123",
            "exp": future_exp(),
            "nonce": "nonce-token",
        }));
        assert!(matches!(
            validate_claims(&claims, &expected()),
            Err(JwtValidationError::ClaimValidationFailed { claim, .. }) if claim == "iss"
        ));
    }

    #[test]
    fn test_validate_claims_rejects_wrong_audience() {
        let claims = claims(json!({
            "iss": "https://idp.example.com",
            "aud": "someone-else",
            "exp": future_exp(),
            "nonce": "nonce-token",
        }));
        assert!(matches!(
            validate_claims(&claims, &expected()),
            Err(JwtValidationError::ClaimValidationFailed { claim, .. }) if claim == "aud"
        ));
    }

    #[test]
    fn test_validate_claims_rejects_expired_token() {
        let claims = claims(json!({
            "iss": "https://idp.example.com",
            "aud": "client-123",
            "exp": Utc::now().timestamp() - 3600,
            "nonce": "nonce-token",
        }));
        assert!(matches!(
            validate_claims(&claims, &expected()),
            Err(JwtValidationError::TokenExpired)
        ));
    }

    #[test]
    fn test_validate_claims_allows_clock_skew() {
        let claims = claims(json!({
            "iss": "https://idp.example.com",
            "aud": "client-123",
            "exp": Utc::now().timestamp() - 60,
            "nonce": "nonce-token",
        }));
        assert!(validate_claims(&claims, &expected()).is_ok());
    }

    #[test]
    fn test_validate_claims_rejects_nonce_mismatch() {
        let claims = claims(json!({
            "iss": "https://idp.example.com",
            "aud": "client-123",
            "exp": future_exp(),
            "nonce": "replayed-nonce",
        }));
        assert!(matches!(
            validate_claims(&claims, &expected()),
            Err(JwtValidationError::ClaimValidationFailed { claim, .. }) if claim == "nonce"
        ));
    }

    #[test]
    fn test_validate_claims_rejects_missing_exp() {
        let claims = claims(json!({
            "iss": "https://idp.example.com",
            "aud": "client-123",
            "nonce": "nonce-token",
        }));
        assert!(validate_claims(&claims, &expected()).is_err());
    }

    #[test]
    fn test_display_name_assembly() {
        let with_name = claims(json!({"name": "Jane Doe"}));
        assert_eq!(with_name.display_name().as_deref(), Some("Jane Doe"));

        let with_parts = claims(json!({"given_name": "Jane", "family_name": "Doe"}));
        assert_eq!(with_parts.display_name().as_deref(), Some("Jane Doe"));

        let without = claims(json!({"sub": "x"}));
        assert!(without.display_name().is_none());
    }

    #[actix_web::test]
    async fn test_malformed_token_structure_rejected() {
        let validator = JwtValidator::new();
        let expected = ExpectedClaims {
            issuer: None,
            audience: "client-123",
            nonce: None,
        };
        let result = validator
            .validate_id_token("not-a-jwt", "acme", "https://idp/jwks", &expected)
            .await;
        assert!(matches!(result, Err(JwtValidationError::InvalidToken(_))));
    }

    #[actix_web::test]
    async fn test_unsupported_algorithm_rejected_before_key_fetch() {
        let validator = JwtValidator::new();
        let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"sub":"x"}"#);
        let token = format!("{header}.{payload}.sig");
        let expected = ExpectedClaims {
            issuer: None,
            audience: "client-123",
            nonce: None,
        };
        // jwks_uri is unreachable; the algorithm check must fire first
        let result = validator
            .validate_id_token(&token, "acme", "http://127.0.0.1:1/jwks", &expected)
            .await;
        assert!(matches!(
            result,
            Err(JwtValidationError::UnsupportedAlgorithm(_))
        ));
    }
}
