//! Authorization-request store
//!
//! Persists in-flight OAuth2 authorization requests across the redirect
//! round-trip to the identity provider without server-side session storage:
//! the record is sealed (AES-256-GCM) into a short-lived cookie. On the
//! callback the seal, the embedded TTL, and the `state` parameter are all
//! checked before the record is released, and a consumed record can never be
//! released twice.

use actix_web::cookie::Cookie;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::AuthFailure;
use crate::utils::crypto::{
    constant_time_eq, derive_sealing_key, generate_flow_nonce, generate_state_token, seal,
    SEALING_KEY_SIZE,
};

/// Cookie carrying the sealed in-flight authorization request
pub const AUTHREQ_COOKIE: &str = "passgate_authreq";

/// An in-flight OAuth2 authorization request
///
/// Owned solely by the store; sealed into the cookie on `save` and released
/// at most once by `load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub state: String,
    pub nonce: String,
    pub provider: String,
    pub redirect_uri: String,
    pub extra_params: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Sealed-cookie store for authorization requests
///
/// The sealing key is process-wide and read-only after construction. The
/// replay guard is the only shared mutable state: a TTL-pruned map of
/// consumed state tokens that enforces single-use consumption.
pub struct AuthorizationRequestStore {
    sealing_key: [u8; SEALING_KEY_SIZE],
    ttl: Duration,
    cookie_secure: bool,
    consumed: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AuthorizationRequestStore {
    #[must_use]
    pub fn new(secret: &[u8], ttl_minutes: i64, cookie_secure: bool) -> Self {
        Self {
            sealing_key: derive_sealing_key(secret),
            ttl: Duration::minutes(ttl_minutes),
            cookie_secure,
            consumed: Mutex::new(HashMap::new()),
        }
    }

    /// Start a new authorization request with fresh state and nonce tokens
    #[must_use]
    pub fn begin(
        &self,
        provider: &str,
        redirect_uri: &str,
        extra_params: HashMap<String, String>,
    ) -> AuthorizationRequest {
        AuthorizationRequest {
            state: generate_state_token(),
            nonce: generate_flow_nonce(),
            provider: provider.to_string(),
            redirect_uri: redirect_uri.to_string(),
            extra_params,
            created_at: Utc::now(),
        }
    }

    /// Seal an authorization request into its cookie
    ///
    /// # Errors
    ///
    /// Returns an error if sealing fails
    pub fn save(&self, request: &AuthorizationRequest) -> anyhow::Result<Cookie<'static>> {
        let sealed = seal(request, &self.sealing_key)?;

        log::debug!(
            "Sealed authorization request for provider '{}' ({} chars)",
            request.provider,
            sealed.len()
        );

        Ok(Cookie::build(AUTHREQ_COOKIE, sealed)
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(actix_web::cookie::SameSite::Lax)
            .path("/")
            .max_age(actix_web::cookie::time::Duration::minutes(
                self.ttl.num_minutes(),
            ))
            .finish())
    }

    /// Release the authorization request matching the callback
    ///
    /// Consumes the record: a second `load` with the same cookie fails.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` on seal failure, state mismatch, or replay;
    /// `Expired` when the embedded TTL has passed
    pub fn load(
        &self,
        cookie_value: &str,
        received_state: &str,
    ) -> Result<AuthorizationRequest, AuthFailure> {
        let request: AuthorizationRequest = crate::utils::crypto::open(
            cookie_value,
            &self.sealing_key,
        )
        .map_err(|e| {
            log::warn!("Authorization request cookie rejected: {e}");
            AuthFailure::InvalidState("cookie seal verification failed".to_string())
        })?;

        if Utc::now() - request.created_at > self.ttl {
            log::warn!(
                "Authorization request for provider '{}' expired (created {})",
                request.provider,
                request.created_at
            );
            return Err(AuthFailure::Expired(
                "authorization request ttl exceeded".to_string(),
            ));
        }

        // The core CSRF defense for the federated flow
        if !constant_time_eq(&request.state, received_state) {
            log::warn!(
                "State mismatch on callback for provider '{}'",
                request.provider
            );
            return Err(AuthFailure::InvalidState(
                "callback state does not match stored request".to_string(),
            ));
        }

        self.consume(&request.state)?;

        log::debug!(
            "Authorization request for provider '{}' released",
            request.provider
        );
        Ok(request)
    }

    /// Record a state token as consumed, rejecting replays
    fn consume(&self, state: &str) -> Result<(), AuthFailure> {
        let mut consumed = self
            .consumed
            .lock()
            .map_err(|_| AuthFailure::InvalidState("replay guard poisoned".to_string()))?;

        // Entries past the TTL can no longer pass the expiry check above
        let horizon = Utc::now() - self.ttl;
        consumed.retain(|_, seen_at| *seen_at > horizon);

        if consumed.contains_key(state) {
            log::warn!("Replay of an already-consumed authorization request detected");
            return Err(AuthFailure::InvalidState(
                "authorization request already consumed".to_string(),
            ));
        }
        consumed.insert(state.to_string(), Utc::now());
        Ok(())
    }

    /// An expired cookie that clears the authorization request client-side
    #[must_use]
    pub fn clear_cookie(&self) -> Cookie<'static> {
        Cookie::build(AUTHREQ_COOKIE, "")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(actix_web::cookie::SameSite::Lax)
            .path("/")
            .max_age(actix_web::cookie::time::Duration::seconds(-1))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose, Engine as _};

    fn store() -> AuthorizationRequestStore {
        AuthorizationRequestStore::new(b"unit-test-authreq-secret", 5, false)
    }

    fn saved_request(store: &AuthorizationRequestStore) -> (AuthorizationRequest, String) {
        let request = store.begin("google", "http://localhost:3000/auth/complete", HashMap::new());
        let cookie = store.save(&request).unwrap();
        (request, cookie.value().to_string())
    }

    #[test]
    fn test_save_load_roundtrip_is_single_use() {
        let store = store();
        let (request, cookie_value) = saved_request(&store);

        let loaded = store.load(&cookie_value, &request.state).unwrap();
        assert_eq!(loaded.state, request.state);
        assert_eq!(loaded.nonce, request.nonce);
        assert_eq!(loaded.provider, "google");
        assert_eq!(loaded.redirect_uri, "http://localhost:3000/auth/complete");

        // Second load with the same cookie must fail
        let replay = store.load(&cookie_value, &request.state).unwrap_err();
        assert_eq!(replay.reason(), "InvalidState");
    }

    #[test]
    fn test_load_rejects_state_mismatch_without_consuming() {
        let store = store();
        let (request, cookie_value) = saved_request(&store);

        let failure = store.load(&cookie_value, "forged-state-token").unwrap_err();
        assert_eq!(failure.reason(), "InvalidState");

        // A mismatch must not burn the stored request
        assert!(store.load(&cookie_value, &request.state).is_ok());
    }

    #[test]
    fn test_load_rejects_tampered_cookie() {
        let store = store();
        let (request, cookie_value) = saved_request(&store);

        let mut bytes = general_purpose::URL_SAFE_NO_PAD.decode(&cookie_value).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x01;
        let tampered = general_purpose::URL_SAFE_NO_PAD.encode(&bytes);

        let failure = store.load(&tampered, &request.state).unwrap_err();
        assert_eq!(failure.reason(), "InvalidState");
    }

    #[test]
    fn test_load_rejects_expired_request() {
        let store = AuthorizationRequestStore::new(b"unit-test-authreq-secret", 0, false);
        let mut request = store.begin("google", "http://localhost", HashMap::new());
        request.created_at = Utc::now() - Duration::minutes(1);
        let cookie = store.save(&request).unwrap();

        let failure = store.load(cookie.value(), &request.state).unwrap_err();
        assert_eq!(failure.reason(), "Expired");
        assert_eq!(failure.public_reason(), "InvalidState");
    }

    #[test]
    fn test_load_rejects_cookie_from_other_store() {
        let store_a = store();
        let store_b = AuthorizationRequestStore::new(b"a-different-secret", 5, false);
        let (request, cookie_value) = saved_request(&store_a);

        let failure = store_b.load(&cookie_value, &request.state).unwrap_err();
        assert_eq!(failure.reason(), "InvalidState");
    }

    #[test]
    fn test_cookie_attributes() {
        let store = AuthorizationRequestStore::new(b"secret", 5, true);
        let request = store.begin("google", "http://localhost", HashMap::new());
        let cookie = store.save(&request).unwrap();

        assert_eq!(cookie.name(), AUTHREQ_COOKIE);
        assert!(cookie.http_only().unwrap());
        assert!(cookie.secure().unwrap());
        assert_eq!(cookie.path().unwrap(), "/");
        assert_eq!(cookie.max_age().unwrap().whole_minutes(), 5);

        let cleared = store.clear_cookie();
        assert_eq!(cleared.value(), "");
        assert!(cleared.max_age().unwrap().whole_seconds() < 0);
    }

    #[test]
    fn test_begin_generates_unique_tokens() {
        let store = store();
        let a = store.begin("google", "http://localhost", HashMap::new());
        let b = store.begin("google", "http://localhost", HashMap::new());
        assert_ne!(a.state, b.state);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.state, a.nonce);
    }
}
