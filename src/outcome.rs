//! Authentication outcome handlers
//!
//! Every authentication path, password or federated, terminates in one of
//! these callbacks. The trait is the seam applications override to change
//! what a completed login looks like; the default issues a bearer token.
//!
//! Success responses never put the token in a 3xx Location, with one
//! exception: federated flows redirect to the SPA callback carrying a
//! one-time exchange code, which the client trades for the real token.

use actix_web::{cookie::Cookie, HttpResponse};
use std::sync::Arc;

use crate::models::{AuthFailure, AuthenticatedPrincipal, AuthenticationResult};
use crate::token::{ExchangeCodeStore, TokenIssuer};
use crate::utils::responses::ResponseBuilder;

/// Dispatch target for completed authentication attempts
pub trait OutcomeHandler: Send + Sync {
    /// A password or code-exchange login succeeded: 200 + `{token, user}`
    fn on_success(&self, principal: &AuthenticatedPrincipal) -> HttpResponse;

    /// A federated login succeeded: 302 to the SPA callback with a one-time
    /// code. `clear_cookie` removes the consumed authorization-request
    /// cookie and must be attached to the response.
    fn on_federated_success(
        &self,
        principal: &AuthenticatedPrincipal,
        clear_cookie: Cookie<'static>,
    ) -> HttpResponse;

    /// Any authentication attempt failed: 401 + `{reason, message}`
    fn on_failure(&self, failure: &AuthFailure) -> HttpResponse;
}

/// Default outcome handler: bearer token issuance
pub struct TokenOutcomeHandler {
    issuer: Arc<dyn TokenIssuer>,
    exchange: Arc<ExchangeCodeStore>,
    spa_callback_url: String,
}

impl TokenOutcomeHandler {
    #[must_use]
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        exchange: Arc<ExchangeCodeStore>,
        spa_callback_url: &str,
    ) -> Self {
        Self {
            issuer,
            exchange,
            spa_callback_url: spa_callback_url.to_string(),
        }
    }
}

impl OutcomeHandler for TokenOutcomeHandler {
    fn on_success(&self, principal: &AuthenticatedPrincipal) -> HttpResponse {
        match self.issuer.issue(principal) {
            Ok(token) => {
                let result = AuthenticationResult {
                    token,
                    user: principal.to_summary(),
                };
                ResponseBuilder::authenticated(&result)
            }
            Err(e) => {
                log::error!(
                    "Token issuance failed for principal '{}': {e}",
                    principal.principal_id
                );
                ResponseBuilder::server_error()
            }
        }
    }

    fn on_federated_success(
        &self,
        principal: &AuthenticatedPrincipal,
        clear_cookie: Cookie<'static>,
    ) -> HttpResponse {
        match self.exchange.grant(principal) {
            Ok(code) => {
                let location = format!(
                    "{}?code={}",
                    self.spa_callback_url,
                    urlencoding::encode(&code)
                );
                log::info!(
                    "Federated login complete for principal '{}', handing off to SPA",
                    principal.principal_id
                );
                ResponseBuilder::redirect_with_cookies(&location, vec![clear_cookie])
            }
            Err(e) => {
                log::error!(
                    "Exchange code grant failed for principal '{}': {e}",
                    principal.principal_id
                );
                ResponseBuilder::server_error()
            }
        }
    }

    fn on_failure(&self, failure: &AuthFailure) -> HttpResponse {
        log::warn!(
            "Authentication failed: {} ({failure})",
            failure.reason()
        );
        ResponseBuilder::auth_failure(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::HmacTokenIssuer;

    fn handler() -> TokenOutcomeHandler {
        TokenOutcomeHandler::new(
            Arc::new(HmacTokenIssuer::new(
                b"outcome-test-secret",
                "https://passgate.test",
                "https://api.test",
                1,
            )),
            Arc::new(ExchangeCodeStore::new(b"outcome-test-secret", 60)),
            "http://localhost:3000/auth/complete",
        )
    }

    fn principal() -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            principal_id: "p-1".to_string(),
            identifier: "alice".to_string(),
            name: None,
            email: None,
            provider: Some("google".to_string()),
        }
    }

    #[actix_web::test]
    async fn test_on_success_returns_token_and_user() {
        let response = handler().on_success(&principal());
        assert_eq!(response.status(), actix_web::http::StatusCode::OK);

        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(!parsed["token"].as_str().unwrap().is_empty());
        assert_eq!(parsed["user"]["identifier"], "alice");
    }

    #[test]
    fn test_on_federated_success_redirects_with_code() {
        let clear = Cookie::build("passgate_authreq", "").finish();
        let response = handler().on_federated_success(&principal(), clear);
        assert_eq!(response.status(), actix_web::http::StatusCode::FOUND);

        let location = response
            .headers()
            .get("Location")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(location.starts_with("http://localhost:3000/auth/complete?code="));
        // A JWT has dot separators; the sealed one-time code never does
        assert!(!location.contains('.'));
    }

    #[actix_web::test]
    async fn test_on_failure_is_structured_401() {
        let failure = AuthFailure::BadCredentials("secret mismatch for 'alice'".to_string());
        let response = handler().on_failure(&failure);
        assert_eq!(response.status(), actix_web::http::StatusCode::UNAUTHORIZED);

        let body = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["reason"], "BadCredentials");
        // Internal detail stays internal
        assert!(!parsed["message"].as_str().unwrap().contains("alice"));
    }
}
