// Federated sign-in and callback handlers
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::collections::HashMap;

use crate::authreq::{AuthorizationRequestStore, AUTHREQ_COOKIE};
use crate::models::AuthFailure;
use crate::oauth::{FederatedIdentityResolver, OAuthCallback, OAuthConfig};
use crate::outcome::OutcomeHandler;
use crate::settings::PassgateSettings;
use crate::utils::responses::ResponseBuilder;

#[derive(Deserialize)]
pub struct SignInQuery {
    pub provider: Option<String>,
}

/// `GET {login.federated_path}?provider=`
///
/// Starts a federated login: generates state and nonce, seals them into the
/// authorization-request cookie, and redirects to the provider's
/// authorization endpoint.
pub async fn federated_sign_in(
    query: web::Query<SignInQuery>,
    oauth_config: web::Data<OAuthConfig>,
    store: web::Data<AuthorizationRequestStore>,
    settings: web::Data<PassgateSettings>,
) -> HttpResponse {
    let Some(ref provider) = query.provider else {
        return ResponseBuilder::missing_parameters();
    };
    if !oauth_config.is_configured(provider) {
        log::warn!("Federated sign-in requested for unknown provider '{provider}'");
        return ResponseBuilder::unknown_provider(provider);
    }

    let request = store.begin(
        provider,
        &settings.login.spa_callback_url,
        HashMap::new(),
    );

    let auth_url = match oauth_config.authorization_url(provider, &request.state, &request.nonce) {
        Ok(url) => url,
        Err(e) => {
            log::error!("Failed to build authorization URL for '{provider}': {e}");
            return ResponseBuilder::server_error();
        }
    };

    let cookie = match store.save(&request) {
        Ok(cookie) => cookie,
        Err(e) => {
            log::error!("Failed to seal authorization request for '{provider}': {e}");
            return ResponseBuilder::server_error();
        }
    };

    log::info!("Redirecting to '{provider}' authorization endpoint");
    ResponseBuilder::redirect_with_cookies(&auth_url, vec![cookie])
}

/// `GET {login.callback_path}?code=&state=&[error=]`
///
/// Validates the callback against the stored authorization request, then
/// hands the resolver's verdict to the outcome handler. The
/// authorization-request cookie is cleared on every path; the sealed record
/// is consumed before any provider call is made.
pub async fn federated_callback(
    query: web::Query<OAuthCallback>,
    req: HttpRequest,
    store: web::Data<AuthorizationRequestStore>,
    resolver: web::Data<FederatedIdentityResolver>,
    outcome: web::Data<dyn OutcomeHandler>,
) -> HttpResponse {
    let callback = query.into_inner();

    let request = match load_authorization_request(&callback, &req, &store) {
        Ok(request) => request,
        Err(failure) => {
            let mut response = outcome.on_failure(&failure);
            attach_clear_cookie(&mut response, &store);
            return response;
        }
    };

    match resolver.resolve(&callback, &request).await {
        Ok(principal) => outcome.on_federated_success(&principal, store.clear_cookie()),
        Err(failure) => {
            let mut response = outcome.on_failure(&failure);
            attach_clear_cookie(&mut response, &store);
            response
        }
    }
}

/// Match the callback's state against the sealed authorization request
fn load_authorization_request(
    callback: &OAuthCallback,
    req: &HttpRequest,
    store: &AuthorizationRequestStore,
) -> Result<crate::authreq::AuthorizationRequest, AuthFailure> {
    let received_state = callback.state.as_deref().ok_or_else(|| {
        log::warn!("Callback received without a state parameter");
        AuthFailure::InvalidState("no state parameter received".to_string())
    })?;

    let cookie = req.cookie(AUTHREQ_COOKIE).ok_or_else(|| {
        log::warn!("Callback received without an authorization-request cookie");
        AuthFailure::InvalidState("no in-flight authorization request".to_string())
    })?;

    store.load(cookie.value(), received_state)
}

fn attach_clear_cookie(response: &mut HttpResponse, store: &AuthorizationRequestStore) {
    if let Err(e) = response.add_cookie(&store.clear_cookie()) {
        log::error!("Failed to attach clearing cookie: {e}");
    }
}
