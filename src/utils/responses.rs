//! HTTP response construction
//!
//! One place builds every response body the pipeline emits, so failures are
//! uniformly structured JSON and success bodies share one shape. Bodies for
//! the fixed failure outcomes are pre-serialized once.

use actix_web::{cookie::Cookie, http::header, HttpResponse};
use once_cell::sync::Lazy;
use serde_json::json;

use crate::models::{AuthFailure, AuthenticationResult};

/// Pre-serialized body for bearer-token rejections
static INVALID_TOKEN_BODY: Lazy<String> = Lazy::new(|| {
    error_body(
        "InvalidToken",
        "The provided token is invalid or has expired",
    )
});

/// Pre-serialized body for malformed requests
static MISSING_PARAMETERS_BODY: Lazy<String> = Lazy::new(|| {
    error_body(
        "InvalidRequest",
        "Required parameters are missing from the request",
    )
});

fn error_body(reason: &str, message: &str) -> String {
    json!({
        "reason": reason,
        "message": message,
    })
    .to_string()
}

/// Unified response builder for the authentication pipeline
pub struct ResponseBuilder;

impl ResponseBuilder {
    /// 200 with the uniform success payload
    #[must_use]
    pub fn authenticated(result: &AuthenticationResult) -> HttpResponse {
        HttpResponse::Ok().json(result)
    }

    /// 401 with the failure's externally visible reason and message
    ///
    /// Never redirects: failures are structured JSON, not HTML pages.
    #[must_use]
    pub fn auth_failure(failure: &AuthFailure) -> HttpResponse {
        HttpResponse::Unauthorized()
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(error_body(failure.public_reason(), failure.public_message()))
    }

    /// 302 redirect with cookies attached
    #[must_use]
    pub fn redirect_with_cookies(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
        let mut builder = HttpResponse::Found();
        for cookie in cookies {
            builder.cookie(cookie);
        }
        builder
            .append_header(("Location", location.to_string()))
            .finish()
    }

    /// 401 for an invalid or expired bearer token
    #[must_use]
    pub fn invalid_token() -> HttpResponse {
        HttpResponse::Unauthorized()
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(INVALID_TOKEN_BODY.clone())
    }

    /// 400 for requests missing required parameters
    #[must_use]
    pub fn missing_parameters() -> HttpResponse {
        HttpResponse::BadRequest()
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(MISSING_PARAMETERS_BODY.clone())
    }

    /// 400 for an unknown or unconfigured provider
    #[must_use]
    pub fn unknown_provider(provider: &str) -> HttpResponse {
        HttpResponse::BadRequest()
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(error_body(
                "UnknownProvider",
                &format!("Identity provider '{provider}' is not configured"),
            ))
    }

    /// 500 with a generic body; detail goes to the log only
    #[must_use]
    pub fn server_error() -> HttpResponse {
        HttpResponse::InternalServerError()
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .body(error_body(
                "ServerError",
                "An internal server error occurred",
            ))
    }
}
