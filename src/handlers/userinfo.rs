// Bearer-token userinfo handler
use actix_web::{web, HttpRequest, HttpResponse};

use crate::token::TokenIssuer;
use crate::utils::responses::ResponseBuilder;

/// `GET {login.userinfo_path}` with `Authorization: Bearer <token>`
///
/// Validates the bearer token and returns the embedded user summary. This
/// is how downstream requests prove authentication without server-side
/// session lookup.
pub async fn userinfo(req: HttpRequest, issuer: web::Data<dyn TokenIssuer>) -> HttpResponse {
    let Some(token) = extract_bearer_token(&req) else {
        return ResponseBuilder::invalid_token();
    };

    match issuer.validate(token) {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => {
            log::debug!("Bearer token rejected: {e}");
            ResponseBuilder::invalid_token()
        }
    }
}

fn extract_bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
