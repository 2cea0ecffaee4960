// One-time code exchange handler
use actix_web::{web, Either, HttpResponse};
use serde::Deserialize;

use crate::outcome::OutcomeHandler;
use crate::token::ExchangeCodeStore;

#[derive(Deserialize)]
pub struct ExchangeRequest {
    pub code: String,
}

/// `POST {login.exchange_path}` with `{code}` as JSON or form data
///
/// Redeems the one-time code handed to the SPA by a federated callback and
/// returns the real bearer token. A code redeems exactly once.
pub async fn exchange_code(
    body: Either<web::Json<ExchangeRequest>, web::Form<ExchangeRequest>>,
    exchange: web::Data<ExchangeCodeStore>,
    outcome: web::Data<dyn OutcomeHandler>,
) -> HttpResponse {
    let request = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    };

    match exchange.redeem(&request.code) {
        Ok(principal) => outcome.on_success(&principal),
        Err(failure) => outcome.on_failure(&failure),
    }
}
