// Password login handler
use actix_web::{web, HttpResponse};

use crate::models::Credential;
use crate::outcome::OutcomeHandler;
use crate::password::CredentialVerifier;

/// `POST {login.path}` with form-encoded `identifier` and `secret`
///
/// Dispatches the verifier's result to the outcome handler: 200 with
/// `{token, user}` or 401 with `{reason, message}`. No redirects on either
/// path.
pub async fn password_login(
    form: web::Form<Credential>,
    verifier: web::Data<CredentialVerifier>,
    outcome: web::Data<dyn OutcomeHandler>,
) -> HttpResponse {
    let credential = form.into_inner();

    match verifier
        .verify(&credential.identifier, &credential.secret)
        .await
    {
        Ok(principal) => outcome.on_success(&principal),
        Err(failure) => outcome.on_failure(&failure),
    }
}
