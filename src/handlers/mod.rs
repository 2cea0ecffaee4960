//! Request handlers for the authentication pipeline

pub mod exchange;
pub mod federated;
pub mod login;
pub mod userinfo;

pub use exchange::exchange_code;
pub use federated::{federated_callback, federated_sign_in};
pub use login::password_login;
pub use userinfo::userinfo;

use actix_web::HttpResponse;
use serde_json::json;

/// Health check handler
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}
