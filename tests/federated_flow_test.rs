// Full federated login flow against a local mock identity provider:
// sign-in redirect, callback with code exchange and userinfo fetch,
// auto-provisioning, SPA hand-off, and single-use enforcement
use actix_web::{test, web, App, HttpResponse, HttpServer};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use passgate::testing::{build_test_services, create_test_settings, test_provider};
use passgate::users::{InMemoryUserStore, UserStore};
use passgate::Pipeline;

/// Start a mock provider with working /token and /userinfo endpoints,
/// returning its base URL
async fn start_mock_provider() -> String {
    async fn token_endpoint(form: web::Form<HashMap<String, String>>) -> HttpResponse {
        // The exchange must present the code and the registered grant type
        if form.get("grant_type").map(String::as_str) != Some("authorization_code")
            || form.get("code").is_none()
            || form.get("client_id").is_none()
            || form.get("client_secret").is_none()
        {
            return HttpResponse::BadRequest().json(json!({"error": "invalid_request"}));
        }
        HttpResponse::Ok().json(json!({
            "access_token": "mock-access-token",
            "token_type": "Bearer",
            "expires_in": 3600,
        }))
    }

    async fn userinfo_endpoint(req: actix_web::HttpRequest) -> HttpResponse {
        let authorized = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer mock-access-token");
        if !authorized {
            return HttpResponse::Unauthorized().finish();
        }
        HttpResponse::Ok().json(json!({
            "sub": "subject-42",
            "email": "fed-user@example.com",
            "name": "Fed User",
        }))
    }

    let server = HttpServer::new(|| {
        App::new()
            .route("/token", web::post().to(token_endpoint))
            .route("/userinfo", web::get().to(userinfo_endpoint))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("binding mock provider");

    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{addr}")
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

async fn body_json(response: actix_web::dev::ServiceResponse) -> Value {
    let body = test::read_body(response).await;
    serde_json::from_slice(&body).expect("response body should be JSON")
}

#[actix_web::test]
async fn test_federated_flow_provisions_new_principal() {
    let provider_url = start_mock_provider().await;

    let mut settings = create_test_settings();
    settings.providers = vec![test_provider("acme", &provider_url)];
    settings.provisioning.auto_provision = true;

    let users = Arc::new(InMemoryUserStore::new());
    let services = build_test_services(&settings, users.clone()).await;
    let pipeline = Pipeline::from_settings(&settings);
    let app = test::init_service(App::new().configure(|cfg| {
        services.register(cfg);
        pipeline.configure(cfg);
    }))
    .await;

    // Step 1: sign-in redirects to the provider and sets the sealed cookie
    let request = test::TestRequest::get()
        .uri("/auth/federated/sign_in?provider=acme")
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), 302);

    let authreq_cookie = response
        .response()
        .cookies()
        .find(|c| c.name() == "passgate_authreq")
        .expect("authorization request cookie")
        .into_owned();
    let location = response
        .headers()
        .get("Location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let state = query_param(&location, "state").expect("state in authorization URL");

    // Step 2: the provider calls back; exchange + userinfo + provisioning run
    let request = test::TestRequest::get()
        .uri(&format!(
            "/auth/federated/callback?code=mock-auth-code&state={state}"
        ))
        .cookie(authreq_cookie.clone())
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), 302);

    let location = response
        .headers()
        .get("Location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(location.starts_with("http://localhost:3000/auth/complete?code="));
    let exchange_code = query_param(&location, "code").expect("one-time code in SPA redirect");
    // The redirect must carry the one-time code, never a JWT
    assert!(!exchange_code.contains('.'));

    // A fresh principal exists for the provider subject
    let provisioned = users
        .find_by_subject("acme", "subject-42")
        .await
        .expect("principal provisioned for new subject");
    assert_eq!(provisioned.identifier, "acme:subject-42");
    assert_eq!(provisioned.email.as_deref(), Some("fed-user@example.com"));
    assert!(!provisioned.disabled);

    // Step 3: the SPA redeems the one-time code for the bearer token
    let request = test::TestRequest::post()
        .uri("/auth/exchange")
        .set_json(json!({ "code": exchange_code }))
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert_eq!(body["user"]["identifier"], "acme:subject-42");
    assert_eq!(body["user"]["provider"], "acme");

    // Step 4: replaying the consumed callback cookie fails single-use
    let request = test::TestRequest::get()
        .uri(&format!(
            "/auth/federated/callback?code=mock-auth-code&state={state}"
        ))
        .cookie(authreq_cookie)
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), 401);
    let body = body_json(response).await;
    assert_eq!(body["reason"], "InvalidState");
}

#[actix_web::test]
async fn test_federated_flow_reuses_linked_principal() {
    let provider_url = start_mock_provider().await;

    let mut settings = create_test_settings();
    settings.providers = vec![test_provider("acme", &provider_url)];
    // Provisioning off: only pre-linked identities may log in
    settings.provisioning.auto_provision = false;

    let users = Arc::new(
        InMemoryUserStore::new().with_user(passgate::users::UserRecord {
            id: "id-linked".to_string(),
            identifier: "linked".to_string(),
            password_hash: None,
            display_name: Some("Linked Account".to_string()),
            email: Some("linked@example.com".to_string()),
            disabled: false,
            identities: vec![passgate::users::LinkedIdentity {
                provider: "acme".to_string(),
                subject: "subject-42".to_string(),
            }],
        }),
    );
    let services = build_test_services(&settings, users.clone()).await;
    let pipeline = Pipeline::from_settings(&settings);
    let app = test::init_service(App::new().configure(|cfg| {
        services.register(cfg);
        pipeline.configure(cfg);
    }))
    .await;

    let request = test::TestRequest::get()
        .uri("/auth/federated/sign_in?provider=acme")
        .to_request();
    let response = test::call_service(&app, request).await;
    let authreq_cookie = response
        .response()
        .cookies()
        .find(|c| c.name() == "passgate_authreq")
        .unwrap()
        .into_owned();
    let location = response
        .headers()
        .get("Location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let state = query_param(&location, "state").unwrap();

    let request = test::TestRequest::get()
        .uri(&format!(
            "/auth/federated/callback?code=mock-auth-code&state={state}"
        ))
        .cookie(authreq_cookie)
        .to_request();
    let response = test::call_service(&app, request).await;
    assert_eq!(response.status(), 302);

    let location = response
        .headers()
        .get("Location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let exchange_code = query_param(&location, "code").unwrap();

    let request = test::TestRequest::post()
        .uri("/auth/exchange")
        .set_json(json!({ "code": exchange_code }))
        .to_request();
    let response = test::call_service(&app, request).await;
    let body = body_json(response).await;
    // Mapped onto the pre-linked principal, not a fresh one
    assert_eq!(body["user"]["id"], "id-linked");
    assert_eq!(body["user"]["identifier"], "linked");
    assert_eq!(users.len(), 1);
}

#[actix_web::test]
async fn test_federated_flow_unlinked_subject_rejected_without_provisioning() {
    let provider_url = start_mock_provider().await;

    let mut settings = create_test_settings();
    settings.providers = vec![test_provider("acme", &provider_url)];
    settings.provisioning.auto_provision = false;

    let users = Arc::new(InMemoryUserStore::new());
    let services = build_test_services(&settings, users.clone()).await;
    let pipeline = Pipeline::from_settings(&settings);
    let app = test::init_service(App::new().configure(|cfg| {
        services.register(cfg);
        pipeline.configure(cfg);
    }))
    .await;

    let request = test::TestRequest::get()
        .uri("/auth/federated/sign_in?provider=acme")
        .to_request();
    let response = test::call_service(&app, request).await;
    let authreq_cookie = response
        .response()
        .cookies()
        .find(|c| c.name() == "passgate_authreq")
        .unwrap()
        .into_owned();
    let location = response
        .headers()
        .get("Location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let state = query_param(&location, "state").unwrap();

    let request = test::TestRequest::get()
        .uri(&format!(
            "/auth/federated/callback?code=mock-auth-code&state={state}"
        ))
        .cookie(authreq_cookie)
        .to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status(), 401);
    let body = body_json(response).await;
    assert_eq!(body["reason"], "BadCredentials");
    // No principal was provisioned
    assert!(users.is_empty());
}

#[actix_web::test]
async fn test_provider_error_when_token_endpoint_down() {
    // Point the provider at a closed port: exchange fails, never retried
    let mut settings = create_test_settings();
    settings.providers = vec![test_provider("acme", "http://127.0.0.1:9")];

    let users = Arc::new(InMemoryUserStore::new());
    let services = build_test_services(&settings, users).await;
    let pipeline = Pipeline::from_settings(&settings);
    let app = test::init_service(App::new().configure(|cfg| {
        services.register(cfg);
        pipeline.configure(cfg);
    }))
    .await;

    let request = test::TestRequest::get()
        .uri("/auth/federated/sign_in?provider=acme")
        .to_request();
    let response = test::call_service(&app, request).await;
    let authreq_cookie = response
        .response()
        .cookies()
        .find(|c| c.name() == "passgate_authreq")
        .unwrap()
        .into_owned();
    let location = response
        .headers()
        .get("Location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let state = query_param(&location, "state").unwrap();

    let request = test::TestRequest::get()
        .uri(&format!(
            "/auth/federated/callback?code=mock-auth-code&state={state}"
        ))
        .cookie(authreq_cookie)
        .to_request();
    let response = test::call_service(&app, request).await;

    assert_eq!(response.status(), 401);
    let body = body_json(response).await;
    assert_eq!(body["reason"], "ProviderError");
}
