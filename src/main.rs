#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

use actix_cors::Cors;
use actix_web::{middleware::Logger, App, HttpServer};
use std::sync::Arc;

use passgate::authentication::AuthenticationServiceFactory;
use passgate::password::{Argon2Hasher, PasswordHasher};
use passgate::settings::PassgateSettings;
use passgate::users::{InMemoryUserStore, UserRecord, UserStore};
use passgate::Pipeline;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Passgate.toml and environment variables;
    // this also initializes the logger
    let settings = PassgateSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let users = build_user_store()
        .map_err(|e| std::io::Error::other(format!("Failed to build user store: {e}")))?;

    let services = AuthenticationServiceFactory::build(&settings, users)
        .await
        .map_err(|e| {
            std::io::Error::other(format!("Failed to initialize authentication services: {e}"))
        })?;

    start_server(services, settings).await
}

/// Build the user store for this process
///
/// The in-memory store is the reference implementation; production
/// deployments supply their own [`UserStore`] and assemble the services
/// directly. `PASSGATE_BOOTSTRAP_IDENTIFIER` / `PASSGATE_BOOTSTRAP_SECRET`
/// seed one password account so a fresh instance is usable.
fn build_user_store() -> anyhow::Result<Arc<dyn UserStore>> {
    let store = InMemoryUserStore::new();

    if let (Ok(identifier), Ok(secret)) = (
        std::env::var("PASSGATE_BOOTSTRAP_IDENTIFIER"),
        std::env::var("PASSGATE_BOOTSTRAP_SECRET"),
    ) {
        let hasher = Argon2Hasher;
        store.insert(UserRecord {
            id: uuid::Uuid::new_v4().to_string(),
            identifier: identifier.clone(),
            password_hash: Some(hasher.hash(&secret)?),
            display_name: None,
            email: None,
            disabled: false,
            identities: vec![],
        });
        log::info!("Seeded bootstrap user '{identifier}'");
    }

    Ok(Arc::new(store))
}

/// Start the HTTP server with the assembled pipeline
///
/// # Errors
///
/// Returns an error if server binding fails or the server fails to start
async fn start_server(
    services: passgate::AuthenticationServices,
    settings: PassgateSettings,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    let pipeline = Pipeline::from_settings(&settings);
    print_startup_info(&bind_address, &settings);

    let cors_origins = settings.get_cors_origins();
    let services = Arc::new(services);

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Authorization", "Content-Type", "Accept"])
            .supports_credentials()
            .max_age(3600);

        let services = services.clone();
        let pipeline = pipeline.clone();
        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .configure(move |cfg| {
                services.register(cfg);
                pipeline.configure(cfg);
            })
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &PassgateSettings) {
    println!("Starting Passgate authentication front-end on http://{bind_address}");
    println!();
    println!("Endpoints:");
    println!("  POST {}  - Password login", settings.login.path);
    println!(
        "  GET  {}?provider=<name>  - Start federated login",
        settings.login.federated_path
    );
    println!(
        "  GET  {}  - OAuth2 callback",
        settings.login.callback_path
    );
    println!(
        "  POST {}  - Redeem one-time exchange code",
        settings.login.exchange_path
    );
    println!(
        "  GET  {}  - Bearer-token userinfo",
        settings.login.userinfo_path
    );
    println!("  GET  /ping  - Health check");
    println!();
    println!("OAuth2 callback URL for identity providers:");
    println!("  {}", settings.redirect_uri());
    println!();
    println!(
        "SPA callback for federated logins: {}",
        settings.login.spa_callback_url
    );
}
