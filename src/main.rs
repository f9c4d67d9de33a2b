use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use clinrec_backend::auth::{AuthGuard, CredentialStore};
use clinrec_backend::config::{CorsConfig, Settings};
use clinrec_backend::database::Database;
use clinrec_backend::handlers::{self, AppState};
use clinrec_backend::middleware::{AccessLogger, RequestId};
use clinrec_backend::{logging, metrics};
use std::sync::Arc;
use tracing::info;

fn build_cors(config: &CorsConfig) -> Cors {
    if config.is_permissive() {
        return Cors::permissive();
    }

    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ])
        .supports_credentials()
        .max_age(3600);

    for origin in &config.allowed_origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new().context("Failed to load configuration")?;

    logging::init_logging(&settings.logging.log_dir, &settings.logging.level)
        .context("Failed to initialize logging")?;
    metrics::init_metrics().context("Failed to register metrics")?;

    info!("Clinical records backend starting...");
    info!("Configuration loaded: {}", settings.server.bind_addr);

    info!("Opening database at {}", settings.database.path);
    let db = Database::open(&settings.database)
        .await
        .context("Failed to open database")?;

    let credentials = Arc::new(CredentialStore::new(&settings.users));
    info!("Credential store loaded with {} users", credentials.len());

    let app_state = web::Data::new(AppState {
        db: db.clone(),
        auth: AuthGuard::new(credentials, db),
    });

    info!("Starting server on {}", settings.server.bind_addr);

    let cors_config = settings.cors.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(AccessLogger)
            .wrap(RequestId)
            .wrap(build_cors(&cors_config))
            .app_data(app_state.clone())
            .configure(handlers::configure)
    })
    .workers(settings.server.workers.unwrap_or(4))
    .bind(&settings.server.bind_addr)?
    .run()
    .await?;

    Ok(())
}
