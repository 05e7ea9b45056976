//! Passpush - Safari web push service
//!
//! - Keeps device registrations in RAM only
//! - Serves pre-signed push packages
//! - Pushes notifications to subscribers via APNS

use passpush::{
    apns, build_router, package::DirectoryPackages, AppState, Config, MemoryStore,
    RegistrationStore,
};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Initialize structured logging
    init_tracing();

    // Load configuration
    let config = Arc::new(Config::from_env());
    log_startup_info(&config);

    // Initialize core components
    let store: Arc<dyn RegistrationStore> = Arc::new(MemoryStore::new(config.max_registrations));
    let apns = apns::create_client(&config);
    let packages = Arc::new(DirectoryPackages::new(config.push_package_dir.clone()));
    let state = AppState::new(config.clone(), store, apns, packages);

    // Build and serve the application
    let app = build_router(state);
    if let Err(e) = serve(app, &config).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing with environment-based log levels.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("passpush=debug,tower_http=info")),
        )
        .init();
}

/// Log startup configuration (no secrets).
fn log_startup_info(config: &Config) {
    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        storage = "memory",
        subjects = config.subjects.len(),
        max_registrations = config.max_registrations,
        push_concurrency = config.push_concurrency,
        push_timeout_secs = config.push_timeout.as_secs(),
        apns_enabled = config.apns_configured(),
        apns_host = config.apns_base_url(),
        trigger_enabled = config.admin_token.is_some(),
        "Starting passpush"
    );

    if config.subjects.is_empty() {
        info!("No WEBSITE_PUSH_ID configured - all subject routes will return 404");
    }
}

/// Bind to address and serve the application.
async fn serve(app: axum::Router, config: &Config) -> std::io::Result<()> {
    let bind_addr = format!("{}:{}", config.bind_addr, config.port);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!(addr = %bind_addr, "Server listening");

    axum::serve(listener, app).await
}
