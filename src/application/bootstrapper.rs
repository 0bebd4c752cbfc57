//! Application bootstrapper
//!
//! Handles all initialization and setup for the mirrorlist frontend and the
//! standalone updater.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{
    Args, Config, ConfigSource, LogConfig, FRONTEND_CONFIG_FILE, UPDATER_CONFIG_FILE,
};
use crate::db;
use crate::endpoints;
use crate::services::checker::CheckerPipeline;
use crate::services::geo::GeoIpResolver;
use crate::state::AppState;

/// Bootstrap and run the HTTP frontend
pub async fn run(args: Args) -> anyhow::Result<()> {
    let config = init_config(&args, FRONTEND_CONFIG_FILE)?;

    tracing::info!("Starting mirrorlist v{}", env!("CARGO_PKG_VERSION"));

    let resolver = GeoIpResolver::open(&config.geo_database.file)
        .context("Failed to open the geo database")?;
    resolver.check_age();

    let conn = init_database(&config).await?;

    // Keep the handle alive for the lifetime of the server
    let _checker = if config.backend.enabled {
        Some(CheckerPipeline::start(conn.clone(), &config.backend)?)
    } else {
        tracing::info!("Checker disabled, serving mirror lists only");
        None
    };

    let state = AppState::new(conn, Arc::new(resolver), &config.frontend);
    let app = create_app(state, &config);

    serve(app, &config.frontend.listen).await
}

/// Bootstrap and run the checker pipeline until Ctrl-C
pub async fn run_updater(args: Args) -> anyhow::Result<()> {
    let config = init_config(&args, UPDATER_CONFIG_FILE)?;

    tracing::info!("Starting mirrorlist updater v{}", env!("CARGO_PKG_VERSION"));

    let conn = init_database(&config).await?;
    let checker = CheckerPipeline::start(conn, &config.backend)?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    checker.abort();

    Ok(())
}

/// Load the configuration and set up logging from it
fn init_config(args: &Args, default_path: &str) -> anyhow::Result<Config> {
    let (config, source) =
        Config::load(args, default_path).context("Failed to load configuration")?;

    init_tracing(&config.log);

    match source {
        ConfigSource::File(path) => tracing::info!("Configuration read from {}", path.display()),
        ConfigSource::Defaults(path) => {
            tracing::info!("No configuration file at {}, using defaults", path.display())
        }
    }

    Ok(config)
}

/// Initialize tracing/logging
fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mirrorlist={}", log.level).into());

    let json = log.json.then(|| tracing_subscriber::fmt::layer().json());
    let plain = (!log.json).then(|| tracing_subscriber::fmt::layer().with_ansi(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .init();
}

/// Connect to the store, creating the schema on first use
async fn init_database(config: &Config) -> anyhow::Result<DatabaseConnection> {
    let conn = db::connect(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.display_target()))?;

    tracing::info!(
        "Database connection established ({})",
        config.database.display_target()
    );
    Ok(conn)
}

/// Create the main application router
fn create_app(state: AppState, config: &Config) -> Router {
    endpoints::create_router(state, &config.frontend.admin).layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
async fn serve(app: Router, listen: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("Invalid listen address {}", listen))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
