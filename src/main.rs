//! BookHub Backend
//!
//! REST backend for an online book platform: catalog, reading, reviews,
//! discussions, subscriptions and an admin site.

use bookhub::{api, auth, core, db};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::config::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Initialize logging system based on configuration
    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Configuration loaded successfully");
    info!("Starting BookHub Backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Server configuration"
    );
    info!(
        path = ?config.database.path,
        pool_size = config.database.connection_pool_size,
        "Database configuration"
    );

    let profiler = Arc::new(core::ApiProfiler::new(config.profiler.clone()));

    // Initialize database
    info!("Initializing database...");
    let db = Arc::new(
        db::DatabaseManager::from_config(&config.database)?.with_profiler(profiler.clone()),
    );
    info!("Running database migrations...");
    db.migrate()?;
    info!("Database initialized successfully");

    // Ensure the first superadmin exists
    let admins = db::repository::AdminRepository::new(db.clone());
    auth::ensure_bootstrap_admin(&admins, &config.security).await?;

    // Initialize API server
    info!("Initializing HTTP server...");
    let server_url = format!("http://{}:{}", config.server.host, config.server.port);
    let server = api::ApiServer::new(config, db, profiler)?;

    info!(url = %server_url, "Server ready - starting to serve requests");

    // Start serving (this will block until shutdown signal)
    server.serve().await?;

    Ok(())
}
