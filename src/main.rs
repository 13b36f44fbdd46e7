use std::{sync::Arc, time::Duration};

use colored::Colorize;
use log::{error, info, warn};
use pottogether_collab::{
    ArcedDatabase, Collab, DatabaseError, MemoryDatabase, PgDatabase, SystemClock,
};
use pottogether_server::{ConfigError, LocalObjectStore, ServerConfig, ServerContext};
use thiserror::Error;

mod logging;

const MAX_DATABASE_CONNECTIONS: u32 = 10;

#[derive(Debug, Error)]
enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Server stopped unexpectedly: {0}")]
    Server(#[from] std::io::Error),
}

impl AppError {
    fn hint(&self) -> String {
        match self {
            AppError::Config(_) => "Check the POTTOGETHER_* environment variables and try again.".to_string(),
            AppError::Database(_) => "This is a database error. Make sure DATABASE_URL points to a running PostgreSQL instance, or set it to \"memory\" to run without one.".to_string(),
            AppError::Server(_) => "Make sure the port is free and the upload directory is writable.".to_string(),
        }
    }
}

async fn connect(config: &ServerConfig) -> Result<ArcedDatabase, AppError> {
    if config.uses_memory_database() {
        warn!("Using the in-memory database, nothing will be persisted");
        return Ok(Arc::new(MemoryDatabase::new()));
    }

    info!("Connecting to database...");
    let database = PgDatabase::new(&config.database_url, MAX_DATABASE_CONNECTIONS).await?;

    info!("Running migrations...");
    database.migrate().await?;

    Ok(Arc::new(database))
}

/// Periodically clears expired sessions and checks room member counts
fn spawn_maintenance(collab: Arc<Collab>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            if let Err(e) = collab.auth.clear_expired().await {
                error!("Failed to clear expired sessions: {}", e);
            }

            // Drift itself is logged by the audit
            if let Err(e) = collab.rooms.audit_member_counts().await {
                warn!("Failed to audit room member counts: {}", e);
            }
        }
    });
}

async fn run() -> Result<(), AppError> {
    let config = ServerConfig::from_env()?;
    let database = connect(&config).await?;

    let collab = Arc::new(Collab::new(database, Arc::new(SystemClock)));
    let store = LocalObjectStore::new(config.upload_dir.clone(), config.public_url.clone());

    spawn_maintenance(collab.clone(), config.maintenance_interval);

    info!("Initialized successfully.");

    let context = ServerContext {
        collab,
        store: Arc::new(store),
    };

    pottogether_server::run_server(&config, context).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logger() {
        eprintln!("Could not initialize logging: {e}");
        return;
    }

    if let Err(error) = run().await {
        error!(
            "{} Read the error below to troubleshoot the issue.",
            "pottogether failed to start!".bold().red()
        );
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
    }
}
