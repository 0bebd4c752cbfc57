use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement,
};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

use crate::config::database::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::migrations::Migrator;

pub type DbConn = DatabaseConnection;

/// Tables that make up a complete schema
pub const SCHEMA_TABLES: [&str; 3] = ["mirrors", "repos", "status"];

/// Connect using the configured driver and create the schema if needed
pub async fn connect(config: &DatabaseConfig) -> Result<DbConn> {
    let url = config.connection_url()?;
    tracing::info!("Connecting to database {}", config.display_target());
    let db = connect_with_url(&url).await?;
    init_schema(&db).await?;
    Ok(db)
}

/// Open a connection pool without touching the schema
pub async fn connect_with_url(database_url: &str) -> Result<DbConn> {
    let mut opts = ConnectOptions::new(database_url);
    opts.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    Database::connect(opts)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to connect to database: {}", e)))
}

/// Count how many of the mirrorlist tables exist
pub async fn table_count(db: &DbConn) -> Result<i64> {
    let backend = db.get_database_backend();
    let names = SCHEMA_TABLES
        .iter()
        .map(|t| format!("'{}'", t))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = match backend {
        DbBackend::Sqlite => format!(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name IN ({})",
            names
        ),
        DbBackend::Postgres => format!(
            "SELECT COUNT(*) AS count FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name IN ({})",
            names
        ),
        DbBackend::MySql => format!(
            "SELECT COUNT(*) AS count FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name IN ({})",
            names
        ),
    };

    let row = db
        .query_one(Statement::from_string(backend, sql))
        .await?
        .ok_or_else(|| AppError::Internal("Table count returned no rows".to_string()))?;

    Ok(row.try_get::<i64>("", "count")?)
}

/// Create the schema when any of the tables is missing
pub async fn init_schema(db: &DbConn) -> Result<()> {
    let existing = table_count(db).await?;
    if existing >= SCHEMA_TABLES.len() as i64 {
        tracing::debug!("Schema present ({} tables)", existing);
        return Ok(());
    }

    tracing::info!(
        "Found {} of {} tables, creating schema",
        existing,
        SCHEMA_TABLES.len()
    );
    Migrator::up(db, None)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create schema: {}", e)))?;
    tracing::info!("Schema created");

    Ok(())
}

/// Function producing a uniform random value for ORDER BY
pub fn random_function(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Sqlite | DbBackend::Postgres => "RANDOM()",
        DbBackend::MySql => "RAND()",
    }
}

/// Column definition of an auto-incrementing integer primary key
pub fn auto_increment_primary_key(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        DbBackend::Postgres => "BIGSERIAL PRIMARY KEY",
        DbBackend::MySql => "BIGINT AUTO_INCREMENT PRIMARY KEY",
    }
}
