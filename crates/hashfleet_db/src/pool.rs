//! SQLite pool creation.
//!
//! The orchestrator is the only writer; agents never touch the database.
//! A small pool is enough because every query is short-lived.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::error::Result;
use crate::schema;

/// Database pool type used across all repositories.
pub type DbPool = SqlitePool;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Open (creating if needed) a SQLite database file and apply the schema.
pub async fn connect(path: &Path) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .map_err(sqlx::Error::from)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    schema::init_schema(&pool).await?;
    info!("Opened database at {}", path.display());
    Ok(pool)
}

/// Open an in-memory database with the schema applied (tests).
pub async fn connect_memory() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;
    schema::init_schema(&pool).await?;
    Ok(pool)
}
