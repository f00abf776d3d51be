//! SQLite database connection management.
//!
//! Provides a connection pool to the SQLite database with WAL mode enabled.
//! The database file and its parent directories are created automatically if
//! they don't exist.
//!
//! # Connection Pool
//!
//! Uses `sqlx::SqlitePool` with up to 5 connections. A sync run only ever
//! uses one at a time (one existence query, then one transaction per page),
//! the rest serve `get` and `stats` against a database being written.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a connection pool to the configured SQLite database.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.db.path).await
}

/// Open (creating if needed) the SQLite database at `db_path`.
///
/// Writers wait up to [`BUSY_TIMEOUT`] for a lock instead of failing the
/// page immediately when `stats` or `get` is reading at the same moment.
///
/// # Errors
///
/// Returns an error if the database cannot be created or connected to.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
