//! Database schema migrations (idempotent).
//!
//! One table per configured source, named by [`config::table_name`]:
//!
//! | Column | Meaning |
//! |--------|---------|
//! | `id` | externally assigned primary key |
//! | `payload` | stored JSON (raw or transformed) |
//! | `title`, `price` | flattened copies for ad-hoc queries, nullable |
//! | `payload_hash` | SHA-256 of `payload` |
//! | `created_at` | first ingestion, Unix seconds |
//!
//! plus a `checkpoints` table holding the last committed page per source.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::{self, Config};
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let tables: Vec<String> = config.sources.keys().map(|s| config::table_name(s)).collect();
    apply_schema(&pool, &tables).await?;
    pool.close().await;
    Ok(())
}

/// Create the checkpoints table and every listed record table.
///
/// Table names must already be validated identifiers.
pub async fn apply_schema(pool: &SqlitePool, tables: &[String]) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            source TEXT PRIMARY KEY,
            last_page INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for table in tables {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                title TEXT,
                price REAL,
                payload_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_created_at ON {table}(created_at DESC)"
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn schema_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("t.sqlite")).await.unwrap();
        let tables = vec!["records_api".to_string()];
        apply_schema(&pool, &tables).await.unwrap();
        apply_schema(&pool, &tables).await.unwrap();

        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('records_api', 'checkpoints')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(n, 2);
    }
}
