//! Database statistics overview.
//!
//! Record counts and checkpoints per configured source, so an operator can
//! see how far each catalog has been crawled. Used by `shelf stats`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::{self, Config};
use crate::db;

struct SourceStats {
    source: String,
    records: Option<i64>,
    last_page: Option<i64>,
    last_sync_ts: Option<i64>,
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let checkpoint_rows = if table_exists(&pool, "checkpoints").await? {
        sqlx::query("SELECT source, last_page, updated_at FROM checkpoints")
            .fetch_all(&pool)
            .await?
    } else {
        Vec::new()
    };

    let mut stats = Vec::new();
    for name in config.sources.keys() {
        let table = config::table_name(name);
        let records = if table_exists(&pool, &table).await? {
            Some(
                sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
                    .fetch_one(&pool)
                    .await?,
            )
        } else {
            None
        };
        let checkpoint = checkpoint_rows
            .iter()
            .find(|cp| cp.get::<String, _>("source") == *name);

        stats.push(SourceStats {
            source: name.clone(),
            records,
            last_page: checkpoint.map(|cp| cp.get("last_page")),
            last_sync_ts: checkpoint.map(|cp| cp.get("updated_at")),
        });
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let total: i64 = stats.iter().filter_map(|s| s.records).sum();

    println!("Shelf Database Stats");
    println!("====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Records:     {}", total);

    if !stats.is_empty() {
        println!();
        println!(
            "  {:<20} {:>9} {:>10}   {}",
            "SOURCE", "RECORDS", "LAST PAGE", "LAST SYNC"
        );
        println!("  {}", "-".repeat(60));
        for s in &stats {
            let records = s
                .records
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            let last_page = s
                .last_page
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            let sync_display = match s.last_sync_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<20} {:>9} {:>10}   {}",
                s.source, records, last_page, sync_display
            );
        }
    }
    println!();

    pool.close().await;
    Ok(())
}

pub(crate) async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let n: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(pool)
            .await?;
    Ok(n > 0)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
    }
}
