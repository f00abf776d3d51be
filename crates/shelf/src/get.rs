//! Stored record retrieval by source and id.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::Row;

use crate::config::{self, Config};
use crate::db;

#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    pub source: String,
    pub id: String,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub payload_hash: String,
    pub created_at: String, // ISO8601
    pub payload: serde_json::Value,
}

pub async fn get_record(config: &Config, source: &str, id: &str) -> Result<RecordResponse> {
    if !config.sources.contains_key(source) {
        bail!("unknown source: {}", source);
    }
    let pool = db::connect(config).await?;
    let table = config::table_name(source);

    let row = sqlx::query(&format!(
        "SELECT id, payload, title, price, payload_hash, created_at FROM {} WHERE id = ?",
        table
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await;
    pool.close().await;

    let Some(row) = row? else {
        bail!("record not found: {}/{}", source, id);
    };

    let payload: String = row.get("payload");
    let created_at: i64 = row.get("created_at");

    Ok(RecordResponse {
        source: source.to_string(),
        id: row.get("id"),
        title: row.get("title"),
        price: row.get("price"),
        payload_hash: row.get("payload_hash"),
        created_at: format_ts_iso(created_at),
        payload: serde_json::from_str(&payload)?,
    })
}

pub async fn run_get(config: &Config, source: &str, id: &str) -> Result<()> {
    let record = get_record(config, source, id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
