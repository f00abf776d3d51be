//! Export stored records as one JSON file each.
//!
//! `shelf export <source> --dir <path>` writes every stored payload to
//! `<path>/<id>.json`, pretty-printed UTF-8 with non-ASCII text left as is.
//! Existing files for the same id are overwritten, so exporting twice yields
//! the same tree.

use anyhow::{bail, Context, Result};
use sqlx::Row;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::db;
use crate::stats;

/// Write every record of `source` into `dir`. Returns the number written.
pub async fn export_records(config: &Config, source: &str, dir: &Path) -> Result<usize> {
    if !config.sources.contains_key(source) {
        bail!("unknown source: {}", source);
    }
    let pool = db::connect(config).await?;
    let table = config::table_name(source);

    let rows = if stats::table_exists(&pool, &table).await? {
        let sql = format!("SELECT id, payload FROM {} ORDER BY rowid", table);
        sqlx::query(&sql).fetch_all(&pool).await?
    } else {
        Vec::new()
    };
    pool.close().await;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export dir: {}", dir.display()))?;

    for row in &rows {
        let id: String = row.get("id");
        let payload: String = row.get("payload");
        let value: serde_json::Value = serde_json::from_str(&payload)
            .with_context(|| format!("Stored payload of '{}' is not JSON", id))?;
        write_record(dir, &id, &value)?;
    }

    Ok(rows.len())
}

pub async fn run_export(config: &Config, source: &str, dir: &Path) -> Result<()> {
    let written = export_records(config, source, dir).await?;
    eprintln!("Exported {} records of {} to {}", written, source, dir.display());
    Ok(())
}

fn write_record(dir: &Path, id: &str, value: &serde_json::Value) -> Result<PathBuf> {
    let path = dir.join(format!("{}.json", file_stem(id)));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, value)?;
    out.flush()?;
    Ok(path)
}

/// File name for a record id. Ids of HTML sources are URLs, so anything
/// outside `[A-Za-z0-9._-]` becomes `_`.
fn file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        format!("_{}", stem)
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::sqlite_store::SqliteRecordStore;
    use serde_json::json;
    use shelf_core::models::StoredRecord;
    use shelf_core::store::{RecordStore, StoreTx};
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> Config {
        toml::from_str(&format!(
            r#"
[db]
path = "{}/shelf.sqlite"

[sources.api]
kind = "graphql"
url = "http://localhost/graphql"
query = "{{ q }}"

[sources.pages]
kind = "html"
listing_url = "http://localhost/c?page={{page}}"
link_selector = "a"
"#,
            tmp.path().display()
        ))
        .unwrap()
    }

    async fn seed(config: &Config, records: Vec<StoredRecord>) {
        let pool = db::connect(config).await.unwrap();
        migrate::apply_schema(&pool, &["records_api".to_string()])
            .await
            .unwrap();
        let store = SqliteRecordStore::new(pool.clone(), "records_api".to_string());
        let mut tx = store.begin().await.unwrap();
        tx.insert_many(&records).await.unwrap();
        tx.commit().await.unwrap();
        pool.close().await;
    }

    #[tokio::test]
    async fn one_pretty_file_per_record() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        seed(
            &cfg,
            vec![
                StoredRecord::new("4512", json!({"id": "4512", "name": "Аспирин"})),
                StoredRecord::new("4513", json!({"id": "4513", "price": 12.5})),
            ],
        )
        .await;

        let out = tmp.path().join("export");
        assert_eq!(export_records(&cfg, "api", &out).await.unwrap(), 2);

        let text = std::fs::read_to_string(out.join("4512.json")).unwrap();
        assert!(text.contains("Аспирин"));
        assert!(text.contains("\n  \"name\""));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"id": "4512", "name": "Аспирин"}));

        let second: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("4513.json")).unwrap())
                .unwrap();
        assert_eq!(second["price"], 12.5);
    }

    #[tokio::test]
    async fn never_synced_source_exports_nothing() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        let out = tmp.path().join("empty");
        assert_eq!(export_records(&cfg, "pages", &out).await.unwrap(), 0);
        assert!(out.is_dir());
        assert!(export_records(&cfg, "nope", &out).await.is_err());
    }

    #[test]
    fn url_ids_become_file_names() {
        assert_eq!(file_stem("4512"), "4512");
        assert_eq!(file_stem("https://shop.test/p/a?x=1"), "https___shop.test_p_a_x_1");
        assert_eq!(file_stem(".."), "_..");
        assert_eq!(file_stem(""), "_");
    }
}
