//! SQLite-backed [`RecordStore`] implementation.
//!
//! One instance serves one source table. Existence checks bind the whole id
//! set as a single JSON array and expand it with `json_each`, so a page costs
//! one query no matter how many ids it carries (and SQLite's bind-parameter
//! limit never comes into play). Inserts run inside a `sqlx` transaction that
//! rolls back when dropped.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};

use shelf_core::error::PersistenceError;
use shelf_core::extract::{to_float, walk, Segment};
use shelf_core::models::StoredRecord;
use shelf_core::store::{RecordStore, StoreTx};

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteRecordStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteRecordStore {
    /// `table` must be a validated identifier (see [`crate::config::table_name`]).
    pub fn new(pool: SqlitePool, table: String) -> Self {
        Self { pool, table }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

fn backend(op: &'static str) -> impl Fn(sqlx::Error) -> PersistenceError {
    move |e| PersistenceError::backend(op, e)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn exists_batch(
        &self,
        ids: &HashSet<String>,
    ) -> Result<HashSet<String>, PersistenceError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let id_list = serde_json::to_string(&ids.iter().collect::<Vec<_>>())
            .map_err(|e| PersistenceError::backend("exists_batch", e))?;

        let found: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE id IN (SELECT value FROM json_each(?))",
            self.table
        ))
        .bind(id_list)
        .fetch_all(&self.pool)
        .await
        .map_err(backend("exists_batch"))?;

        Ok(found.into_iter().collect())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, PersistenceError> {
        let tx = self.pool.begin().await.map_err(backend("begin"))?;
        Ok(Box::new(SqliteTx {
            tx,
            table: self.table.clone(),
        }))
    }

    async fn get(&self, id: &str) -> Result<Option<StoredRecord>, PersistenceError> {
        let payload: Option<String> =
            sqlx::query_scalar(&format!("SELECT payload FROM {} WHERE id = ?", self.table))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend("get"))?;

        payload
            .map(|text| {
                serde_json::from_str(&text)
                    .map(|payload| StoredRecord::new(id, payload))
                    .map_err(|e| PersistenceError::backend("get", e))
            })
            .transpose()
    }

    async fn count(&self) -> Result<u64, PersistenceError> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(backend("count"))?;
        Ok(n.max(0) as u64)
    }
}

struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
    table: String,
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn insert_many(&mut self, records: &[StoredRecord]) -> Result<(), PersistenceError> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO {} (id, payload, title, price, payload_hash, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            self.table
        );

        for record in records {
            let result = sqlx::query(&sql)
                .bind(&record.id)
                .bind(record.payload.to_string())
                .bind(flat_title(&record.payload))
                .bind(flat_price(&record.payload))
                .bind(record.payload_hash())
                .bind(now)
                .execute(&mut *self.tx)
                .await;

            if let Err(e) = result {
                let unique = e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                return Err(if unique {
                    PersistenceError::Rejected {
                        id: record.id.clone(),
                        reason: "primary key already exists".to_string(),
                    }
                } else {
                    PersistenceError::backend("insert_many", e)
                });
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        self.tx.commit().await.map_err(backend("commit"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        self.tx.rollback().await.map_err(backend("rollback"))
    }
}

/// `title` for transformed records, `name` for raw API records.
fn flat_title(payload: &Value) -> Option<String> {
    ["title", "name"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Top-level `price`, or the nested regular price of raw API records.
fn flat_price(payload: &Value) -> Option<f64> {
    let top = payload.get("price").cloned().unwrap_or(Value::Null);
    let value = if top.is_object() {
        walk(&top, &Segment::parse_path("regularPrice.amount.value"))
    } else {
        top
    };
    to_float("price", &value).ok().and_then(|v| v.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use serde_json::json;
    use tempfile::TempDir;

    async fn store(tmp: &TempDir) -> SqliteRecordStore {
        let pool = db::connect_path(&tmp.path().join("s.sqlite")).await.unwrap();
        migrate::apply_schema(&pool, &["records_api".to_string()])
            .await
            .unwrap();
        SqliteRecordStore::new(pool, "records_api".to_string())
    }

    fn rec(id: &str) -> StoredRecord {
        StoredRecord::new(id, json!({ "id": id, "name": format!("Drug {}", id) }))
    }

    fn ids<'a>(list: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
        list.into_iter().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn insert_commit_and_query() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_many(&[rec("A"), rec("B")]).await.unwrap();
        tx.commit().await.unwrap();

        let found = store.exists_batch(&ids(["A", "B", "Z"])).await.unwrap();
        assert_eq!(found, ids(["A", "B"]));
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.get("A").await.unwrap(), Some(rec("A")));
        assert_eq!(store.get("Z").await.unwrap(), None);
    }

    #[tokio::test]
    async fn large_id_sets_are_one_query() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_many(&[rec("17"), rec("4999")]).await.unwrap();
        tx.commit().await.unwrap();

        // Far beyond SQLite's default bind-parameter limit.
        let wanted: HashSet<String> = (0..50_000).map(|i| i.to_string()).collect();
        let found = store.exists_batch(&wanted).await.unwrap();
        assert_eq!(found, ids(["17", "4999"]));
    }

    #[tokio::test]
    async fn failed_batch_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_many(&[rec("A"), rec("B"), rec("A")])
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Rejected { ref id, .. } if id == "A"));
        tx.rollback().await.unwrap();

        assert!(store.exists_batch(&ids(["A", "B"])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_many(&[rec("A")]).await.unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    fn flattened_columns() {
        let raw = json!({"name": "Aspirin", "price": {"regularPrice": {"amount": {"value": "12.50"}}}});
        assert_eq!(flat_title(&raw).as_deref(), Some("Aspirin"));
        assert_eq!(flat_price(&raw), Some(12.5));

        let flat = json!({"title": "Drops", "price": 99.0});
        assert_eq!(flat_title(&flat).as_deref(), Some("Drops"));
        assert_eq!(flat_price(&flat), Some(99.0));

        assert_eq!(flat_price(&json!({"price": null})), None);
        assert_eq!(flat_title(&json!({})), None);
    }
}
