//! In-memory [`RecordStore`] implementation for testing.
//!
//! Records live in a `Vec` + id index behind `std::sync::RwLock`. A
//! transaction stages records privately and publishes them under one write
//! lock on commit. An id can be marked as poisoned so that staging it fails,
//! which is how tests exercise the all-or-nothing contract.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::models::StoredRecord;

use super::{RecordStore, StoreTx};

#[derive(Default)]
struct Inner {
    records: Vec<StoredRecord>,
    index: HashMap<String, usize>,
    fail_on: HashSet<String>,
    exists_queries: usize,
    insert_calls: usize,
}

/// In-memory store for tests and dry runs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

fn poisoned() -> PersistenceError {
    PersistenceError::backend("lock", "in-memory store lock poisoned")
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store without going through a transaction.
    pub fn with_records(records: Vec<StoredRecord>) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.write() {
            for record in records {
                let pos = inner.records.len();
                inner.index.insert(record.id.clone(), pos);
                inner.records.push(record);
            }
        }
        store
    }

    /// Make any later attempt to stage `id` fail.
    pub fn fail_on(&self, id: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.fail_on.insert(id.to_string());
        }
    }

    /// All stored records in insertion order.
    pub fn records(&self) -> Vec<StoredRecord> {
        self.inner
            .read()
            .map(|inner| inner.records.clone())
            .unwrap_or_default()
    }

    /// Number of `exists_batch` calls served so far.
    pub fn exists_queries(&self) -> usize {
        self.inner.read().map(|i| i.exists_queries).unwrap_or(0)
    }

    /// Number of `insert_many` calls received so far (committed or not).
    pub fn insert_calls(&self) -> usize {
        self.inner.read().map(|i| i.insert_calls).unwrap_or(0)
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn exists_batch(
        &self,
        ids: &HashSet<String>,
    ) -> Result<HashSet<String>, PersistenceError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.exists_queries += 1;
        Ok(ids
            .iter()
            .filter(|id| inner.index.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, PersistenceError> {
        Ok(Box::new(MemoryTx {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
        }))
    }

    async fn get(&self, id: &str) -> Result<Option<StoredRecord>, PersistenceError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.index.get(id).map(|&pos| inner.records[pos].clone()))
    }

    async fn count(&self) -> Result<u64, PersistenceError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.records.len() as u64)
    }
}

struct MemoryTx {
    inner: Arc<RwLock<Inner>>,
    staged: Vec<StoredRecord>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_many(&mut self, records: &[StoredRecord]) -> Result<(), PersistenceError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.insert_calls += 1;
        for record in records {
            if inner.fail_on.contains(&record.id) {
                return Err(PersistenceError::Rejected {
                    id: record.id.clone(),
                    reason: "injected failure".to_string(),
                });
            }
            let staged_dup = self.staged.iter().any(|s| s.id == record.id);
            if staged_dup || inner.index.contains_key(&record.id) {
                return Err(PersistenceError::Rejected {
                    id: record.id.clone(),
                    reason: "primary key already exists".to_string(),
                });
            }
            self.staged.push(record.clone());
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        let MemoryTx { inner, staged } = *self;
        let mut inner = inner.write().map_err(|_| poisoned())?;
        if let Some(dup) = staged.iter().find(|r| inner.index.contains_key(&r.id)) {
            return Err(PersistenceError::Rejected {
                id: dup.id.clone(),
                reason: "primary key already exists".to_string(),
            });
        }
        for record in staged {
            let pos = inner.records.len();
            inner.index.insert(record.id.clone(), pos);
            inner.records.push(record);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        Ok(())
    }
}
