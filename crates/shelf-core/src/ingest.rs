//! Per-batch ingestion step.
//!
//! For one [`Batch`]:
//!
//! 1. read every item's id with the source's [`IdField`];
//! 2. ask the store which ids it already has, in one query;
//! 3. keep the unknown items, in page order;
//! 4. transform them (or keep the raw JSON) into [`StoredRecord`]s;
//! 5. insert and commit them as one unit;
//! 6. report what was added.
//!
//! `added_count` is `page_size - |already stored|`, the figure the progress
//! line has always shown; `inserted_count` is what was really written.
//!
//! Any failure abandons the whole batch with nothing committed, so re-running
//! the same page is safe. Items repeated inside one page are not checked
//! against each other; the store rejects the second insert and the batch
//! fails.

use std::collections::HashSet;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ExtractionError, IngestError};
use crate::models::{Batch, IdField, RawRecord, StoredRecord};
use crate::progress::ProgressReport;
use crate::store::RecordStore;
use crate::transform::Transformer;

pub struct Ingestor<'a> {
    source: String,
    store: &'a dyn RecordStore,
    transformer: Option<&'a dyn Transformer>,
    id_field: IdField,
    page_limit: Option<u32>,
}

impl<'a> Ingestor<'a> {
    /// An ingestor that stores raw payloads as received.
    pub fn new(source: &str, store: &'a dyn RecordStore, id_field: IdField) -> Self {
        Self {
            source: source.to_string(),
            store,
            transformer: None,
            id_field,
            page_limit: None,
        }
    }

    /// Store transformed records instead of raw payloads.
    pub fn with_transformer(mut self, transformer: &'a dyn Transformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Page limit shown in progress reports.
    pub fn with_page_limit(mut self, page_limit: Option<u32>) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub async fn ingest(&self, batch: &Batch) -> Result<ProgressReport, IngestError> {
        let page = batch.page_index;
        let extraction = |source: ExtractionError| IngestError::Extraction { page, source };

        let ids = batch
            .items
            .iter()
            .map(|item| self.id_field.id_of(item))
            .collect::<Result<Vec<_>, _>>()
            .map_err(extraction)?;

        let wanted: HashSet<String> = ids.iter().cloned().collect();
        let existing = self
            .store
            .exists_batch(&wanted)
            .await
            .map_err(|source| IngestError::Persistence { page, source })?;

        let candidates = batch
            .items
            .iter()
            .zip(&ids)
            .filter(|(_, id)| !existing.contains(*id))
            .map(|(item, id)| -> Result<StoredRecord, ExtractionError> {
                Ok(StoredRecord::new(id.clone(), self.payload(item)?))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(extraction)?;

        if candidates.is_empty() {
            debug!(source = %self.source, page, "page holds only known items");
        } else {
            self.persist(page, &candidates).await?;
        }

        Ok(ProgressReport {
            source: self.source.clone(),
            page_index: page,
            page_limit: self.page_limit,
            page_size: batch.page_size,
            added_count: batch.page_size.saturating_sub(existing.len() as u32),
            inserted_count: candidates.len() as u32,
            total_count: batch.items.len() as u32,
        })
    }

    fn payload(&self, item: &RawRecord) -> Result<Value, ExtractionError> {
        match (self.transformer, item) {
            (Some(t), _) => Ok(Value::Object(t.transform(item)?)),
            (None, RawRecord::Json(value)) => Ok(value.clone()),
            (None, RawRecord::Document { url, html }) => Ok(json!({ "url": url, "html": html })),
        }
    }

    async fn persist(&self, page: u32, records: &[StoredRecord]) -> Result<(), IngestError> {
        let persistence = |source| IngestError::Persistence { page, source };

        let mut tx = self.store.begin().await.map_err(persistence)?;
        if let Err(source) = tx.insert_many(records).await {
            if let Err(e) = tx.rollback().await {
                warn!(source = %self.source, page, error = %e, "rollback failed");
            }
            return Err(persistence(source));
        }
        tx.commit().await.map_err(persistence)
    }
}
