//! Core data models that flow through the ingestion pipeline.
//!
//! A [`Batch`] of [`RawRecord`]s comes out of the paginator, each record is
//! turned into a [`StoredRecord`] (optionally via a [`FlatRecord`]) and the
//! per-page outcome is summarised in a
//! [`ProgressReport`](crate::progress::ProgressReport).

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ExtractionError;
use crate::extract::{walk, Segment};

/// Normalized output of a transformer: output field name → value.
///
/// Keys keep the order of the rule set that produced them.
pub type FlatRecord = serde_json::Map<String, Value>;

/// An item exactly as it came from a source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// One element of a JSON API response.
    Json(Value),
    /// One fetched HTML page, kept as source text.
    Document { url: String, html: String },
}

impl RawRecord {
    /// Short name of the record shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RawRecord::Json(_) => "json",
            RawRecord::Document { .. } => "document",
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            RawRecord::Json(v) => Some(v),
            RawRecord::Document { .. } => None,
        }
    }
}

/// One page worth of raw records plus its pagination metadata.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-based page index.
    pub page_index: u32,
    pub items: Vec<RawRecord>,
    /// Page size that was requested from the source.
    pub page_size: u32,
}

/// A record as persisted. Created once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: String,
    pub payload: Value,
}

impl StoredRecord {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Hex SHA-256 of the serialized payload.
    pub fn payload_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.payload.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// How the stable identity of an item is read.
///
/// The same logical item must yield the same id on every crawl.
#[derive(Debug, Clone, PartialEq)]
pub enum IdField {
    /// JSON path to the id value; strings are taken as-is, numbers are
    /// rendered in decimal.
    Path(Vec<Segment>),
    /// The URL a document was fetched from.
    DocumentUrl,
}

impl IdField {
    /// Shorthand for a top-level JSON key.
    pub fn key(name: &str) -> Self {
        IdField::Path(vec![Segment::key(name)])
    }

    pub fn id_of(&self, raw: &RawRecord) -> Result<String, ExtractionError> {
        match (self, raw) {
            (IdField::Path(path), RawRecord::Json(value)) => match walk(value, path) {
                Value::String(s) if !s.is_empty() => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(ExtractionError::MissingField(describe_path(path))),
            },
            (IdField::DocumentUrl, RawRecord::Document { url, .. }) => Ok(url.clone()),
            (_, other) => Err(ExtractionError::WrongShape {
                transformer: "id accessor".to_string(),
                found: other.kind(),
            }),
        }
    }
}

fn describe_path(path: &[Segment]) -> String {
    path.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_from_string_and_number() {
        let id = IdField::key("id");
        assert_eq!(
            id.id_of(&RawRecord::Json(json!({"id": "A"}))).unwrap(),
            "A"
        );
        assert_eq!(
            id.id_of(&RawRecord::Json(json!({"id": 4512}))).unwrap(),
            "4512"
        );
    }

    #[test]
    fn missing_id_is_an_error() {
        let id = IdField::Path(vec![Segment::key("product"), Segment::key("id")]);
        let err = id
            .id_of(&RawRecord::Json(json!({"product": null})))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::MissingField(p) if p == "product.id"));
    }

    #[test]
    fn document_id_is_its_url() {
        let raw = RawRecord::Document {
            url: "https://shop.test/p/1".to_string(),
            html: String::new(),
        };
        assert_eq!(IdField::DocumentUrl.id_of(&raw).unwrap(), "https://shop.test/p/1");
        assert!(IdField::key("id").id_of(&raw).is_err());
    }

    #[test]
    fn payload_hash_is_stable() {
        let a = StoredRecord::new("1", json!({"name": "x"}));
        let b = StoredRecord::new("2", json!({"name": "x"}));
        assert_eq!(a.payload_hash(), b.payload_hash());
        assert_eq!(a.payload_hash().len(), 64);
    }
}
