//! Error taxonomy for extraction, persistence, fetching and configuration.
//!
//! Path absence is never an error: rules resolve a missing intermediate to
//! `null`. Errors here mean something the operator should look at, such as a
//! value that no longer parses the way the source used to encode it.
//!
//! Exhaustion of a paginated source is a state of
//! [`Paginator`](crate::paginate::Paginator), not an error.

use thiserror::Error;

/// Boxed error used to carry backend-specific failures (sqlx, reqwest, ...)
/// without making the core depend on those crates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A rule could not produce its value.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("required field '{0}' is missing")]
    MissingField(String),

    #[error("cannot coerce {value} to {target} for field '{key}'")]
    Coercion {
        key: String,
        target: &'static str,
        value: String,
    },

    #[error("malformed structured value in field '{key}': {reason}")]
    Malformed { key: String, reason: String },

    #[error("transformer '{transformer}' cannot read a {found} record")]
    WrongShape {
        transformer: String,
        found: &'static str,
    },

    #[error("duplicate output key '{0}' in rule set")]
    DuplicateKey(String),
}

/// A repository operation failed. The current batch is abandoned; nothing
/// from it is committed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{op} failed: {source}")]
    Backend {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("record '{id}' rejected: {reason}")]
    Rejected { id: String, reason: String },
}

impl PersistenceError {
    pub fn backend(op: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            op,
            source: source.into(),
        }
    }
}

/// One page could not be fetched or decoded.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Missing or invalid configuration. Fatal before any page is requested.
#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

/// Failure of one page of a run. Always names the page so an external retry
/// can resume exactly there.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("page {page}: {source}")]
    Extraction {
        page: u32,
        #[source]
        source: ExtractionError,
    },

    #[error("page {page}: {source}")]
    Persistence {
        page: u32,
        #[source]
        source: PersistenceError,
    },

    #[error("page {page}: {source}")]
    Fetch {
        page: u32,
        #[source]
        source: FetchError,
    },
}

impl IngestError {
    /// The page whose processing failed.
    pub fn page(&self) -> u32 {
        match self {
            IngestError::Extraction { page, .. }
            | IngestError::Persistence { page, .. }
            | IngestError::Fetch { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_error_names_the_page() {
        let err = IngestError::Persistence {
            page: 7,
            source: PersistenceError::Rejected {
                id: "B".to_string(),
                reason: "constraint".to_string(),
            },
        };
        assert_eq!(err.page(), 7);
        assert_eq!(err.to_string(), "page 7: record 'B' rejected: constraint");
    }
}
