//! # Shelf Core
//!
//! Shared, I/O-free logic for shelf: the record model, the declarative
//! extraction rule engine, transformer composition, the record store
//! abstraction, the pagination state machine and the per-batch ingestion step.
//!
//! This crate contains no tokio, sqlx, HTTP or HTML dependencies. Native
//! collaborators (SQLite store, HTTP fetchers, HTML transformers) live in the
//! `shelf` crate and plug in through the [`store::RecordStore`],
//! [`paginate::PageFetcher`] and [`transform::Transformer`] traits.
//!
//! ## Data Flow
//!
//! ```text
//! ┌────────────┐  Batch  ┌────────────┐  StoredRecord  ┌─────────────┐
//! │ Paginator  │────────▶│  Ingestor  │───────────────▶│ RecordStore │
//! │ (fetcher)  │         │ Transformer│                │  (SQLite)   │
//! └────────────┘         └─────┬──────┘                └─────────────┘
//!                              ▼
//!                        ProgressReport
//! ```

pub mod error;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod paginate;
pub mod progress;
pub mod store;
pub mod transform;
