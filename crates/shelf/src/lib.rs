//! # Shelf
//!
//! Incremental, dedup-aware ingestion of paginated product catalogs into
//! SQLite.
//!
//! A source is either a JSON API queried with a GraphQL template or an HTML
//! listing whose entries link to product pages. Each run walks the source
//! page by page, stores only the items whose id is not yet known and commits
//! every page as one unit, so re-running a crawl is always safe.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌──────────────┐
//! │   Fetchers   │──▶│  shelf-core         │──▶│   SQLite     │
//! │ GraphQL/HTML │   │ Paginator, Ingestor │   │ records_<src>│
//! └──────────────┘   │ Transformers        │   │ checkpoints  │
//!                    └─────────┬───────────┘   └──────────────┘
//!                              ▼
//!                     progress (stderr)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf init                    # create database and tables
//! shelf sources                 # list configured sources
//! shelf sync products           # crawl until the first empty page
//! shelf sync products --resume  # continue after the last committed page
//! shelf get products 4512       # show one stored record
//! shelf export products --dir out  # one <id>.json per record
//! shelf stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite record store |
//! | [`fetch`] | GraphQL and HTML page fetchers |
//! | [`transformers`] | Product API and product page transformers |
//! | [`sync`] | Run orchestration and checkpoints |
//! | [`progress`] | Progress reporters |
//! | [`get`], [`stats`], [`sources`] | Read-only commands |
//! | [`export`] | Per-record JSON files |

pub mod config;
pub mod db;
pub mod export;
pub mod fetch;
pub mod get;
pub mod migrate;
pub mod progress;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod sync;
pub mod transformers;
