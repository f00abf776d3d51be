//! Sync orchestration: one run of one source.
//!
//! Wires the configured fetcher, transformer and SQLite store into the
//! core [`Paginator`] and [`Ingestor`] and drives them page by page:
//!
//! ```text
//! start page (1 | --start-page | checkpoint + 1)
//!   └─ loop: next_batch → ingest → report → checkpoint
//!        ends on: empty page | page limit | Ctrl-C | first error
//! ```
//!
//! The checkpoint is the last page whose batch was committed; `--resume`
//! continues right after it. A failed page leaves the checkpoint untouched,
//! so the error message's page number is exactly where a retry resumes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use shelf_core::error::{ConfigError, PersistenceError};
use shelf_core::extract::Segment;
use shelf_core::ingest::Ingestor;
use shelf_core::models::{IdField, StoredRecord};
use shelf_core::paginate::{PageState, Paginator};
use shelf_core::store::memory::InMemoryStore;
use shelf_core::store::{RecordStore, StoreTx};

use crate::config::{self, Config, SourceConfig, SourceKind, StoreMode};
use crate::db;
use crate::fetch;
use crate::migrate;
use crate::progress::{ProgressMode, SyncProgressEvent, SyncProgressReporter};
use crate::sqlite_store::SqliteRecordStore;
use crate::transformers;

/// Command-line overrides for one run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: Option<u32>,
    /// `Some(0)` lifts the configured limit.
    pub page_limit: Option<u32>,
    pub start_page: Option<u32>,
    pub resume: bool,
    pub dry_run: bool,
    pub progress: ProgressMode,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: None,
            page_limit: None,
            start_page: None,
            resume: false,
            dry_run: false,
            progress: ProgressMode::Off,
        }
    }
}

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Exhausted,
    LimitReached,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Exhausted => "exhausted",
            StopReason::LimitReached => "page limit reached",
            StopReason::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub source: String,
    pub first_page: u32,
    /// Non-empty pages ingested.
    pub pages: u32,
    pub items_seen: u64,
    pub added: u64,
    pub last_page: Option<u32>,
    pub reason: StopReason,
}

pub async fn run_sync(
    config: &Config,
    source_name: &str,
    opts: &SyncOptions,
) -> Result<SyncSummary> {
    let source = lookup_source(config, source_name)?;

    let page_size = opts.page_size.unwrap_or(source.page_size);
    if page_size == 0 {
        bail!(ConfigError("page size must be > 0".to_string()));
    }
    let page_limit = match opts.page_limit {
        Some(0) => None,
        Some(n) => Some(n),
        None => source.page_limit(),
    };

    let pool = db::connect(config).await?;
    let table = config::table_name(source_name);
    migrate::apply_schema(&pool, std::slice::from_ref(&table)).await?;

    let first_page = match (opts.start_page, opts.resume) {
        (Some(page), _) => page.max(1),
        (None, true) => get_checkpoint(&pool, source_name)
            .await?
            .map_or(1, |page| page.saturating_add(1)),
        (None, false) => 1,
    };

    let sqlite = SqliteRecordStore::new(pool.clone(), table);
    let store: Box<dyn RecordStore> = if opts.dry_run {
        Box::new(DryRunStore::new(sqlite))
    } else {
        Box::new(sqlite)
    };

    let transformer = match source.store {
        StoreMode::Transformed => Some(transformers::for_source(source.kind)?),
        StoreMode::Raw => None,
    };
    let fetcher = fetch::build_fetcher(source)?;

    let mut pager = Paginator::new(fetcher.as_ref(), page_size)
        .starting_at(first_page)
        .with_limit(page_limit);
    let mut ingestor =
        Ingestor::new(source_name, store.as_ref(), id_field(source)).with_page_limit(page_limit);
    if let Some(t) = transformer.as_deref() {
        ingestor = ingestor.with_transformer(t);
    }

    let reporter = opts.progress.reporter();
    let cancelled = Arc::new(AtomicBool::new(false));
    let watcher = {
        let flag = cancelled.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current page");
                flag.store(true, Ordering::SeqCst);
            }
        })
    };

    let span = info_span!("sync", source = %source_name, run_id = %Uuid::new_v4());
    let result = async {
        info!(first_page, page_size, ?page_limit, dry_run = opts.dry_run, "sync started");
        let checkpoints = (!opts.dry_run).then_some(&pool);
        let summary = drive_pages(
            source_name,
            first_page,
            &mut pager,
            &ingestor,
            reporter.as_ref(),
            &cancelled,
            checkpoints,
        )
        .await?;
        info!(
            pages = summary.pages,
            added = summary.added,
            reason = summary.reason.as_str(),
            "sync finished"
        );
        Ok::<_, anyhow::Error>(summary)
    }
    .instrument(span)
    .await;

    watcher.abort();
    pool.close().await;

    let summary = result?;
    reporter.report(SyncProgressEvent::Finished {
        source: summary.source.clone(),
        pages: summary.pages,
        added: summary.added,
        reason: summary.reason.as_str(),
    });
    Ok(summary)
}

/// Page loop of one run. `cancelled` is checked before every fetch, so an
/// interrupt lands between two committed pages. Checkpoints are written only
/// when a pool is given.
async fn drive_pages(
    source_name: &str,
    first_page: u32,
    pager: &mut Paginator<'_>,
    ingestor: &Ingestor<'_>,
    reporter: &dyn SyncProgressReporter,
    cancelled: &AtomicBool,
    checkpoints: Option<&SqlitePool>,
) -> Result<SyncSummary> {
    let mut summary = SyncSummary {
        source: source_name.to_string(),
        first_page,
        pages: 0,
        items_seen: 0,
        added: 0,
        last_page: None,
        reason: StopReason::Exhausted,
    };

    loop {
        if cancelled.load(Ordering::SeqCst) {
            summary.reason = StopReason::Cancelled;
            break;
        }
        let Some(batch) = pager.next_batch().await? else {
            summary.reason = match pager.state() {
                PageState::LimitReached => StopReason::LimitReached,
                _ => StopReason::Exhausted,
            };
            break;
        };

        let report = ingestor.ingest(&batch).await?;
        info!(
            page = report.page_index,
            inserted = report.inserted_count,
            skipped = report.skipped_count(),
            "{}",
            report
        );
        if let Some(pool) = checkpoints {
            set_checkpoint(pool, source_name, report.page_index).await?;
        }

        summary.pages += 1;
        summary.items_seen += report.total_count as u64;
        summary.added += report.inserted_count as u64;
        summary.last_page = Some(report.page_index);
        reporter.report(SyncProgressEvent::Page(report));
    }

    Ok(summary)
}

/// Print the run summary on stdout.
pub fn print_summary(summary: &SyncSummary, dry_run: bool) {
    if dry_run {
        println!("sync {} (dry-run)", summary.source);
    } else {
        println!("sync {}", summary.source);
    }
    println!("  first page: {}", summary.first_page);
    println!("  pages ingested: {}", summary.pages);
    println!("  items seen: {}", summary.items_seen);
    println!("  added: {}", summary.added);
    println!("  stopped: {}", summary.reason.as_str());
    if let (Some(page), false) = (summary.last_page, dry_run) {
        println!("  checkpoint: page {}", page);
    }
    println!("ok");
}

fn lookup_source<'a>(config: &'a Config, name: &str) -> Result<&'a SourceConfig> {
    match config.sources.get(name) {
        Some(source) => Ok(source),
        None => {
            let known: Vec<&str> = config.sources.keys().map(String::as_str).collect();
            bail!(ConfigError(format!(
                "unknown source '{}'. Available: {}",
                name,
                if known.is_empty() {
                    "(none configured)".to_string()
                } else {
                    known.join(", ")
                }
            )))
        }
    }
}

fn id_field(source: &SourceConfig) -> IdField {
    match source.kind {
        SourceKind::Graphql => IdField::Path(Segment::parse_path(&source.id_path)),
        SourceKind::Html => IdField::DocumentUrl,
    }
}

pub async fn get_checkpoint(pool: &SqlitePool, source: &str) -> Result<Option<u32>> {
    let page: Option<i64> =
        sqlx::query_scalar("SELECT last_page FROM checkpoints WHERE source = ?")
            .bind(source)
            .fetch_optional(pool)
            .await?;

    Ok(page.and_then(|p| u32::try_from(p).ok()))
}

pub async fn set_checkpoint(pool: &SqlitePool, source: &str, page: u32) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO checkpoints (source, last_page, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(source) DO UPDATE SET last_page = excluded.last_page, updated_at = excluded.updated_at
        "#,
    )
    .bind(source)
    .bind(page as i64)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Reads from the real store, writes into memory only.
struct DryRunStore {
    base: SqliteRecordStore,
    staged: InMemoryStore,
}

impl DryRunStore {
    fn new(base: SqliteRecordStore) -> Self {
        Self {
            base,
            staged: InMemoryStore::new(),
        }
    }
}

#[async_trait]
impl RecordStore for DryRunStore {
    async fn exists_batch(
        &self,
        ids: &HashSet<String>,
    ) -> Result<HashSet<String>, PersistenceError> {
        let mut found = self.base.exists_batch(ids).await?;
        found.extend(self.staged.exists_batch(ids).await?);
        Ok(found)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, PersistenceError> {
        self.staged.begin().await
    }

    async fn get(&self, id: &str) -> Result<Option<StoredRecord>, PersistenceError> {
        match self.staged.get(id).await? {
            Some(record) => Ok(Some(record)),
            None => self.base.get(id).await,
        }
    }

    async fn count(&self) -> Result<u64, PersistenceError> {
        Ok(self.base.count().await? + self.staged.count().await?)
    }
}
