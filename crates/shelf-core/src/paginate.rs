//! Pagination controller.
//!
//! Drives a [`PageFetcher`] one page at a time. Upstream sources give no
//! reliable page count, so the first empty page is the end of the sequence.
//! An optional page limit caps runaway pagination independently of that.
//!
//! ```text
//!            items > 0
//!        ┌───────────────┐
//!        ▼               │
//!  AwaitingPage(n) ──────┘ n → n+1
//!        │  items = 0        → Exhausted
//!        │  n > page_limit   → LimitReached
//!        │  fetch error      → Failed(n)
//!        │  n = u32::MAX     → LimitReached after that page
//! ```
//!
//! [`Paginator::next_batch`] takes `&mut self` and hands back an owned
//! [`Batch`]; page `n+1` cannot be requested while page `n` is still being
//! ingested.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{FetchError, IngestError};
use crate::models::{Batch, RawRecord};

/// Source of raw pages. Throttling between requests is the fetcher's job.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Vec<RawRecord>, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    AwaitingPage(u32),
    /// A page came back empty.
    Exhausted,
    /// The configured last page has been ingested.
    LimitReached,
    /// Fetching the given page failed.
    Failed(u32),
}

impl PageState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PageState::AwaitingPage(_))
    }
}

pub struct Paginator<'a> {
    fetcher: &'a dyn PageFetcher,
    page_size: u32,
    page_limit: Option<u32>,
    state: PageState,
    requested: u32,
}

impl<'a> Paginator<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, page_size: u32) -> Self {
        Self {
            fetcher,
            page_size,
            page_limit: None,
            state: PageState::AwaitingPage(1),
            requested: 0,
        }
    }

    /// Resume at `page` instead of page 1.
    pub fn starting_at(mut self, page: u32) -> Self {
        self.state = PageState::AwaitingPage(page.max(1));
        self
    }

    /// Never request a page after `limit` (inclusive).
    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.page_limit = limit;
        self
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn page_limit(&self) -> Option<u32> {
        self.page_limit
    }

    /// Number of fetch requests issued so far, including the empty one.
    pub fn pages_requested(&self) -> u32 {
        self.requested
    }

    /// Fetch the next non-empty page, or `None` once the sequence is over.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>, IngestError> {
        let page = match self.state {
            PageState::AwaitingPage(n) => n,
            _ => return Ok(None),
        };
        if self.page_limit.is_some_and(|limit| page > limit) {
            debug!(page, "page limit reached");
            self.state = PageState::LimitReached;
            return Ok(None);
        }

        self.requested = self.requested.saturating_add(1);
        match self.fetcher.fetch_page(page, self.page_size).await {
            Err(source) => {
                self.state = PageState::Failed(page);
                Err(IngestError::Fetch { page, source })
            }
            Ok(items) if items.is_empty() => {
                debug!(page, "empty page, source exhausted");
                self.state = PageState::Exhausted;
                Ok(None)
            }
            Ok(items) => {
                self.state = match page.checked_add(1) {
                    Some(next) => PageState::AwaitingPage(next),
                    None => {
                        debug!(page, "last addressable page");
                        PageState::LimitReached
                    }
                };
                Ok(Some(Batch {
                    page_index: page,
                    items,
                    page_size: self.page_size,
                }))
            }
        }
    }
}
