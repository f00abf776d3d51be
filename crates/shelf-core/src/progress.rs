//! Per-batch progress report.

use std::fmt;

use serde::Serialize;

/// Outcome of ingesting one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub source: String,
    pub page_index: u32,
    /// Last page the run may request, when bounded.
    pub page_limit: Option<u32>,
    /// Page size that was requested.
    pub page_size: u32,
    /// `page_size` minus the ids already stored. On a short last page this
    /// overstates what was written; see `inserted_count`.
    pub added_count: u32,
    /// Records actually written for this page.
    pub inserted_count: u32,
    /// Items the page actually delivered.
    pub total_count: u32,
}

impl ProgressReport {
    /// Items of this page that were already stored.
    pub fn skipped_count(&self) -> u32 {
        self.total_count.saturating_sub(self.inserted_count)
    }
}

/// `page: 3/625  added: 18/20`
impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = self
            .page_limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "page: {}/{}  added: {}/{}",
            self.page_index, limit, self.added_count, self.page_size
        )
    }
}
