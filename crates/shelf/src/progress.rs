//! Sync progress reporting.
//!
//! Every committed page produces one [`ProgressReport`]. Reports are written
//! to **stderr** so stdout stays parseable for scripts: either the operator
//! line `page: 3/625  added: 18/20` or one JSON object per line.

use std::io::Write;

use shelf_core::progress::ProgressReport;

/// A run-level event.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// A page was ingested and committed.
    Page(ProgressReport),
    /// The run ended; `pages` non-empty pages were ingested.
    Finished {
        source: String,
        pages: u32,
        added: u64,
        reason: &'static str,
    },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr.
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Page(report) => format!("{}\n", report),
            SyncProgressEvent::Finished {
                source,
                pages,
                added,
                reason,
            } => format!(
                "sync {}  {}  {} pages, {} added\n",
                source,
                reason,
                format_number(*pages as u64),
                format_number(*added)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        if let Ok(line) = serde_json::to_string(&json_event(&event)) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

fn json_event(event: &SyncProgressEvent) -> serde_json::Value {
    match event {
        SyncProgressEvent::Page(report) => serde_json::json!({
            "event": "page",
            "source": report.source,
            "page": report.page_index,
            "page_limit": report.page_limit,
            "page_size": report.page_size,
            "added": report.added_count,
            "inserted": report.inserted_count,
            "total": report.total_count,
        }),
        SyncProgressEvent::Finished {
            source,
            pages,
            added,
            reason,
        } => serde_json::json!({
            "event": "finished",
            "source": source,
            "pages": pages,
            "added": added,
            "reason": reason,
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
