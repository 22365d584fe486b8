//! Calendar sources feed the task store through [`TaskStore::upsert`]; the
//! engine only asks them to refresh once per polling cycle.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::scheduler::{StoreError, TaskStore, TaskUpsert};

mod ics;

pub use ics::IcsFileSync;

/// Title keywords that mark a task as red alert when the source does not say.
pub const DEFAULT_RED_ALERT_KEYWORDS: &[&str] = &["med", "medicine", "pill", "take"];

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("feed parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("ics parse error: {0}")]
    Ics(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("calendar source error: {0}")]
    Source(String),
}

pub trait CalendarSync: Send + Sync {
    fn name(&self) -> &str;

    /// Upserts the source's current tasks and returns how many were processed.
    fn sync(&self, store: &TaskStore) -> Result<usize, SyncError>;
}

#[derive(Debug, Default, Clone)]
pub struct NoopSync;

impl CalendarSync for NoopSync {
    fn name(&self) -> &str {
        "noop"
    }

    fn sync(&self, _store: &TaskStore) -> Result<usize, SyncError> {
        Ok(0)
    }
}

/// Runs independent sources in turn. A failing source is logged and the
/// remaining ones still run; the first failure is returned afterwards.
#[derive(Default)]
pub struct MultiSync {
    sources: Vec<Box<dyn CalendarSync>>,
}

impl MultiSync {
    pub fn new(sources: Vec<Box<dyn CalendarSync>>) -> Self {
        Self { sources }
    }

    pub fn push(&mut self, source: Box<dyn CalendarSync>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl CalendarSync for MultiSync {
    fn name(&self) -> &str {
        "multi"
    }

    fn sync(&self, store: &TaskStore) -> Result<usize, SyncError> {
        let mut processed = 0usize;
        let mut first_error = None;
        for source in &self.sources {
            match source.sync(store) {
                Ok(count) => processed += count,
                Err(err) => {
                    warn!("calendar source {} failed: {}", source.name(), err);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(processed),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    start_ts: i64,
    #[serde(default)]
    end_ts: Option<i64>,
    #[serde(default)]
    red: Option<bool>,
}

/// Reads a JSON array of already-normalized calendar records, for bridges
/// (CalDAV, Google) that cannot write an `.ics` file.
///
/// ```json
/// [{"uid": "evt-1", "title": "Take pills", "start_ts": 1700000000, "end_ts": 1700000600}]
/// ```
#[derive(Debug, Clone)]
pub struct FeedFileSync {
    path: PathBuf,
    keywords: Vec<String>,
}

impl FeedFileSync {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keywords: DEFAULT_RED_ALERT_KEYWORDS
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CalendarSync for FeedFileSync {
    fn name(&self) -> &str {
        "feed-file"
    }

    fn sync(&self, store: &TaskStore) -> Result<usize, SyncError> {
        if !self.path.exists() {
            debug!("feed file does not exist: {}", self.path.display());
            return Ok(0);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let entries: Vec<FeedEntry> = serde_json::from_str(&raw)?;
        let mut processed = 0usize;
        for entry in entries {
            let title = entry
                .title
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "No title".to_string());
            let uid = entry
                .uid
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| format!("{}-{}", entry.start_ts, title));
            let red = entry
                .red
                .unwrap_or_else(|| is_red_alert(&title, &self.keywords));
            store.upsert(&TaskUpsert::new(
                uid,
                title,
                entry.start_ts,
                entry.end_ts,
                red,
            ))?;
            processed += 1;
        }
        info!(
            "feed sync processed {} event(s) from {}",
            processed,
            self.path.display()
        );
        Ok(processed)
    }
}

/// Case-insensitive substring match of any keyword in the title.
pub fn is_red_alert(title: &str, keywords: &[String]) -> bool {
    let lowered = title.to_lowercase();
    keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && lowered.contains(&keyword.to_lowercase()))
}
