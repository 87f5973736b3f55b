//! Placement history
//!
//! Newest-first record of files placed into the library, capped at
//! [`HISTORY_CAPACITY`] entries. Used for the `history` command and as a
//! best-effort duplicate check before transfers start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::error::HistoryError;
use super::task::SourceClass;
use crate::file::naming::{is_subtitle, split_extension, split_subtitle_language};

pub const HISTORY_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// Final library file name
    pub filename: String,
    pub source_class: SourceClass,
    pub size: u64,
    pub destination_path: PathBuf,
    /// Name the task was downloaded under (archive name for extracted files)
    #[serde(default)]
    pub source_name: Option<String>,
}

/// In-memory history list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    /// Newest first
    pub entries: Vec<HistoryEntry>,
}

impl History {
    /// Insert at the front, evicting the oldest entries beyond capacity
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn recent(&self, n: usize) -> &[HistoryEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Entry whose placed file name, or original download name, matches.
    ///
    /// Subtitles are only compared with subtitle entries, ignoring their
    /// language tag, and everything else with non-subtitle entries. Names
    /// without an extension match on the stem.
    pub fn find_duplicate(&self, planned_name: &str, source_name: &str) -> Option<&HistoryEntry> {
        let subtitle = is_subtitle(planned_name);
        let (planned_stem, planned_ext) = split_extension(planned_name);
        self.entries
            .iter()
            .filter(|entry| is_subtitle(&entry.filename) == subtitle)
            .find(|entry| {
                let (placed, _) = split_subtitle_language(&entry.filename);
                if placed == planned_name || entry.source_name.as_deref() == Some(source_name) {
                    return true;
                }
                planned_ext.is_none() && split_extension(&entry.filename).0 == planned_stem
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// History persisted to `history.json`; writes are serialized
pub struct HistoryLog {
    path: PathBuf,
    history: Mutex<History>,
}

impl HistoryLog {
    /// Load from `path`. A missing or unreadable file starts an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let history = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<History>(&content) {
                Ok(history) => history,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable history {}: {}", path.display(), e);
                    History::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => History::default(),
            Err(e) => {
                tracing::warn!("Failed to read history {}: {}", path.display(), e);
                History::default()
            }
        };
        tracing::debug!("Loaded {} history entries", history.len());
        Self {
            path,
            history: Mutex::new(history),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut history = self.history.lock().await;
        history.push(entry);
        write_atomic(&self.path, &serde_json::to_string_pretty(&*history)?).await?;
        Ok(())
    }

    pub async fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        self.history.lock().await.recent(n).to_vec()
    }

    pub async fn find_duplicate(&self, planned_name: &str, source_name: &str) -> Option<HistoryEntry> {
        self.history.lock().await.find_duplicate(planned_name, source_name).cloned()
    }

    pub async fn clear(&self) -> Result<(), HistoryError> {
        let mut history = self.history.lock().await;
        *history = History::default();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn len(&self) -> usize {
        self.history.lock().await.len()
    }
}

/// Write through a temp file + rename so readers never see a torn file
pub(crate) async fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, content).await?;
    tokio::fs::rename(&temp_path, path).await
}
