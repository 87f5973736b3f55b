//! Session snapshot
//!
//! The queue plus the options that produced it, written after resolution and
//! after every terminal task change. Loading a snapshot yields a task set
//! that is ready to run: nothing is left mid-flight, and links that expire
//! are flagged for re-resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::error::SessionError;
use super::history::write_atomic;
use super::task::{DownloadTask, TaskStatus};
use crate::app::settings::{Credentials, FetchMode, RunOptions};
use crate::util::range::PlaylistRange;

pub const SESSION_VERSION: u32 = 1;

/// Run options worth keeping across a restart (credentials excluded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub show_name_override: Option<String>,
    #[serde(default)]
    pub playlist_range: PlaylistRange,
    pub parallelism: usize,
    pub subtitle_languages: Vec<String>,
    #[serde(default)]
    pub mode: FetchMode,
}

impl SessionConfig {
    pub fn from_options(options: &RunOptions) -> Self {
        Self {
            show_name_override: options.show_name_override.clone(),
            playlist_range: options.playlist_range.clone(),
            parallelism: options.parallelism,
            subtitle_languages: options.subtitle_languages.clone(),
            mode: options.mode,
        }
    }

    /// Rebuild run options, supplying the current credentials
    pub fn to_options(&self, credentials: Credentials) -> RunOptions {
        RunOptions {
            parallelism: self.parallelism,
            show_name_override: self.show_name_override.clone(),
            playlist_range: self.playlist_range.clone(),
            subtitle_languages: self.subtitle_languages.clone(),
            mode: self.mode,
            credentials,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub config: SessionConfig,
    pub tasks: Vec<DownloadTask>,
}

impl SessionSnapshot {
    pub fn new(config: SessionConfig, tasks: Vec<DownloadTask>) -> Self {
        let now = Utc::now();
        Self {
            version: SESSION_VERSION,
            started_at: now,
            updated_at: now,
            config,
            tasks,
        }
    }

    /// Every selected task is placed or skipped
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().filter(|t| t.selected).all(|t| t.status.is_done())
    }

    /// Selected tasks a resume would still run
    pub fn remaining(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.selected && !t.status.is_done())
            .count()
    }

    /// Make a freshly loaded snapshot safe to execute.
    ///
    /// In-flight tasks go back to `pending`, failed tasks are re-armed unless
    /// the source reported them unavailable, attempt counts start over and
    /// expiring links are marked for refresh.
    pub fn prepare_for_resume(&mut self) {
        for task in &mut self.tasks {
            if task.status.is_in_flight() {
                tracing::debug!("Task {} was {} at shutdown, resetting", task.id, task.status.label());
                task.reset_to_pending();
            } else if task.status == TaskStatus::Failed && !task.unavailable {
                task.status = TaskStatus::Pending;
                task.completed_at = None;
            }

            // A resumed task gets its full retry budget back
            if task.status == TaskStatus::Pending {
                task.attempt_count = 0;
            }

            if !task.status.is_done() && task.source.fetch_policy().url_expires {
                task.needs_refresh = true;
            }
        }
    }
}

/// Snapshot file access; one writer at a time
pub struct SessionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), SessionError> {
        let mut snapshot = snapshot.clone();
        snapshot.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(&snapshot)?;

        let _guard = self.write_lock.lock().await;
        write_atomic(&self.path, &json).await?;
        tracing::trace!("Saved session with {} tasks", snapshot.tasks.len());
        Ok(())
    }

    /// Read the snapshot without normalizing it
    pub async fn try_load(&self) -> Result<Option<SessionSnapshot>, SessionError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: SessionSnapshot =
            serde_json::from_str(&content).map_err(|e| SessionError::CorruptSnapshot(e.to_string()))?;
        if snapshot.version > SESSION_VERSION {
            return Err(SessionError::CorruptSnapshot(format!(
                "unsupported session version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    /// Resumable snapshot, or `None` when absent or unreadable
    pub async fn load(&self) -> Option<SessionSnapshot> {
        match self.try_load().await {
            Ok(Some(mut snapshot)) => {
                snapshot.prepare_for_resume();
                tracing::info!(
                    "Loaded session: {} tasks, {} remaining",
                    snapshot.tasks.len(),
                    snapshot.remaining()
                );
                Some(snapshot)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("No resumable session: {}", e);
                None
            }
        }
    }

    pub async fn clear(&self) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::info!("Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::source::SourceKind;
    use pretty_assertions::assert_eq;

    fn config() -> SessionConfig {
        SessionConfig::from_options(
            &RunOptions::default()
                .with_show_name(Some("Drama Name".to_string()))
                .with_range("1,3,5-10")
                .unwrap(),
        )
    }

    fn task(source: SourceKind, status: TaskStatus) -> DownloadTask {
        let mut task = DownloadTask::new("https://example.com/x", source, "x.mkv");
        task.status = status;
        task
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip_keeps_options() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        let placed = task(SourceKind::Direct, TaskStatus::Placed);
        let placed_id = placed.id;
        let snapshot = SessionSnapshot::new(config(), vec![placed, task(SourceKind::Direct, TaskStatus::Pending)]);
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.config, config());
        assert_eq!(loaded.config.playlist_range.to_string(), "1,3,5-10");
        assert_eq!(loaded.tasks[0].id, placed_id);
        assert_eq!(loaded.tasks[0].status, TaskStatus::Placed);
        assert_eq!(loaded.remaining(), 1);
    }

    #[tokio::test]
    async fn test_load_resets_in_flight_and_flags_expiring_links() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        let snapshot = SessionSnapshot::new(
            config(),
            vec![
                task(SourceKind::Gofile, TaskStatus::Downloading),
                task(SourceKind::Direct, TaskStatus::Extracting),
                task(SourceKind::RealDebrid, TaskStatus::Failed),
                task(SourceKind::Pixeldrain, TaskStatus::Placed),
            ],
        );
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap();
        let statuses: Vec<_> = loaded.tasks.iter().map(|t| t.status).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Pending, TaskStatus::Pending, TaskStatus::Pending, TaskStatus::Placed]
        );
        let refresh: Vec<_> = loaded.tasks.iter().map(|t| t.needs_refresh).collect();
        assert_eq!(refresh, vec![true, false, true, false]);
    }

    #[tokio::test]
    async fn test_load_restores_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        // Saved while waiting out a backoff, then cancelled
        let mut interrupted = task(SourceKind::Direct, TaskStatus::Pending);
        interrupted.attempt_count = 2;
        let mut failed = task(SourceKind::Direct, TaskStatus::Failed);
        failed.attempt_count = 3;
        let mut placed = task(SourceKind::Direct, TaskStatus::Placed);
        placed.attempt_count = 1;
        store
            .save(&SessionSnapshot::new(config(), vec![interrupted, failed, placed]))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        let attempts: Vec<_> = loaded.tasks.iter().map(|t| t.attempt_count).collect();
        assert_eq!(attempts, vec![0, 0, 1]);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{\"version\": 1, \"tasks\": [").unwrap();
        let store = SessionStore::new(&path);

        assert!(matches!(store.try_load().await, Err(SessionError::CorruptSnapshot(_))));
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_snapshot_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        assert!(store.load().await.is_none());

        store.save(&SessionSnapshot::new(config(), Vec::new())).await.unwrap();
        assert!(store.exists());
        store.clear().await.unwrap();
        assert!(!store.exists());
        store.clear().await.unwrap();
    }

    #[test]
    fn test_is_complete_ignores_deselected() {
        let mut skipped = task(SourceKind::Direct, TaskStatus::Failed);
        skipped.selected = false;
        let snapshot = SessionSnapshot::new(
            config(),
            vec![task(SourceKind::Direct, TaskStatus::Placed), task(SourceKind::Direct, TaskStatus::SkippedDuplicate), skipped],
        );
        assert!(snapshot.is_complete());
    }

    #[test]
    fn test_credentials_are_not_persisted() {
        let mut options = RunOptions::default();
        options.credentials.realdebrid = Some("secret-token".to_string());
        let snapshot = SessionSnapshot::new(SessionConfig::from_options(&options), Vec::new());
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("secret-token"));
    }
}
