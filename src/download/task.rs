use crate::resolve::source::SourceKind;
use crate::resolve::ResolvedItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Log entry for task events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Log level for entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            message: message.into(),
        }
    }
}

/// Concurrency lane a task is scheduled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceClass {
    /// Up to `parallelism` transfers at once
    DirectParallel,
    /// One at a time with a cool-down between tasks
    RateLimitedSerial,
    /// One at a time; the remote caching step is order-sensitive
    CacheThenFetchSerial,
}

impl SourceClass {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DirectParallel => "direct-parallel",
            Self::RateLimitedSerial => "rate-limited-serial",
            Self::CacheThenFetchSerial => "cache-then-fetch-serial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Resolving,
    Downloading,
    Extracting,
    Classifying,
    Placed,
    Failed,
    SkippedDuplicate,
}

impl TaskStatus {
    /// Placed, failed or skipped
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Placed | Self::Failed | Self::SkippedDuplicate)
    }

    /// Finished without needing another attempt
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Placed | Self::SkippedDuplicate)
    }

    /// Mid-flight states that never survive a restart
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Resolving | Self::Downloading | Self::Extracting | Self::Classifying
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Classifying => "classifying",
            Self::Placed => "placed",
            Self::Failed => "failed",
            Self::SkippedDuplicate => "skipped-duplicate",
        }
    }
}

/// Represents a single unit of work: one file (or one extractor item)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: Uuid,
    /// Raw input line, kept so the task can be re-resolved
    pub original_input: String,
    /// `None` until resolved (magnets are resolved lazily)
    pub resolved_url: Option<String>,
    pub source: SourceKind,
    pub source_class: SourceClass,
    pub status: TaskStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub suggested_name: String,
    pub size_hint: Option<u64>,
    pub selected: bool,
    pub playlist_index: Option<u32>,
    /// Resolved URL must be refreshed before the next attempt
    #[serde(default)]
    pub needs_refresh: bool,
    /// Removed or private at the source; never re-attempted
    #[serde(default)]
    pub unavailable: bool,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub downloaded: u64,
    /// Library paths written for this task
    #[serde(default)]
    pub placed_paths: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl DownloadTask {
    pub fn new(original_input: impl Into<String>, source: SourceKind, suggested_name: impl Into<String>) -> Self {
        let mut task = Self {
            id: Uuid::new_v4(),
            original_input: original_input.into(),
            resolved_url: None,
            source,
            source_class: source.fetch_policy().class,
            status: TaskStatus::Pending,
            attempt_count: 0,
            last_error: None,
            suggested_name: suggested_name.into(),
            size_hint: None,
            selected: true,
            playlist_index: None,
            needs_refresh: false,
            unavailable: false,
            headers: HashMap::new(),
            downloaded: 0,
            placed_paths: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            logs: Vec::new(),
        };
        task.logs.push(LogEntry::info("Task created"));
        task
    }

    /// Build a task from a resolved item. Unavailable items start failed.
    pub fn from_resolved(item: ResolvedItem) -> Self {
        let mut task = Self::new(item.original_input, item.source, item.suggested_name);
        task.resolved_url = item.url;
        task.size_hint = item.size_hint;
        task.playlist_index = item.playlist_index;
        task.headers = item.headers;

        if let Some(reason) = item.unavailable {
            task.status = TaskStatus::Failed;
            task.unavailable = true;
            task.log_error(format!("Unavailable at source: {}", reason));
            task.last_error = Some(reason);
        }
        task
    }

    /// Add an info log entry
    pub fn log_info(&mut self, message: String) {
        self.logs.push(LogEntry::info(message));
    }

    /// Add a warning log entry
    pub fn log_warn(&mut self, message: String) {
        self.logs.push(LogEntry::warn(message));
    }

    /// Add an error log entry
    pub fn log_error(&mut self, message: String) {
        self.logs.push(LogEntry::error(message));
    }

    /// Mark the task failed with a reason
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.log_error(reason.clone());
        self.last_error = Some(reason);
    }

    /// Return an interrupted task to `pending`; the next run starts it over
    pub fn reset_to_pending(&mut self) {
        self.status = TaskStatus::Pending;
        self.attempt_count = 0;
        self.downloaded = 0;
        self.started_at = None;
        if self.source.fetch_policy().url_expires {
            self.needs_refresh = true;
        }
    }
}
