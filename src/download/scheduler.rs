//! Execution scheduler
//!
//! Runs the queue lane by lane. Lanes run concurrently with each other; inside
//! a lane the concurrency limit comes from the lane's semaphore (parallelism
//! for direct-parallel sources, one for the serial lanes). Each task goes:
//!
//! ```text
//! pending -> (resolving ->) downloading -> (extracting ->) classifying -> placed
//!         \-> skipped-duplicate          \-> failed -> downloading (retry)
//! ```
//!
//! The session snapshot is saved after every terminal change, and the history
//! log is appended for every file placed.

use super::error::TransferError;
use super::history::{HistoryEntry, HistoryLog};
use super::lane::{self, Lane};
use super::progress::{self, ProgressEvent, ProgressSender};
use super::queue::{StatusCounts, TaskQueue};
use super::retry::RetryPolicy;
use super::session::{SessionConfig, SessionSnapshot, SessionStore};
use super::task::{DownloadTask, TaskStatus};
use super::transfer::{Transfer, TransferRequest};
use crate::app::config::Config;
use crate::app::settings::{FetchMode, RunOptions};
use crate::file::error::ExtractionError;
use crate::file::extract::{ArchiveEntries, ArchiveExtractor, EntryOutcome, Extractor};
use crate::file::naming::{is_archive, is_subtitle};
use crate::file::placement::{Library, PlacementHints, PlannedPlacement};
use crate::resolve::{FetchTarget, FetchUrlProvider, ResolutionError, TransferTool};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Partial-transfer leftovers never placed into the library
const PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl", "temp", "tmp"];

/// Engine settings that come from configuration rather than the run
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub retry: RetryPolicy,
    pub serial_cooldown: Duration,
    pub staging_dir: PathBuf,
    /// Extracted non-subtitle entries smaller than this are discarded
    pub min_extract_size: u64,
    /// yt-dlp download archive
    pub download_archive: Option<PathBuf>,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let download = &config.download;
        Ok(Self {
            retry: RetryPolicy::new(
                download.retry_count,
                Duration::from_secs(download.retry_delay_secs),
                Duration::from_secs(download.rate_limit_cooldown_secs),
            ),
            serial_cooldown: Duration::from_secs(download.serial_cooldown_secs),
            staging_dir: config.staging_dir()?,
            min_extract_size: download.min_extract_size_mb * 1024 * 1024,
            download_archive: Some(crate::util::paths::get_download_archive_path()?),
        })
    }
}

/// Final state of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub id: Uuid,
    pub name: String,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub placed_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    AllSucceeded,
    PartialSuccess,
    TotalFailure,
}

/// Per-task results plus counts for the selected tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Selected tasks still pending (cancelled runs)
    pub pending: usize,
    pub total: usize,
    pub cancelled: bool,
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    pub fn from_tasks(tasks: &[DownloadTask], cancelled: bool) -> Self {
        let counts = StatusCounts::tally(tasks);
        let outcomes = tasks
            .iter()
            .filter(|t| t.selected)
            .map(|t| TaskOutcome {
                id: t.id,
                name: t.suggested_name.clone(),
                status: t.status,
                error: t.last_error.clone(),
                placed_paths: t.placed_paths.clone(),
            })
            .collect();
        Self {
            succeeded: counts.placed,
            failed: counts.failed,
            skipped: counts.skipped,
            pending: counts.pending + counts.active,
            total: counts.total,
            cancelled,
            outcomes,
        }
    }

    pub fn outcome(&self) -> BatchOutcome {
        if self.failed == 0 && self.pending == 0 {
            BatchOutcome::AllSucceeded
        } else if self.succeeded + self.skipped > 0 {
            BatchOutcome::PartialSuccess
        } else {
            BatchOutcome::TotalFailure
        }
    }

    /// e.g. `35 succeeded, 8 failed, 43 total`
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} succeeded", self.succeeded), format!("{} failed", self.failed)];
        if self.skipped > 0 {
            parts.push(format!("{} skipped", self.skipped));
        }
        if self.pending > 0 {
            parts.push(format!("{} not run", self.pending));
        }
        parts.push(format!("{} total", self.total));
        parts.join(", ")
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| o.status == TaskStatus::Failed)
    }
}

/// What a lane needs to know about a finished task
#[derive(Debug, Default)]
struct TaskRun {
    transferred: bool,
    rate_limited: bool,
    /// Sibling tasks created by expansion, in queue order
    spawned: Vec<Uuid>,
}

/// Values fixed for the whole run
struct RunContext {
    options: RunOptions,
    started_at: DateTime<Utc>,
}

enum PlaceResult {
    Placed,
    Duplicate,
}

#[derive(Clone)]
pub struct Scheduler {
    queue: TaskQueue,
    transfer: Arc<dyn Transfer>,
    urls: Arc<dyn FetchUrlProvider>,
    library: Arc<Library>,
    extractor: Arc<dyn Extractor>,
    history: Arc<HistoryLog>,
    session: Arc<SessionStore>,
    settings: Arc<SchedulerSettings>,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
    // Destinations currently being fetched
    claims: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Scheduler {
    pub fn new(
        queue: TaskQueue,
        transfer: Arc<dyn Transfer>,
        urls: Arc<dyn FetchUrlProvider>,
        library: Library,
        history: Arc<HistoryLog>,
        session: Arc<SessionStore>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            queue,
            transfer,
            urls,
            library: Arc::new(library),
            extractor: Arc::new(ArchiveExtractor::default()),
            history,
            session,
            settings: Arc::new(settings),
            progress: None,
            cancel: CancellationToken::new(),
            claims: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Cancelling this token stops the run; in-flight tasks go back to pending
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Execute every selected, non-terminal task and report the outcome
    pub async fn run(&self, options: &RunOptions) -> BatchReport {
        let ctx = Arc::new(RunContext {
            options: options.clone(),
            started_at: Utc::now(),
        });
        self.save_session(&ctx).await;

        let tasks = self.queue.get_all().await;
        let lanes = lane::partition(&tasks, options.parallelism, self.settings.serial_cooldown);
        tracing::info!(
            "Starting batch: {} tasks, {} lanes, parallelism {}",
            tasks.len(),
            lanes.len(),
            options.parallelism
        );

        let stop_monitor = CancellationToken::new();
        let monitor = self
            .progress
            .clone()
            .map(|tx| progress::spawn_aggregate_monitor(self.queue.clone(), tx, stop_monitor.clone()));

        let runs = lanes.into_iter().map(|lane| {
            let ctx = Arc::clone(&ctx);
            async move {
                if lane.is_serial() {
                    self.run_serial_lane(lane, ctx).await
                } else {
                    self.run_parallel_lane(lane, ctx).await
                }
            }
        });
        futures_util::future::join_all(runs).await;

        stop_monitor.cancel();
        if let Some(monitor) = monitor {
            let _ = monitor.await;
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            // Anything that did not reach a terminal state restarts cleanly
            let tasks = self.queue.get_all().await;
            for task in tasks.iter().filter(|t| t.status.is_in_flight()) {
                self.queue.modify(task.id, |t| t.reset_to_pending()).await;
            }
        }

        let tasks = self.queue.get_all().await;
        let mut snapshot = SessionSnapshot::new(SessionConfig::from_options(options), tasks.clone());
        snapshot.started_at = ctx.started_at;
        if snapshot.is_complete() {
            if let Err(e) = self.session.clear().await {
                tracing::warn!("Failed to clear session: {}", e);
            }
        } else if let Err(e) = self.session.save(&snapshot).await {
            tracing::error!("Failed to save session: {}", e);
        }

        let report = BatchReport::from_tasks(&tasks, cancelled);
        tracing::info!("Batch finished: {}", report.summary());
        report
    }

    async fn run_serial_lane(&self, lane: Lane, ctx: Arc<RunContext>) {
        let mut pending: VecDeque<Uuid> = lane.task_ids().iter().copied().collect();
        let mut previous: Option<TaskRun> = None;
        tracing::debug!("{} lane: {} tasks", lane.class().label(), pending.len());

        while let Some(id) = pending.pop_front() {
            if self.cancel.is_cancelled() {
                break;
            }

            if let Some(prev) = previous.take().filter(|p| p.transferred || p.rate_limited) {
                let mut wait = lane.cooldown();
                if prev.rate_limited {
                    wait += self.settings.retry.rate_limit_cooldown;
                }
                if !wait.is_zero() {
                    tracing::debug!("{} lane cooling down for {:?}", lane.class().label(), wait);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }

            let Ok(_permit) = lane.semaphore().acquire_owned().await else {
                break;
            };
            let run = self.execute(id, &ctx).await;
            for sibling in run.spawned.iter().rev() {
                pending.push_front(*sibling);
            }
            previous = Some(run);
        }
    }

    async fn run_parallel_lane(&self, lane: Lane, ctx: Arc<RunContext>) {
        let mut pending: VecDeque<Uuid> = lane.task_ids().iter().copied().collect();
        let semaphore = lane.semaphore();
        let mut workers = JoinSet::new();
        tracing::debug!("{} lane: {} tasks, {} slots", lane.class().label(), pending.len(), lane.permits());

        loop {
            if !self.cancel.is_cancelled() {
                while let Some(&id) = pending.front() {
                    let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                        break;
                    };
                    pending.pop_front();

                    let this = self.clone();
                    let ctx = Arc::clone(&ctx);
                    workers.spawn(async move {
                        let _permit = permit;
                        this.execute(id, &ctx).await
                    });
                }
            }

            match workers.join_next().await {
                Some(Ok(run)) => {
                    for sibling in run.spawned.iter().rev() {
                        pending.push_front(*sibling);
                    }
                }
                Some(Err(e)) => tracing::error!("Download worker failed: {}", e),
                None => break,
            }
        }
    }

    /// Drive one task to a terminal state (or back to pending on cancel)
    async fn execute(&self, id: Uuid, ctx: &RunContext) -> TaskRun {
        let Some(mut task) = self.queue.get_by_id(id).await else {
            return TaskRun::default();
        };
        if task.status.is_terminal() || !task.selected {
            return TaskRun::default();
        }
        task.started_at = Some(Utc::now());
        let mut run = TaskRun::default();

        if task.needs_refresh || task.resolved_url.is_none() {
            self.set_status(&mut task, TaskStatus::Resolving).await;
            let refreshed = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.return_to_pending(task).await;
                    return run;
                }
                result = self.urls.fetch_targets(&task, &ctx.options) => result,
            };
            match refreshed.map(|targets| self.apply_targets(&mut task, targets)) {
                Ok(siblings) if !siblings.is_empty() => {
                    run.spawned = siblings.iter().map(|s| s.id).collect();
                    tracing::info!("{} expanded into {} more tasks", task.original_input, siblings.len());
                    self.queue.update(task.clone()).await;
                    self.queue.insert_after(task.id, siblings).await;
                    self.save_session(ctx).await;
                }
                Ok(_) => {}
                Err(e) => {
                    run.rate_limited = matches!(e, ResolutionError::RateLimited(_));
                    task.unavailable = matches!(e, ResolutionError::NotFound(_));
                    task.fail(format!("Resolution failed: {}", e));
                    self.finish(task, ctx).await;
                    return run;
                }
            }
        }

        let hints = PlacementHints {
            show_name_override: ctx.options.show_name_override.clone(),
            playlist_index: task.playlist_index,
            category_hint: task.source.category_hint(),
        };
        let planned = self.library.plan(&expected_file_name(&task, ctx.options.mode), &hints);

        if let Some(reason) = self.duplicate_reason(&task, &planned).await {
            tracing::info!("Skipping {}: {}", task.suggested_name, reason);
            task.log_info(format!("Skipped: {}", reason));
            task.status = TaskStatus::SkippedDuplicate;
            task.completed_at = Some(Utc::now());
            self.finish(task, ctx).await;
            return run;
        }

        if !self.claims.lock().await.insert(planned.destination.clone()) {
            task.log_info("Skipped: another task is fetching the same file".to_string());
            task.status = TaskStatus::SkippedDuplicate;
            task.completed_at = Some(Utc::now());
            self.finish(task, ctx).await;
            return run;
        }

        let staging = self.settings.staging_dir.join(task.id.to_string());
        let result = self.transfer_with_retry(&mut task, &staging, ctx).await;
        run.transferred = true;

        match result {
            Ok(()) => {
                if let Err(reason) = self.process_staged(&mut task, &staging, &hints).await {
                    task.fail(reason);
                }
                self.finish(task, ctx).await;
            }
            Err(TransferError::Cancelled) => {
                self.return_to_pending(task).await;
            }
            Err(e) => {
                run.rate_limited = matches!(e, TransferError::RateLimited(_));
                task.fail(e.to_string());
                self.finish(task, ctx).await;
            }
        }

        self.claims.lock().await.remove(&planned.destination);
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to clean staging {}: {}", staging.display(), e);
            }
        }
        run
    }

    /// Point the task at the first target; the rest become new sibling tasks
    fn apply_targets(&self, task: &mut DownloadTask, targets: Vec<FetchTarget>) -> Vec<DownloadTask> {
        let mut targets = targets.into_iter();
        let Some(first) = targets.next() else {
            task.resolved_url = None;
            return Vec::new();
        };

        let siblings: Vec<DownloadTask> = targets
            .enumerate()
            .map(|(i, target)| {
                let mut sibling = DownloadTask::new(task.original_input.clone(), task.source, target.suggested_name);
                sibling.resolved_url = Some(target.url);
                sibling.size_hint = target.size_hint;
                sibling.headers = target.headers;
                sibling.playlist_index = target.playlist_index.or(Some(i as u32 + 2));
                sibling.log_info(format!("Expanded from task {}", task.id));
                if let Some(reason) = target.unavailable {
                    sibling.unavailable = true;
                    sibling.fail(reason);
                }
                sibling
            })
            .collect();
        if first.playlist_index.is_some() {
            task.playlist_index = first.playlist_index;
        } else if !siblings.is_empty() {
            task.playlist_index = Some(1);
        }

        task.log_info(format!("Resolved to {}", first.suggested_name));
        task.resolved_url = Some(first.url);
        task.suggested_name = first.suggested_name;
        task.size_hint = first.size_hint.or(task.size_hint);
        task.headers = first.headers;
        task.needs_refresh = false;
        siblings
    }

    async fn duplicate_reason(&self, task: &DownloadTask, planned: &PlannedPlacement) -> Option<String> {
        if let Some(existing) = self.library.existing_size(planned) {
            if let Some(expected) = task.size_hint.filter(|s| *s != existing) {
                tracing::warn!(
                    "{} exists with a different size ({} bytes, expected {})",
                    planned.destination.display(),
                    existing,
                    expected
                );
            }
            return Some(format!("{} already exists", planned.destination.display()));
        }

        self.history
            .find_duplicate(&planned.file_name, &task.suggested_name)
            .await
            .map(|entry| format!("placed before as {}", entry.destination_path.display()))
    }

    async fn transfer_with_retry(
        &self,
        task: &mut DownloadTask,
        staging: &Path,
        ctx: &RunContext,
    ) -> Result<(), TransferError> {
        let Some(url) = task.resolved_url.clone() else {
            return Err(TransferError::Permanent("no fetch URL".to_string()));
        };
        let tool = task.source.fetch_policy().tool;
        let request = TransferRequest {
            url,
            dest_path: staging.join(&task.suggested_name),
            headers: task.headers.clone(),
            tool,
            mode: ctx.options.mode,
            subtitle_languages: ctx.options.subtitle_languages.clone(),
            download_archive: match tool {
                TransferTool::YtDlp => self.settings.download_archive.clone(),
                _ => None,
            },
        };

        loop {
            task.attempt_count += 1;
            task.downloaded = 0;
            task.last_error = None;
            task.log_info(format!("Download attempt {}: {}", task.attempt_count, request.url));
            self.set_status(task, TaskStatus::Downloading).await;

            let callback = progress::task_callback(task.id, self.queue.clone(), self.progress.clone());
            let result = tokio::select! {
                _ = self.cancel.cancelled() => Err(TransferError::Cancelled),
                result = self.transfer.fetch(&request, callback) => result,
            };

            let error = match result {
                Ok(bytes) => {
                    task.downloaded = bytes;
                    tracing::debug!("Transferred {} bytes for {}", bytes, task.suggested_name);
                    return Ok(());
                }
                Err(e) => e,
            };
            if error == TransferError::Cancelled {
                return Err(error);
            }

            let Some(delay) = self.settings.retry.next_delay(task.attempt_count, &error) else {
                tracing::error!("{} failed after {} attempt(s): {}", task.suggested_name, task.attempt_count, error);
                return Err(error);
            };

            tracing::warn!(
                "{} attempt {}/{} failed, retrying in {:?}: {}",
                task.suggested_name,
                task.attempt_count,
                self.settings.retry.max_attempts,
                delay,
                error
            );
            task.log_warn(format!("Attempt {} failed: {}", task.attempt_count, error));
            task.last_error = Some(error.to_string());
            self.set_status(task, TaskStatus::Failed).await;

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Place everything the transfer left in `staging`
    async fn process_staged(&self, task: &mut DownloadTask, staging: &Path, hints: &PlacementHints) -> Result<(), String> {
        let files = staged_files(staging)
            .await
            .map_err(|e| format!("Cannot read staging directory: {}", e))?;

        if files.is_empty() {
            if task.source.fetch_policy().tool != TransferTool::Http {
                // The extractor's download archive already lists this item
                task.log_info("Nothing new to download".to_string());
                task.status = TaskStatus::SkippedDuplicate;
                task.completed_at = Some(Utc::now());
                return Ok(());
            }
            return Err("Transfer finished without producing a file".to_string());
        }

        let mut placed = 0;
        let mut duplicates = 0;
        for file in files {
            let name = file_name(&file);
            if is_archive(&name) {
                self.set_status(task, TaskStatus::Extracting).await;
                let (p, d) = self.extract_archive(task, &file, staging, hints).await?;
                placed += p;
                duplicates += d;
            } else {
                self.set_status(task, TaskStatus::Classifying).await;
                match self.place_file(task, &file, &name, hints).await? {
                    PlaceResult::Placed => placed += 1,
                    PlaceResult::Duplicate => duplicates += 1,
                }
            }
        }

        task.completed_at = Some(Utc::now());
        if placed > 0 {
            task.status = TaskStatus::Placed;
            task.log_info(format!("Placed {} file(s)", placed));
            Ok(())
        } else if duplicates > 0 {
            task.status = TaskStatus::SkippedDuplicate;
            task.log_info("Every file was already in the library".to_string());
            Ok(())
        } else {
            Err("No usable files after extraction".to_string())
        }
    }

    /// Classify one file, move it into the library and record it
    async fn place_file(
        &self,
        task: &mut DownloadTask,
        path: &Path,
        name: &str,
        hints: &PlacementHints,
    ) -> Result<PlaceResult, String> {
        let planned = self.library.plan(name, hints);
        if self.library.existing_size(&planned).is_some() {
            tracing::info!("{} already in library, discarding download", planned.file_name);
            let _ = tokio::fs::remove_file(path).await;
            return Ok(PlaceResult::Duplicate);
        }

        let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        let destination = self
            .library
            .place(path, &planned)
            .await
            .map_err(|e| format!("Placement failed for {}: {}", name, e))?;

        let entry = HistoryEntry {
            timestamp: Utc::now(),
            filename: planned.file_name.clone(),
            source_class: task.source_class,
            size,
            destination_path: destination.clone(),
            source_name: Some(task.suggested_name.clone()),
        };
        if let Err(e) = self.history.append(entry).await {
            tracing::warn!("Failed to record history for {}: {}", planned.file_name, e);
        }

        task.placed_paths.push(destination);
        Ok(PlaceResult::Placed)
    }

    /// Sequential extract-move-delete; returns (placed, duplicates)
    async fn extract_archive(
        &self,
        task: &mut DownloadTask,
        archive: &Path,
        staging: &Path,
        hints: &PlacementHints,
    ) -> Result<(usize, usize), String> {
        let extractor = Arc::clone(&self.extractor);
        let archive_path = archive.to_path_buf();
        let mut entries: Box<dyn ArchiveEntries> = tokio::task::spawn_blocking(move || extractor.open(&archive_path))
            .await
            .map_err(|e| format!("Extractor crashed: {}", e))?
            .map_err(|e| e.to_string())?;
        tracing::info!("Extracting {} ({} entries)", archive.display(), entries.len());

        let extract_root = staging.join("extracted");
        let (mut placed, mut duplicates) = (0, 0);

        loop {
            let root = extract_root.clone();
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = entries.extract_next_entry(&root);
                (entries, result)
            })
            .await
            .map_err(|e| format!("Extractor crashed: {}", e))?;
            entries = returned;

            let entry = match result {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(ExtractionError::UnsafePath(name)) => {
                    tracing::warn!("Rejected unsafe archive entry {:?} in {}", name, archive.display());
                    task.log_warn(format!("Rejected unsafe archive entry: {}", name));
                    continue;
                }
                Err(e) => return Err(e.to_string()),
            };

            if let EntryOutcome::Extracted { name, path } = entry.outcome {
                let file_name = file_name(&path);
                let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
                if !is_subtitle(&file_name) && size < self.settings.min_extract_size {
                    tracing::debug!("Discarding small archive entry {} ({} bytes)", name, size);
                    let _ = tokio::fs::remove_file(&path).await;
                } else {
                    match self.place_file(task, &path, &file_name, hints).await? {
                        PlaceResult::Placed => placed += 1,
                        PlaceResult::Duplicate => duplicates += 1,
                    }
                }
            }
            if entry.is_last {
                break;
            }
        }

        drop(entries);
        if let Err(e) = tokio::fs::remove_file(archive).await {
            tracing::warn!("Failed to delete archive {}: {}", archive.display(), e);
        }
        Ok((placed, duplicates))
    }

    async fn set_status(&self, task: &mut DownloadTask, status: TaskStatus) {
        task.status = status;
        tracing::debug!("Task {} ({}) -> {}", task.id, task.suggested_name, status.label());
        self.queue.update(task.clone()).await;
        self.emit(ProgressEvent::Status { task_id: task.id, status });
    }

    async fn return_to_pending(&self, mut task: DownloadTask) {
        tracing::info!("Cancelled {}, returning to pending", task.suggested_name);
        task.reset_to_pending();
        task.log_warn("Cancelled".to_string());
        self.queue.update(task.clone()).await;
        self.emit(ProgressEvent::Status {
            task_id: task.id,
            status: task.status,
        });
    }

    /// Record a terminal state and persist the session
    async fn finish(&self, task: DownloadTask, ctx: &RunContext) {
        match task.status {
            TaskStatus::Failed => tracing::error!(
                "{} failed: {}",
                task.suggested_name,
                task.last_error.as_deref().unwrap_or("unknown error")
            ),
            status => tracing::info!("{} -> {}", task.suggested_name, status.label()),
        }
        let (id, status) = (task.id, task.status);
        self.queue.update(task).await;
        self.emit(ProgressEvent::Status { task_id: id, status });
        self.save_session(ctx).await;
    }

    async fn save_session(&self, ctx: &RunContext) {
        let mut snapshot = SessionSnapshot::new(SessionConfig::from_options(&ctx.options), self.queue.get_all().await);
        snapshot.started_at = ctx.started_at;
        if let Err(e) = self.session.save(&snapshot).await {
            tracing::error!("Failed to save session: {}", e);
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PARTIAL_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

/// Finished files directly inside the staging directory, sorted by name
async fn staged_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && !is_partial(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Name the finished file should end up with.
///
/// Extractor titles carry no extension: yt-dlp merges video into mkv and
/// converts subtitles to srt.
fn expected_file_name(task: &DownloadTask, mode: FetchMode) -> String {
    if task.source.fetch_policy().tool != TransferTool::YtDlp {
        return task.suggested_name.clone();
    }
    let ext = match mode {
        FetchMode::Video => "mkv",
        FetchMode::SubtitlesOnly => "srt",
    };
    format!("{}.{}", task.suggested_name, ext)
}
