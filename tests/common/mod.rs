#![allow(dead_code)]

use async_trait::async_trait;
use reelhaul::app::settings::RunOptions;
use reelhaul::download::error::TransferError;
use reelhaul::download::history::HistoryLog;
use reelhaul::download::queue::TaskQueue;
use reelhaul::download::retry::RetryPolicy;
use reelhaul::download::scheduler::{Scheduler, SchedulerSettings};
use reelhaul::download::session::SessionStore;
use reelhaul::download::task::DownloadTask;
use reelhaul::download::transfer::{ProgressCallback, Transfer, TransferRequest};
use reelhaul::file::placement::Library;
use reelhaul::resolve::{FetchTarget, FetchUrlProvider, ResolutionError, SourceKind};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// One call made to the scripted transfer
#[derive(Debug, Clone)]
pub struct TransferCall {
    pub url: String,
    pub started: Instant,
    pub finished: Instant,
}

/// What a scripted fetch does
#[derive(Debug, Clone)]
pub enum Step {
    /// Write these bytes to the destination
    Write(Vec<u8>),
    Fail(TransferError),
    /// Succeed without writing anything
    Nothing,
}

/// Transfer that follows a per-URL script and records every call.
///
/// URLs without a script (or with an exhausted one) get 64 bytes written.
#[derive(Default)]
pub struct ScriptedTransfer {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<TransferCall>>,
    delay: Duration,
}

impl ScriptedTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn script(&self, url: &str, steps: Vec<Step>) {
        self.scripts.lock().unwrap().insert(url.to_string(), steps.into());
    }

    pub fn fail_always(&self, url: &str, error: TransferError) {
        self.script(url, vec![Step::Fail(error); 10]);
    }

    pub fn calls(&self) -> Vec<TransferCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.url == url).count()
    }
}

#[async_trait]
impl Transfer for ScriptedTransfer {
    async fn fetch(&self, request: &TransferRequest, progress: ProgressCallback) -> Result<u64, TransferError> {
        let started = Instant::now();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Write(vec![7u8; 64]));

        let result = match step {
            Step::Write(bytes) => {
                tokio::fs::create_dir_all(request.dest_dir()).await.unwrap();
                tokio::fs::write(&request.dest_path, &bytes).await.unwrap();
                progress(bytes.len() as u64, Some(bytes.len() as u64));
                Ok(bytes.len() as u64)
            }
            Step::Fail(error) => Err(error),
            Step::Nothing => Ok(0),
        };

        self.calls.lock().unwrap().push(TransferCall {
            url: request.url.clone(),
            started,
            finished: Instant::now(),
        });
        result
    }
}

/// Echoes the task input as its fetch URL unless an expansion is registered
#[derive(Default)]
pub struct FakeUrls {
    expansions: Mutex<HashMap<String, Vec<FetchTarget>>>,
    failures: Mutex<HashMap<String, ResolutionError>>,
}

impl FakeUrls {
    pub fn expand(&self, input: &str, names: &[&str]) {
        let targets = names
            .iter()
            .map(|name| FetchTarget {
                url: format!("{}/{}", input, name),
                suggested_name: name.to_string(),
                size_hint: None,
                headers: HashMap::new(),
                playlist_index: None,
                unavailable: None,
            })
            .collect();
        self.expansions.lock().unwrap().insert(input.to_string(), targets);
    }

    /// Register playlist entries as `(index, name, unavailable reason)`
    pub fn expand_playlist(&self, input: &str, entries: &[(u32, &str, Option<&str>)]) {
        let targets = entries
            .iter()
            .map(|(index, name, gone)| FetchTarget {
                url: format!("{}&index={}", input, index),
                suggested_name: name.to_string(),
                size_hint: None,
                headers: HashMap::new(),
                playlist_index: Some(*index),
                unavailable: gone.map(str::to_string),
            })
            .collect();
        self.expansions.lock().unwrap().insert(input.to_string(), targets);
    }

    pub fn fail(&self, input: &str, error: ResolutionError) {
        self.failures.lock().unwrap().insert(input.to_string(), error);
    }
}

#[async_trait]
impl FetchUrlProvider for FakeUrls {
    async fn fetch_targets(&self, task: &DownloadTask, _options: &RunOptions) -> Result<Vec<FetchTarget>, ResolutionError> {
        if let Some(error) = self.failures.lock().unwrap().get(&task.original_input) {
            return Err(error.clone());
        }
        if let Some(targets) = self.expansions.lock().unwrap().get(&task.original_input) {
            return Ok(targets.clone());
        }
        Ok(vec![FetchTarget {
            url: task.original_input.clone(),
            suggested_name: task.suggested_name.clone(),
            size_hint: task.size_hint,
            headers: HashMap::new(),
            playlist_index: None,
            unavailable: None,
        }])
    }
}

/// Temp directories and persisted state for one scheduler
pub struct TestEnv {
    pub dir: TempDir,
    pub library_root: PathBuf,
    pub history: Arc<HistoryLog>,
    pub session: Arc<SessionStore>,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let library_root = dir.path().join("library");
        std::fs::create_dir_all(&library_root).unwrap();
        let history = Arc::new(HistoryLog::open(dir.path().join("history.json")));
        let session = Arc::new(SessionStore::new(dir.path().join("session.json")));
        Self {
            dir,
            library_root,
            history,
            session,
        }
    }

    pub fn library(&self) -> Library {
        Library::open(&self.library_root).unwrap()
    }

    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            retry: RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(20)),
            serial_cooldown: Duration::from_millis(30),
            staging_dir: self.dir.path().join("staging"),
            min_extract_size: 16,
            download_archive: None,
        }
    }

    pub fn scheduler(
        &self,
        tasks: Vec<DownloadTask>,
        transfer: Arc<ScriptedTransfer>,
        urls: Arc<FakeUrls>,
    ) -> Scheduler {
        Scheduler::new(
            TaskQueue::from_tasks(tasks),
            transfer,
            urls,
            self.library(),
            Arc::clone(&self.history),
            Arc::clone(&self.session),
            self.settings(),
        )
    }
}

pub fn direct_task(name: &str) -> DownloadTask {
    DownloadTask::new(format!("https://files.example/{}", name), SourceKind::Direct, name)
}

pub fn serial_task(name: &str) -> DownloadTask {
    DownloadTask::new(format!("https://1fichier.com/?{}", name), SourceKind::OneFichier, name)
}

pub fn episode_names(show: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{}.S01E{:02}.mkv", show, i)).collect()
}

/// Zip archive bytes with the given entries
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}
