//! Link resolution
//!
//! Turns raw input lines into [`ResolvedItem`]s, and later refreshes the fetch
//! URL of a task whose link has expired. Resolution only reads metadata; no
//! payload bytes are transferred here.

pub mod debrid;
pub mod error;
pub mod hosts;
pub mod source;
pub mod video;

pub use error::ResolutionError;
pub use source::{FetchPolicy, SourceKind, TransferTool};

use crate::app::settings::{Credentials, RunOptions};
use crate::download::http_client::{HttpClient, RemoteInfo};
use crate::download::task::DownloadTask;
use crate::file::naming::{filename_from_url, sanitize_filename};
use crate::util::range::PlaylistRange;
use async_trait::async_trait;
use debrid::{RealDebrid, magnet_display_name};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use video::{MediaProbe, YtDlpProbe};

/// Input lines resolved at once
const RESOLVE_CONCURRENCY: usize = 4;

/// One concrete item produced from an input line
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedItem {
    pub original_input: String,
    /// `None` when the fetch URL is obtained just before transfer (magnets)
    pub url: Option<String>,
    pub source: SourceKind,
    pub suggested_name: String,
    pub size_hint: Option<u64>,
    pub playlist_index: Option<u32>,
    pub headers: HashMap<String, String>,
    /// Set when the source reports the item as gone
    pub unavailable: Option<String>,
}

impl ResolvedItem {
    fn from_target(line: &str, source: SourceKind, target: FetchTarget, playlist_index: Option<u32>) -> Self {
        Self {
            original_input: line.to_string(),
            url: Some(target.url),
            source,
            suggested_name: target.suggested_name,
            size_hint: target.size_hint,
            playlist_index,
            headers: target.headers,
            unavailable: None,
        }
    }
}

/// A fetchable URL with what the transfer needs to use it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub url: String,
    pub suggested_name: String,
    pub size_hint: Option<u64>,
    pub headers: HashMap<String, String>,
    /// Position in the source playlist, when the target came from one
    pub playlist_index: Option<u32>,
    /// Set for a playlist entry the source reports as gone
    pub unavailable: Option<String>,
}

/// API base URLs, overridable for testing
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub gofile_api: String,
    pub pixeldrain: String,
    pub realdebrid_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gofile_api: "https://api.gofile.io".to_string(),
            pixeldrain: "https://pixeldrain.com".to_string(),
            realdebrid_api: debrid::REALDEBRID_API.to_string(),
        }
    }
}

/// Produces fresh fetch URLs for a task about to run.
///
/// More than one target means the task expanded (a magnet that turned out to
/// hold several files, or a playlist line whose first probe failed); the
/// first target belongs to the task itself.
#[async_trait]
pub trait FetchUrlProvider: Send + Sync {
    async fn fetch_targets(&self, task: &DownloadTask, options: &RunOptions) -> Result<Vec<FetchTarget>, ResolutionError>;
}

pub struct LinkResolver {
    http: HttpClient,
    no_redirect: reqwest::Client,
    endpoints: Endpoints,
    probe: Arc<dyn MediaProbe>,
    cache_timeout: Duration,
    cache_poll_interval: Duration,
    gofile_guest: OnceCell<String>,
}

impl LinkResolver {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let no_redirect = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http: HttpClient::with_user_agent(user_agent)?,
            no_redirect,
            endpoints: Endpoints::default(),
            probe: Arc::new(YtDlpProbe::default()),
            cache_timeout: Duration::from_secs(600),
            cache_poll_interval: Duration::from_secs(2),
            gofile_guest: OnceCell::new(),
        })
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Deadline and poll interval for the magnet cache wait
    pub fn with_cache_timing(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.cache_timeout = timeout;
        self.cache_poll_interval = poll_interval;
        self
    }

    fn client(&self) -> &reqwest::Client {
        self.http.inner()
    }

    fn realdebrid_token(credentials: &Credentials) -> Result<&str, ResolutionError> {
        credentials
            .realdebrid
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ResolutionError::AuthRequired("a Real-Debrid token is required".to_string()))
    }

    /// Configured Gofile token, else a guest token created once per resolver
    async fn gofile_token(&self, credentials: &Credentials) -> Result<String, ResolutionError> {
        if let Some(token) = credentials.gofile.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }
        self.gofile_guest
            .get_or_try_init(|| hosts::gofile_guest_token(self.client(), &self.endpoints.gofile_api))
            .await
            .cloned()
    }

    /// Direct URL: best-effort HEAD for the name and size
    async fn direct(&self, url: &str) -> Result<Vec<FetchTarget>, ResolutionError> {
        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(ResolutionError::Unsupported(format!("not a URL: {}", url))),
        }

        let info = match self.http.probe(url, &HashMap::new()).await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("HEAD probe failed for {}: {}", url, e);
                RemoteInfo::default()
            }
        };
        let name = info
            .filename
            .or_else(|| filename_from_url(url))
            .map(|n| sanitize_filename(&n))
            .unwrap_or_else(|| "download".to_string());

        Ok(vec![FetchTarget {
            url: url.to_string(),
            suggested_name: name,
            size_hint: info.size,
            headers: HashMap::new(),
            playlist_index: None,
            unavailable: None,
        }])
    }

    /// Fetch targets for a source whose URL has to be looked up
    async fn targets(&self, kind: SourceKind, input: &str, options: &RunOptions) -> Result<Vec<FetchTarget>, ResolutionError> {
        let client = self.client();
        match kind {
            SourceKind::Direct => self.direct(input).await,
            SourceKind::Gofile => {
                let token = self.gofile_token(&options.credentials).await?;
                hosts::resolve_gofile(client, &self.endpoints.gofile_api, input, &token).await
            }
            SourceKind::Pixeldrain => hosts::resolve_pixeldrain(client, &self.endpoints.pixeldrain, input).await,
            SourceKind::MediaFire => hosts::resolve_mediafire(client, input).await,
            SourceKind::OneFichier => hosts::resolve_onefichier(client, &self.no_redirect, input).await,
            SourceKind::RealDebrid => {
                let token = Self::realdebrid_token(&options.credentials)?;
                let rd = RealDebrid::new(client, &self.endpoints.realdebrid_api, token);
                Ok(vec![rd.unrestrict(input).await?])
            }
            SourceKind::Magnet => {
                let token = Self::realdebrid_token(&options.credentials)?;
                RealDebrid::new(client, &self.endpoints.realdebrid_api, token)
                    .resolve_magnet(input, self.cache_timeout, self.cache_poll_interval)
                    .await
            }
            SourceKind::Mega | SourceKind::Video => Ok(vec![FetchTarget {
                url: input.to_string(),
                suggested_name: fallback_name(input),
                size_hint: None,
                headers: HashMap::new(),
                playlist_index: None,
                unavailable: None,
            }]),
        }
    }

    /// Resolve one input line into zero or more items.
    ///
    /// Blank lines and `#` comments yield nothing. Magnets are not submitted
    /// here; their single deferred item is expanded when it runs.
    pub async fn resolve(&self, line: &str, options: &RunOptions) -> Result<Vec<ResolvedItem>, ResolutionError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Vec::new());
        }

        let kind = SourceKind::detect(line, &options.credentials);
        tracing::debug!("Resolving {} as {}", line, kind.label());

        match kind {
            SourceKind::Video => {
                let info = self.probe.probe(line).await?;
                Ok(video::expand(line, info, &options.playlist_range))
            }
            SourceKind::Magnet => {
                Self::realdebrid_token(&options.credentials)?;
                Ok(vec![ResolvedItem {
                    original_input: line.to_string(),
                    url: None,
                    source: kind,
                    suggested_name: fallback_name(line),
                    size_hint: None,
                    playlist_index: None,
                    headers: HashMap::new(),
                    unavailable: None,
                }])
            }
            _ => {
                let targets = self.targets(kind, line, options).await?;
                let expanded = targets.len() > 1;
                Ok(targets
                    .into_iter()
                    .enumerate()
                    .map(|(i, t)| ResolvedItem::from_target(line, kind, t, expanded.then_some(i as u32 + 1)))
                    .collect())
            }
        }
    }

    /// Resolve every line into tasks, in input order.
    ///
    /// A line that fails to resolve still becomes one failed task carrying
    /// the reason, so it is counted and can be retried on resume.
    pub async fn resolve_all(&self, lines: &[String], options: &RunOptions) -> Vec<DownloadTask> {
        let results: Vec<(String, Result<Vec<ResolvedItem>, ResolutionError>)> = futures_util::stream::iter(
            lines
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(|line| async move { (line.to_string(), self.resolve(line, options).await) }),
        )
        .buffered(RESOLVE_CONCURRENCY)
        .collect()
        .await;

        let mut tasks = Vec::new();
        for (line, result) in results {
            match result {
                Ok(items) => {
                    tracing::info!("Resolved {} into {} item(s)", line, items.len());
                    tasks.extend(items.into_iter().map(DownloadTask::from_resolved));
                }
                Err(e) => {
                    tracing::error!("Failed to resolve {}: {}", line, e);
                    let source = SourceKind::detect(&line, &options.credentials);
                    let mut task = DownloadTask::new(line.clone(), source, fallback_name(&line));
                    task.needs_refresh = true;
                    task.unavailable = matches!(e, ResolutionError::NotFound(_));
                    task.fail(e.to_string());
                    tasks.push(task);
                }
            }
        }
        tasks
    }
}

#[async_trait]
impl FetchUrlProvider for LinkResolver {
    async fn fetch_targets(&self, task: &DownloadTask, options: &RunOptions) -> Result<Vec<FetchTarget>, ResolutionError> {
        let current = |url: &str| FetchTarget {
            url: url.to_string(),
            suggested_name: task.suggested_name.clone(),
            size_hint: task.size_hint,
            headers: task.headers.clone(),
            playlist_index: None,
            unavailable: None,
        };

        let policy = task.source.fetch_policy();
        if !policy.url_expires && !task.needs_refresh {
            if let Some(url) = task.resolved_url.as_deref() {
                return Ok(vec![current(url)]);
            }
        }

        if task.source == SourceKind::Video {
            if let Some(url) = task.resolved_url.as_deref() {
                return Ok(vec![current(url)]);
            }
            let info = self.probe.probe(&task.original_input).await?;
            if task.playlist_index.is_none() {
                // The line never expanded (its first probe failed); expand it now
                return playlist_targets(video::expand(&task.original_input, info, &options.playlist_range));
            }
            let items = video::expand(&task.original_input, info, &PlaylistRange::all());
            let item = items
                .into_iter()
                .find(|i| i.playlist_index == task.playlist_index)
                .ok_or_else(|| ResolutionError::NotFound(format!("{} is gone from the playlist", task.suggested_name)))?;
            if let Some(reason) = item.unavailable {
                return Err(ResolutionError::NotFound(reason));
            }
            return Ok(item.url.map(|u| current(&u)).into_iter().collect());
        }

        tracing::debug!("Refreshing link for {}", task.suggested_name);
        let mut targets = self.targets(task.source, &task.original_input, options).await?;

        // A folder or torrent lists siblings too; keep the one this task is
        if targets.len() > 1 {
            if let Some(pos) = targets.iter().position(|t| t.suggested_name == task.suggested_name) {
                return Ok(vec![targets.swap_remove(pos)]);
            }
        }
        Ok(targets)
    }
}

/// Targets for a freshly expanded playlist, fetchable entries first
fn playlist_targets(items: Vec<ResolvedItem>) -> Result<Vec<FetchTarget>, ResolutionError> {
    let (available, gone): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|i| i.unavailable.is_none() && i.url.is_some());
    if available.is_empty() {
        let reason = gone
            .into_iter()
            .find_map(|i| i.unavailable)
            .unwrap_or_else(|| "no playlist items in range".to_string());
        return Err(ResolutionError::NotFound(reason));
    }

    Ok(available
        .into_iter()
        .chain(gone)
        .map(|item| FetchTarget {
            url: item.url.unwrap_or_else(|| item.original_input.clone()),
            suggested_name: item.suggested_name,
            size_hint: item.size_hint,
            headers: item.headers,
            playlist_index: item.playlist_index,
            unavailable: item.unavailable,
        })
        .collect())
}

/// Readable name for an input line before anything is known about it
pub fn fallback_name(line: &str) -> String {
    if line.starts_with("magnet:") {
        return magnet_display_name(line).unwrap_or_else(|| "magnet".to_string());
    }
    filename_from_url(line)
        .map(|n| sanitize_filename(&n))
        .unwrap_or_else(|| sanitize_filename(line))
}
