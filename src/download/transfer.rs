//! Transfer capability
//!
//! The scheduler only knows "fetch this URL into this staging location with a
//! progress callback". [`TransferRouter`] picks the mechanism per request:
//! streamed HTTP for file hosts, `yt-dlp` for streaming sites and `megadl`
//! for Mega.

use super::error::TransferError;
use super::http_client::HttpClient;
use crate::app::settings::FetchMode;
use crate::resolve::source::TransferTool;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

/// Progress callback: (bytes so far, total if known)
pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// One transfer to perform
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: String,
    /// Target file for HTTP; external tools write next to it using their own names
    pub dest_path: PathBuf,
    pub headers: HashMap<String, String>,
    pub tool: TransferTool,
    pub mode: FetchMode,
    pub subtitle_languages: Vec<String>,
    /// yt-dlp download archive used for cross-run dedup
    pub download_archive: Option<PathBuf>,
}

impl TransferRequest {
    pub fn dest_dir(&self) -> &Path {
        self.dest_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Moves payload bytes for one request
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Returns the number of bytes written.
    async fn fetch(&self, request: &TransferRequest, progress: ProgressCallback) -> Result<u64, TransferError>;
}

// `download:<downloaded> <total> <estimate>` from our progress template
static YTDLP_PROGRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^download:\s*(\d+)\s+(\S+)\s+(\S+)").expect("Invalid regex pattern")
});

// megadl: `name: 45.12% - 123.4 MiB (129394483 bytes) of 273.5 MiB`
static PERCENT_PROGRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("Invalid regex pattern"));

static BYTES_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d+) bytes\).*of\s+([\d.]+)\s*(KiB|MiB|GiB|B)").expect("Invalid regex pattern")
});

/// Parse a yt-dlp progress line into (downloaded, total)
fn parse_ytdlp_progress(line: &str) -> Option<(u64, Option<u64>)> {
    let caps = YTDLP_PROGRESS.captures(line.trim())?;
    let downloaded = caps[1].parse().ok()?;
    let total = caps[2]
        .parse::<f64>()
        .ok()
        .or_else(|| caps[3].parse::<f64>().ok())
        .map(|t| t as u64);
    Some((downloaded, total))
}

/// Parse a megadl progress line into (downloaded, total)
fn parse_megadl_progress(line: &str) -> Option<(u64, Option<u64>)> {
    if let Some(caps) = BYTES_OF.captures(line) {
        let downloaded = caps[1].parse().ok()?;
        let amount: f64 = caps[2].parse().ok()?;
        let unit = match &caps[3] {
            "KiB" => 1024.0,
            "MiB" => 1024.0 * 1024.0,
            "GiB" => 1024.0 * 1024.0 * 1024.0,
            _ => 1.0,
        };
        return Some((downloaded, Some((amount * unit) as u64)));
    }
    let pct: f64 = PERCENT_PROGRESS.captures(line)?[1].parse().ok()?;
    Some(((pct * 100.0) as u64, Some(10_000)))
}

/// Map an extractor's stderr to a failure kind
pub fn classify_tool_failure(stderr: &str) -> TransferError {
    let lower = stderr.to_lowercase();
    let message = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("tool failed").trim().to_string();

    if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate-limit") {
        TransferError::RateLimited(message)
    } else if lower.contains("private video")
        || lower.contains("video unavailable")
        || lower.contains("not available")
        || lower.contains("sign in")
        || lower.contains("members-only")
        || lower.contains("404")
        || lower.contains("unsupported url")
        || lower.contains("invalid url")
    {
        TransferError::Permanent(message)
    } else {
        TransferError::Transient(message)
    }
}

/// External command-line downloaders
#[derive(Debug, Clone)]
pub struct ToolTransfer {
    ytdlp: String,
    megadl: String,
}

impl Default for ToolTransfer {
    fn default() -> Self {
        Self {
            ytdlp: "yt-dlp".to_string(),
            megadl: "megadl".to_string(),
        }
    }
}

impl ToolTransfer {
    pub fn new(ytdlp: impl Into<String>, megadl: impl Into<String>) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            megadl: megadl.into(),
        }
    }

    fn ytdlp_args(request: &TransferRequest) -> Vec<String> {
        let out_dir = request.dest_dir();
        let template = out_dir.join("%(title).200s.%(ext)s").to_string_lossy().to_string();
        let languages = if request.subtitle_languages.is_empty() {
            "en".to_string()
        } else {
            request.subtitle_languages.join(",")
        };

        let mut args = vec![
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--progress-template".to_string(),
            "download:%(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s"
                .to_string(),
            "-o".to_string(),
            template,
            "--write-subs".to_string(),
            "--write-auto-subs".to_string(),
            "--sub-langs".to_string(),
            languages,
            "--convert-subs".to_string(),
            "srt".to_string(),
        ];

        match request.mode {
            FetchMode::Video => {
                args.extend(["-f".to_string(), "bv*+ba/b".to_string()]);
                args.extend(["--merge-output-format".to_string(), "mkv".to_string()]);
            }
            FetchMode::SubtitlesOnly => args.push("--skip-download".to_string()),
        }

        if let Some(archive) = &request.download_archive {
            args.push("--download-archive".to_string());
            args.push(archive.to_string_lossy().to_string());
        }

        args.push(request.url.clone());
        args
    }

    fn megadl_args(request: &TransferRequest) -> Vec<String> {
        vec![
            "--path".to_string(),
            request.dest_dir().to_string_lossy().to_string(),
            request.url.clone(),
        ]
    }

    async fn run(
        &self,
        program: &str,
        args: Vec<String>,
        request: &TransferRequest,
        parse: fn(&str) -> Option<(u64, Option<u64>)>,
        progress: ProgressCallback,
    ) -> Result<u64, TransferError> {
        tokio::fs::create_dir_all(request.dest_dir()).await?;
        tracing::debug!("Running {} {:?}", program, args);

        let mut child = tokio::process::Command::new(program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransferError::Permanent(format!("Failed to start {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransferError::Transient(format!("{} has no stdout", program)))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransferError::Transient(format!("{} has no stderr", program)))?;

        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut last = 0u64;
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some((done, total)) = parse(&line) {
                last = done;
                progress(done, total);
            } else {
                tracing::trace!("{}: {}", program, line);
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            tracing::debug!("{} exited with {}: {}", program, status, stderr.trim());
            return Err(classify_tool_failure(&stderr));
        }
        Ok(last)
    }
}

#[async_trait]
impl Transfer for ToolTransfer {
    async fn fetch(&self, request: &TransferRequest, progress: ProgressCallback) -> Result<u64, TransferError> {
        match request.tool {
            TransferTool::YtDlp => {
                let args = Self::ytdlp_args(request);
                self.run(&self.ytdlp, args, request, parse_ytdlp_progress, progress).await
            }
            TransferTool::Megadl => {
                let args = Self::megadl_args(request);
                self.run(&self.megadl, args, request, parse_megadl_progress, progress).await
            }
            TransferTool::Http => Err(TransferError::Permanent(
                "HTTP requests are not handled by external tools".to_string(),
            )),
        }
    }
}

/// Dispatches each request to the matching mechanism
pub struct TransferRouter {
    http: HttpClient,
    tools: ToolTransfer,
}

impl TransferRouter {
    pub fn new(http: HttpClient, tools: ToolTransfer) -> Self {
        Self { http, tools }
    }
}

#[async_trait]
impl Transfer for TransferRouter {
    async fn fetch(&self, request: &TransferRequest, progress: ProgressCallback) -> Result<u64, TransferError> {
        match request.tool {
            TransferTool::Http => self.http.fetch(request, progress).await,
            TransferTool::YtDlp | TransferTool::Megadl => self.tools.fetch(request, progress).await,
        }
    }
}
