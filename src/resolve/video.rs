//! Streaming-video sources
//!
//! Metadata comes from an injected [`MediaProbe`]. A playlist expands to one
//! item per entry, numbered from 1 in playlist order. Entries the site
//! reports as gone are kept as pre-failed items so the counts stay honest.

use super::ResolvedItem;
use super::error::ResolutionError;
use super::source::SourceKind;
use crate::file::naming::sanitize_filename;
use crate::util::range::PlaylistRange;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Stdio;

const UNAVAILABLE_TITLES: &[&str] = &["[Private video]", "[Deleted video]", "[Unavailable video]"];
const UNAVAILABLE_STATES: &[&str] = &["private", "needs_auth", "subscriber_only", "premium_only"];

/// Flat metadata for a video or playlist
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
    /// Present for playlists; `null` entries are unavailable items
    #[serde(default)]
    pub entries: Option<Vec<Option<ProbeInfo>>>,
}

impl ProbeInfo {
    fn unavailable_reason(&self) -> Option<String> {
        if let Some(title) = self.title.as_deref() {
            if UNAVAILABLE_TITLES.contains(&title) {
                return Some(title.trim_matches(|c| c == '[' || c == ']').to_string());
            }
        }
        self.availability
            .as_deref()
            .filter(|a| UNAVAILABLE_STATES.contains(a))
            .map(|a| format!("Unavailable ({})", a))
    }

    /// Page URL of a flat entry
    fn entry_url(&self, playlist_url: &str) -> Option<String> {
        let candidate = self.webpage_url.as_ref().or(self.url.as_ref());
        if let Some(url) = candidate.filter(|u| u.starts_with("http")) {
            return Some(url.clone());
        }
        // YouTube flat entries sometimes carry only the video id
        let id = self.id.as_ref().or(candidate)?;
        let lower = playlist_url.to_lowercase();
        if lower.contains("youtube.com") || lower.contains("youtu.be") {
            Some(format!("https://www.youtube.com/watch?v={}", id))
        } else {
            None
        }
    }
}

/// Reads video/playlist metadata without downloading media
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<ProbeInfo, ResolutionError>;
}

/// `yt-dlp --flat-playlist -J`
#[derive(Debug, Clone)]
pub struct YtDlpProbe {
    program: String,
}

impl Default for YtDlpProbe {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
        }
    }
}

impl YtDlpProbe {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl MediaProbe for YtDlpProbe {
    async fn probe(&self, url: &str) -> Result<ProbeInfo, ResolutionError> {
        tracing::debug!("Probing {} with {}", url, self.program);
        let output = tokio::process::Command::new(&self.program)
            .args(["--flat-playlist", "-J", "--no-warnings", url])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ResolutionError::Unsupported(format!("{} is not installed", self.program))
                }
                _ => ResolutionError::Network(format!("{}: {}", self.program, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(probe_failure(&stderr));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolutionError::Network(format!("unreadable {} output: {}", self.program, e)))
    }
}

fn probe_failure(stderr: &str) -> ResolutionError {
    let lower = stderr.to_lowercase();
    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("probe failed")
        .trim()
        .to_string();
    if lower.contains("429") || lower.contains("too many requests") {
        ResolutionError::RateLimited(message)
    } else if lower.contains("sign in") || lower.contains("members-only") || lower.contains("login") {
        ResolutionError::AuthRequired(message)
    } else if lower.contains("unavailable") || lower.contains("private") || lower.contains("404") {
        ResolutionError::NotFound(message)
    } else if lower.contains("unsupported url") {
        ResolutionError::Unsupported(message)
    } else {
        ResolutionError::Network(message)
    }
}

/// Expand probe output into items, keeping only indices inside `range`
pub fn expand(line: &str, info: ProbeInfo, range: &PlaylistRange) -> Vec<ResolvedItem> {
    let item = |url: Option<String>, name: String, index: Option<u32>, size: Option<u64>, unavailable| ResolvedItem {
        original_input: line.to_string(),
        url,
        source: SourceKind::Video,
        suggested_name: name,
        size_hint: size,
        playlist_index: index,
        headers: HashMap::new(),
        unavailable,
    };

    let Some(entries) = info.entries else {
        let name = info.title.as_deref().map(sanitize_filename).unwrap_or_else(|| "video".to_string());
        let reason = info.unavailable_reason();
        return vec![item(Some(line.to_string()), name, None, info.filesize_approx, reason)];
    };

    let mut items = Vec::new();
    let mut unavailable = 0;
    for (i, entry) in entries.into_iter().enumerate() {
        let index = i as u32 + 1;
        if !range.contains(index) {
            continue;
        }

        let resolved = match entry {
            None => item(None, format!("Item {}", index), Some(index), None, Some("Unavailable".to_string())),
            Some(entry) => {
                let name = entry
                    .title
                    .as_deref()
                    .map(sanitize_filename)
                    .unwrap_or_else(|| format!("Item {}", index));
                let url = entry.entry_url(line);
                let reason = entry
                    .unavailable_reason()
                    .or_else(|| url.is_none().then(|| "No page URL".to_string()));
                item(url, name, Some(index), entry.filesize_approx, reason)
            }
        };
        if resolved.unavailable.is_some() {
            unavailable += 1;
        }
        items.push(resolved);
    }

    if unavailable > 0 {
        tracing::warn!("{} of {} playlist items unavailable", unavailable, items.len());
    }
    items
}
