//! Real-Debrid: link unrestricting and the magnet cache-then-fetch flow
//!
//! A magnet goes through two states before it is fetchable:
//!
//! ```text
//! submitted --(torrent status "downloaded")--> cached --(unrestrict links)--> targets
//! ```
//!
//! The submitted state is polled until a deadline. Running out of time is a
//! [`ResolutionError::CacheTimeout`] for this magnet only.

use super::FetchTarget;
use super::error::ResolutionError;
use super::hosts::{check_status, form_body};
use crate::file::naming::sanitize_filename;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const REALDEBRID_API: &str = "https://api.real-debrid.com/rest/1.0";

// Torrent states that will never reach "downloaded"
const DEAD_STATES: &[&str] = &["magnet_error", "error", "virus", "dead"];

#[derive(Debug, Deserialize)]
struct UnrestrictedLink {
    download: String,
    filename: String,
    #[serde(default)]
    filesize: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AddedMagnet {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    status: String,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    progress: f64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

/// Where a magnet stands in the cache sub-machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagnetState {
    Submitted { torrent_id: String },
    Cached { links: Vec<String> },
}

/// Authenticated Real-Debrid API client
pub struct RealDebrid<'a> {
    client: &'a reqwest::Client,
    api: &'a str,
    token: &'a str,
}

impl<'a> RealDebrid<'a> {
    pub fn new(client: &'a reqwest::Client, api: &'a str, token: &'a str) -> Self {
        Self { client, api, token }
    }

    async fn post_form(&self, endpoint: &str, fields: &[(&str, &str)]) -> Result<reqwest::Response, ResolutionError> {
        let response = self
            .client
            .post(format!("{}/{}", self.api, endpoint))
            .bearer_auth(self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_body(fields))
            .send()
            .await?;
        Self::check(response, endpoint).await
    }

    /// Map API failures, preferring the `error` field of the body
    async fn check(response: reqwest::Response, endpoint: &str) -> Result<reqwest::Response, ResolutionError> {
        if check_status(&response, endpoint).is_ok() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = match response.json::<ApiError>().await {
            Ok(body) => format!("real-debrid {}: {}", endpoint, body.error),
            Err(_) => format!("real-debrid {}", endpoint),
        };
        Err(match status {
            401 | 403 => ResolutionError::AuthRequired(detail),
            429 => ResolutionError::RateLimited(detail),
            500..=599 => ResolutionError::Network(detail),
            _ => ResolutionError::NotFound(detail),
        })
    }

    /// Turn a hoster link into a direct, short-lived download link
    pub async fn unrestrict(&self, link: &str) -> Result<FetchTarget, ResolutionError> {
        let response = self.post_form("unrestrict/link", &[("link", link)]).await?;
        let body: UnrestrictedLink = response
            .json()
            .await
            .map_err(|e| ResolutionError::Network(format!("real-debrid unrestrict: {}", e)))?;
        Ok(FetchTarget {
            url: body.download,
            suggested_name: sanitize_filename(&body.filename),
            size_hint: body.filesize,
            headers: HashMap::new(),
            playlist_index: None,
            unavailable: None,
        })
    }

    async fn submit(&self, magnet: &str) -> Result<String, ResolutionError> {
        let response = self.post_form("torrents/addMagnet", &[("magnet", magnet)]).await?;
        let added: AddedMagnet = response
            .json()
            .await
            .map_err(|e| ResolutionError::Network(format!("real-debrid addMagnet: {}", e)))?;
        self.select_all(&added.id).await?;
        tracing::debug!("Magnet submitted as torrent {}", added.id);
        Ok(added.id)
    }

    async fn select_all(&self, torrent_id: &str) -> Result<(), ResolutionError> {
        self.post_form(&format!("torrents/selectFiles/{}", torrent_id), &[("files", "all")])
            .await
            .map(|_| ())
    }

    async fn info(&self, torrent_id: &str) -> Result<TorrentInfo, ResolutionError> {
        let endpoint = format!("torrents/info/{}", torrent_id);
        let response = self
            .client
            .get(format!("{}/{}", self.api, endpoint))
            .bearer_auth(self.token)
            .send()
            .await?;
        let response = Self::check(response, &endpoint).await?;
        response
            .json()
            .await
            .map_err(|e| ResolutionError::Network(format!("real-debrid torrent info: {}", e)))
    }

    /// Advance a submitted torrent by one poll
    async fn poll(&self, torrent_id: String) -> Result<MagnetState, ResolutionError> {
        let info = self.info(&torrent_id).await?;
        match info.status.as_str() {
            "downloaded" => Ok(MagnetState::Cached { links: info.links }),
            status if DEAD_STATES.contains(&status) => Err(ResolutionError::NotFound(format!(
                "real-debrid torrent {}: {}",
                torrent_id, status
            ))),
            "waiting_files_selection" => {
                self.select_all(&torrent_id).await?;
                Ok(MagnetState::Submitted { torrent_id })
            }
            status => {
                tracing::trace!("Torrent {} is {} ({:.0}%)", torrent_id, status, info.progress);
                Ok(MagnetState::Submitted { torrent_id })
            }
        }
    }

    /// Submit a magnet, wait for it to be cached, then unrestrict every link
    pub async fn resolve_magnet(
        &self,
        magnet: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<FetchTarget>, ResolutionError> {
        let deadline = Instant::now() + timeout;
        let mut state = MagnetState::Submitted {
            torrent_id: self.submit(magnet).await?,
        };

        loop {
            state = match state {
                MagnetState::Submitted { torrent_id } => {
                    let next = self.poll(torrent_id.clone()).await?;
                    if matches!(next, MagnetState::Submitted { .. }) {
                        if Instant::now() + poll_interval > deadline {
                            return Err(ResolutionError::CacheTimeout {
                                secs: timeout.as_secs(),
                                detail: format!("torrent {}", torrent_id),
                            });
                        }
                        tokio::time::sleep(poll_interval).await;
                    }
                    next
                }
                MagnetState::Cached { links } => {
                    if links.is_empty() {
                        return Err(ResolutionError::NotFound("real-debrid: cached torrent has no links".to_string()));
                    }
                    let mut targets = Vec::with_capacity(links.len());
                    for link in &links {
                        targets.push(self.unrestrict(link).await?);
                    }
                    tracing::info!("Magnet cached with {} files", targets.len());
                    return Ok(targets);
                }
            };
        }
    }
}

/// Display name carried in a magnet's `dn` parameter
pub fn magnet_display_name(magnet: &str) -> Option<String> {
    let parsed = url::Url::parse(magnet).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "dn")
        .map(|(_, v)| sanitize_filename(&v))
        .filter(|v| !v.is_empty())
}
