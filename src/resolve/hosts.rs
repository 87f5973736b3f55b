//! File-host resolvers: Gofile, Pixeldrain, MediaFire and 1fichier

use super::FetchTarget;
use super::error::ResolutionError;
use crate::file::naming::{filename_from_url, sanitize_filename};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Website token the Gofile web client sends with content lookups
pub const GOFILE_WEBSITE_TOKEN: &str = "4fd6sg89d7s6";

static GOFILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"gofile\.io/d/([a-zA-Z0-9]+)").expect("Invalid regex pattern"));

static PIXELDRAIN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pixeldrain\.com/u/([a-zA-Z0-9]+)").expect("Invalid regex pattern"));

static MEDIAFIRE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(https://download\d*\.mediafire\.com/[^"]+)""#).expect("Invalid regex pattern")
});

static MEDIAFIRE_BUTTON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"aria-label="Download file"\s+href="([^"]+)""#).expect("Invalid regex pattern")
});

static HTML_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<title>([^<]+)</title>").expect("Invalid regex pattern"));

static TITLE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^.*?:\s*").expect("Invalid regex pattern"));

static ONEFICHIER_CLICK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href="(https://[^"]*1fichier[^"]*)"[^>]*>Click here"#).expect("Invalid regex pattern")
});

/// `application/x-www-form-urlencoded` body
pub(crate) fn form_body(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Fail on non-success statuses, naming the host in the message
pub(crate) fn check_status(response: &reqwest::Response, context: &str) -> Result<(), ResolutionError> {
    let status = response.status();
    if status.is_success() || status.is_redirection() {
        Ok(())
    } else {
        Err(ResolutionError::from_status(status.as_u16(), context))
    }
}

// ---- Gofile ----

#[derive(Debug, Deserialize)]
struct GofileResponse<T> {
    status: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct GofileAccount {
    token: String,
}

#[derive(Debug, Deserialize)]
struct GofileContents {
    #[serde(default)]
    children: HashMap<String, GofileChild>,
}

#[derive(Debug, Deserialize)]
struct GofileChild {
    name: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

fn gofile_status_error(status: &str, id: &str) -> ResolutionError {
    let detail = format!("gofile {}: {}", id, status);
    match status {
        "error-notFound" => ResolutionError::NotFound(detail),
        "error-passwordRequired" | "error-notPremium" | "error-auth" => ResolutionError::AuthRequired(detail),
        "error-rateLimit" => ResolutionError::RateLimited(detail),
        _ => ResolutionError::Network(detail),
    }
}

/// Create a guest account and return its token
pub async fn gofile_guest_token(client: &reqwest::Client, api: &str) -> Result<String, ResolutionError> {
    let response = client.post(format!("{}/accounts", api)).json(&serde_json::json!({})).send().await?;
    check_status(&response, "gofile account")?;

    let body: GofileResponse<GofileAccount> = response
        .json()
        .await
        .map_err(|e| ResolutionError::Network(format!("gofile account: {}", e)))?;
    match body.data {
        Some(account) if body.status == "ok" => {
            tracing::debug!("Created Gofile guest account");
            Ok(account.token)
        }
        _ => Err(gofile_status_error(&body.status, "accounts")),
    }
}

/// List a Gofile folder. Every child file becomes one target, sorted by name.
pub async fn resolve_gofile(
    client: &reqwest::Client,
    api: &str,
    url: &str,
    token: &str,
) -> Result<Vec<FetchTarget>, ResolutionError> {
    let id = GOFILE_ID
        .captures(url)
        .map(|c| c[1].to_string())
        .ok_or_else(|| ResolutionError::Unsupported(format!("not a Gofile folder link: {}", url)))?;

    let response = client
        .get(format!("{}/contents/{}?wt={}", api, id, GOFILE_WEBSITE_TOKEN))
        .bearer_auth(token)
        .send()
        .await?;
    let http_status = response.status();

    // Gofile reports most failures in the body, sometimes with a 4xx status
    let body: GofileResponse<GofileContents> = match response.json().await {
        Ok(body) => body,
        Err(_) if !http_status.is_success() => {
            return Err(ResolutionError::from_status(http_status.as_u16(), "gofile contents"));
        }
        Err(e) => return Err(ResolutionError::Network(format!("gofile contents: {}", e))),
    };
    if body.status != "ok" {
        return Err(gofile_status_error(&body.status, &id));
    }

    let mut children: Vec<GofileChild> = body
        .data
        .map(|d| d.children.into_values().filter(|c| c.link.is_some()).collect())
        .unwrap_or_default();
    children.sort_by(|a, b| a.name.cmp(&b.name));

    let cookie = format!("accountToken={}", token);
    let targets: Vec<FetchTarget> = children
        .into_iter()
        .filter_map(|child| {
            let link = child.link?;
            Some(FetchTarget {
                url: link,
                suggested_name: sanitize_filename(&child.name),
                size_hint: child.size,
                headers: HashMap::from([("Cookie".to_string(), cookie.clone())]),
                playlist_index: None,
                unavailable: None,
            })
        })
        .collect();

    if targets.is_empty() {
        return Err(ResolutionError::NotFound(format!("gofile {}: folder is empty", id)));
    }
    tracing::debug!("Gofile {} lists {} files", id, targets.len());
    Ok(targets)
}

// ---- Pixeldrain ----

#[derive(Debug, Deserialize)]
struct PixeldrainInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

pub async fn resolve_pixeldrain(
    client: &reqwest::Client,
    base: &str,
    url: &str,
) -> Result<Vec<FetchTarget>, ResolutionError> {
    let id = PIXELDRAIN_ID
        .captures(url)
        .map(|c| c[1].to_string())
        .ok_or_else(|| ResolutionError::Unsupported(format!("not a Pixeldrain file link: {}", url)))?;

    let response = client.get(format!("{}/api/file/{}/info", base, id)).send().await?;
    check_status(&response, &format!("pixeldrain {}", id))?;
    let info: PixeldrainInfo = response
        .json()
        .await
        .map_err(|e| ResolutionError::Network(format!("pixeldrain info: {}", e)))?;

    let name = info.name.unwrap_or_else(|| format!("pixeldrain_{}", id));
    Ok(vec![FetchTarget {
        url: format!("{}/api/file/{}?download", base, id),
        suggested_name: sanitize_filename(&name),
        size_hint: info.size,
        headers: HashMap::new(),
        playlist_index: None,
        unavailable: None,
    }])
}

// ---- MediaFire ----

/// Scrape the download button out of a MediaFire file page
pub async fn resolve_mediafire(client: &reqwest::Client, page_url: &str) -> Result<Vec<FetchTarget>, ResolutionError> {
    let response = client.get(page_url).send().await?;
    check_status(&response, "mediafire page")?;
    let html = response.text().await?;

    let link = MEDIAFIRE_LINK
        .captures(&html)
        .or_else(|| MEDIAFIRE_BUTTON.captures(&html))
        .map(|c| c[1].to_string())
        .ok_or_else(|| ResolutionError::NotFound(format!("mediafire: no download link on {}", page_url)))?;

    let name = filename_from_url(&link).unwrap_or_else(|| "mediafire_download".to_string());
    tracing::debug!("MediaFire resolved {}", name);
    Ok(vec![FetchTarget {
        url: link,
        suggested_name: sanitize_filename(&name),
        size_hint: None,
        headers: HashMap::new(),
        playlist_index: None,
        unavailable: None,
    }])
}

// ---- 1fichier ----

/// 1fichier free download: title gives the name, a form POST gives the link.
///
/// `no_redirect` must not follow redirects; the link arrives as a 302.
pub async fn resolve_onefichier(
    client: &reqwest::Client,
    no_redirect: &reqwest::Client,
    page_url: &str,
) -> Result<Vec<FetchTarget>, ResolutionError> {
    let response = client.get(page_url).send().await?;
    check_status(&response, "1fichier page")?;
    let html = response.text().await?;

    let name = HTML_TITLE
        .captures(&html)
        .map(|c| TITLE_PREFIX.replace(c[1].trim(), "").trim().to_string())
        .filter(|t| !t.is_empty() && t != "1fichier.com")
        .unwrap_or_else(|| "1fichier_download".to_string());

    if html.contains("You must wait") || html.contains("Please wait") {
        return Err(ResolutionError::RateLimited(format!("1fichier: wait period active for {}", name)));
    }

    let response = no_redirect
        .post(page_url)
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form_body(&[("dl_no_ssl", "on"), ("dlinline", "on")]))
        .send()
        .await?;

    let link = if response.status().is_redirection() {
        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    } else {
        check_status(&response, "1fichier download")?;
        let html = response.text().await?;
        ONEFICHIER_CLICK.captures(&html).map(|c| c[1].to_string())
    };

    let link = link.ok_or_else(|| {
        ResolutionError::AuthRequired(format!("1fichier: {} needs premium or a captcha", name))
    })?;
    Ok(vec![FetchTarget {
        url: link,
        suggested_name: sanitize_filename(&name),
        size_hint: None,
        headers: HashMap::new(),
        playlist_index: None,
        unavailable: None,
    }])
}
