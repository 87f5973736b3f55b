use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use std::collections::HashMap;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::error::TransferError;
use super::http_errors::HttpErrorInfo;
use super::transfer::{ProgressCallback, Transfer, TransferRequest};

/// What a HEAD request tells us about a remote file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteInfo {
    pub size: Option<u64>,
    pub filename: Option<String>,
}

/// Parse size and server-suggested filename from response headers
fn parse_response_headers(headers: &HeaderMap) -> RemoteInfo {
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let filename = headers
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            // Parse filename from Content-Disposition header
            v.split("filename=")
                .nth(1)
                .map(|s| s.split(';').next().unwrap_or(s).trim().trim_matches('"').to_string())
        })
        .filter(|s| !s.is_empty());

    RemoteInfo { size, filename }
}

/// Streaming HTTP transfer
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a new HTTP client with custom user agent
    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(std::time::Duration::from_secs(30)) // 30s connect timeout
            .read_timeout(std::time::Duration::from_secs(120))   // stalled stream
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self { client })
    }

    /// Underlying client, shared with the link resolvers
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Size and filename of a remote file without downloading it
    pub async fn probe(&self, url: &str, headers: &HashMap<String, String>) -> Result<RemoteInfo, TransferError> {
        let response = self
            .client
            .head(url)
            .headers(Self::build_headers(headers)?)
            .send()
            .await
            .map_err(|e| HttpErrorInfo::network_error(&e.to_string()).to_transfer_error())?;

        if !response.status().is_success() {
            return Err(HttpErrorInfo::from_status(response.status().as_u16()).to_transfer_error());
        }
        Ok(parse_response_headers(response.headers()))
    }

    /// Build request headers from task-supplied values
    pub fn build_headers(custom_headers: &HashMap<String, String>) -> Result<HeaderMap, TransferError> {
        let mut headers = HeaderMap::new();
        for (key, value) in custom_headers {
            let header_name: HeaderName = key
                .parse()
                .map_err(|_| TransferError::Permanent(format!("Invalid header name: {}", key)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| TransferError::Permanent(format!("Invalid value for header {}", key)))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Transfer for HttpClient {
    /// Stream the body into `<dest>.part`, then rename into place.
    async fn fetch(&self, request: &TransferRequest, progress: ProgressCallback) -> Result<u64, TransferError> {
        let url = &request.url;
        let path = &request.dest_path;
        tracing::trace!("Starting download: url={}, path={:?}", url, path);

        let response = self
            .client
            .get(url)
            .headers(Self::build_headers(&request.headers)?)
            .send()
            .await
            .map_err(|e| HttpErrorInfo::network_error(&e.to_string()).to_transfer_error())?;
        tracing::trace!("Received response with status: {}", response.status());

        if !response.status().is_success() {
            let error_info = HttpErrorInfo::from_status(response.status().as_u16());
            tracing::debug!("{} for {}: {}", error_info.format(), url, error_info.suggestion);
            return Err(error_info.to_transfer_error());
        }

        let size = parse_response_headers(response.headers()).size;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part_path = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.part", ext.to_string_lossy()),
            None => "part".to_string(),
        });

        // Wrap file in BufWriter (64KB buffer) to cut syscall overhead
        let file = File::create(&part_path).await?;
        let mut file = BufWriter::with_capacity(64 * 1024, file);

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransferError::Transient(format!("Stream interrupted: {}", e)))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress(downloaded, size);
        }

        file.flush().await?;
        drop(file);

        if let Some(expected) = size {
            if downloaded < expected {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(TransferError::Transient(format!(
                    "Short body: {} of {} bytes",
                    downloaded, expected
                )));
            }
        }

        tokio::fs::rename(&part_path, path).await?;
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::settings::FetchMode;
    use crate::resolve::source::TransferTool;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::with_user_agent("reelhaul-test").unwrap()
    }

    fn request(url: String, dest: std::path::PathBuf) -> TransferRequest {
        TransferRequest {
            url,
            dest_path: dest,
            headers: HashMap::new(),
            tool: TransferTool::Http,
            mode: FetchMode::Video,
            subtitle_languages: Vec::new(),
            download_archive: None,
        }
    }

    #[tokio::test]
    async fn test_probe_parses_size_and_name() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/file.mkv"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("Content-Length", "1024")
                    .append_header("Content-Disposition", "attachment; filename=\"Show.S01E01.mkv\""),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/file.mkv", mock_server.uri());
        let info = client().probe(&url, &HashMap::new()).await.unwrap();

        assert_eq!(info.size, Some(1024));
        assert_eq!(info.filename.as_deref(), Some("Show.S01E01.mkv"));
    }

    #[tokio::test]
    async fn test_fetch_writes_file_and_reports_progress() {
        let mock_server = MockServer::start().await;

        let test_data = b"Hello, World!";
        Mock::given(method("GET"))
            .and(path("/file.txt"))
            .and(header("Cookie", "accountToken=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(test_data.to_vec()))
            .mount(&mock_server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("sub").join("downloaded.txt");
        let mut req = request(format!("{}/file.txt", mock_server.uri()), file_path.clone());
        req.headers.insert("Cookie".to_string(), "accountToken=abc".to_string());

        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let written = client()
            .fetch(&req, Box::new(move |done, total| calls_clone.lock().unwrap().push((done, total))))
            .await
            .unwrap();

        assert_eq!(written, test_data.len() as u64);
        assert_eq!(std::fs::read(&file_path).unwrap(), test_data);
        assert!(!temp_dir.path().join("sub").join("downloaded.txt.part").exists());
        assert_eq!(calls.lock().unwrap().last().map(|c| c.0), Some(test_data.len() as u64));
    }

    #[tokio::test]
    async fn test_fetch_maps_status_to_error_kind() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow-down"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let dest = temp_dir.path().join("x.bin");
        let http = client();

        let gone = http.fetch(&request(format!("{}/gone", mock_server.uri()), dest.clone()), Box::new(|_, _| {})).await;
        assert!(matches!(gone, Err(TransferError::Permanent(_))));

        let busy = http.fetch(&request(format!("{}/busy", mock_server.uri()), dest.clone()), Box::new(|_, _| {})).await;
        assert!(matches!(busy, Err(TransferError::Transient(_))));

        let limited = http.fetch(&request(format!("{}/slow-down", mock_server.uri()), dest.clone()), Box::new(|_, _| {})).await;
        assert!(matches!(limited, Err(TransferError::RateLimited(_))));
        assert!(!dest.exists());
    }

    #[test]
    fn test_parse_response_headers_minimal() {
        let parsed = parse_response_headers(&HeaderMap::new());
        assert_eq!(parsed, RemoteInfo::default());
    }

    #[test]
    fn test_parse_response_headers_invalid_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, "invalid".parse().unwrap());
        assert_eq!(parse_response_headers(&headers).size, None);
    }

    #[test]
    fn test_build_headers_rejects_invalid_names() {
        let mut custom = HashMap::new();
        custom.insert("bad header".to_string(), "x".to_string());
        assert!(HttpClient::build_headers(&custom).is_err());
    }
}
