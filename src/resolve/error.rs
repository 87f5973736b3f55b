use crate::download::error::TransferError;
use crate::download::http_errors::{HttpErrorCategory, HttpErrorInfo};
use thiserror::Error;

/// Failure to turn an input line into fetchable items
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// Remote cache did not finish staging before the deadline
    #[error("Timed out after {secs}s waiting for the remote cache: {detail}")]
    CacheTimeout { secs: u64, detail: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Connection or server error, may succeed later
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unsupported input: {0}")]
    Unsupported(String),
}

impl ResolutionError {
    /// Map an HTTP status from a resolver API call
    pub fn from_status(status: u16, context: &str) -> Self {
        let info = HttpErrorInfo::from_status(status);
        let detail = format!("{}: {}", context, info.format());
        match info.category {
            HttpErrorCategory::Auth => Self::AuthRequired(detail),
            HttpErrorCategory::RateLimit => Self::RateLimited(detail),
            HttpErrorCategory::Server | HttpErrorCategory::Network => Self::Network(detail),
            HttpErrorCategory::Client => Self::NotFound(detail),
        }
    }

    /// Whether trying the same resolution again later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited(_))
    }
}

impl From<reqwest::Error> for ResolutionError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::from_status(status.as_u16(), "request failed"),
            None => Self::Network(e.to_string()),
        }
    }
}

impl From<ResolutionError> for TransferError {
    fn from(e: ResolutionError) -> Self {
        match e {
            ResolutionError::Network(_) => TransferError::Transient(e.to_string()),
            ResolutionError::RateLimited(_) => TransferError::RateLimited(e.to_string()),
            _ => TransferError::Permanent(e.to_string()),
        }
    }
}
