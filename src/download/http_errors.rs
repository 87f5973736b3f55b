use super::error::TransferError;

/// HTTP error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorCategory {
    Network,    // Connection errors (no status code)
    Client,     // 4xx errors
    Server,     // 5xx errors
    Auth,       // 401, 403
    RateLimit,  // 429
}

/// Enriched HTTP error information
#[derive(Debug, Clone)]
pub struct HttpErrorInfo {
    pub status_code: Option<u16>,
    pub category: HttpErrorCategory,
    pub description: String,
    pub suggestion: String,
    pub is_retryable: bool,
}

impl HttpErrorInfo {
    fn entry(
        status: u16,
        category: HttpErrorCategory,
        description: impl Into<String>,
        suggestion: &str,
        is_retryable: bool,
    ) -> Self {
        Self {
            status_code: Some(status),
            category,
            description: description.into(),
            suggestion: suggestion.to_string(),
            is_retryable,
        }
    }

    /// Create from HTTP status code
    pub fn from_status(status: u16) -> Self {
        use HttpErrorCategory::*;
        match status {
            400 => Self::entry(400, Client, "Bad Request", "The link is malformed. Check the input line.", false),
            401 => Self::entry(401, Auth, "Unauthorized", "Token missing or rejected. Check [credentials].", false),
            403 => Self::entry(403, Auth, "Forbidden", "Access denied or link expired. Re-resolve the input.", false),
            404 => Self::entry(404, Client, "Not Found", "The file no longer exists at this URL.", false),
            410 => Self::entry(410, Client, "Gone", "The file has been permanently removed.", false),
            429 => Self::entry(429, RateLimit, "Too Many Requests", "Host is throttling. Retry happens after a cool-down.", true),
            500 => Self::entry(500, Server, "Internal Server Error", "Server-side issue. Retry may succeed.", true),
            502 => Self::entry(502, Server, "Bad Gateway", "Server connection issue. Retry may succeed.", true),
            503 => Self::entry(503, Server, "Service Unavailable", "Server temporarily unavailable. Retry will happen automatically.", true),
            504 => Self::entry(504, Server, "Gateway Timeout", "Server response timeout. Retry may succeed.", true),
            // Generic fallbacks
            _ if (400..500).contains(&status) => Self::entry(
                status,
                Client,
                format!("Client Error ({})", status),
                "Check the link and credentials.",
                false,
            ),
            _ if status >= 500 => Self::entry(
                status,
                Server,
                format!("Server Error ({})", status),
                "Server-side issue. Retry may help.",
                true,
            ),
            _ => Self::entry(
                status,
                Client,
                format!("HTTP Error ({})", status),
                "Unknown error. Check logs for details.",
                false,
            ),
        }
    }

    /// Create for network errors (no status code)
    pub fn network_error(message: &str) -> Self {
        Self {
            status_code: None,
            category: HttpErrorCategory::Network,
            description: "Network Error".to_string(),
            suggestion: format!("Connection failed: {}. Check network connectivity.", message),
            is_retryable: true,
        }
    }

    /// Format for display
    pub fn format(&self) -> String {
        if let Some(code) = self.status_code {
            format!("HTTP {} - {}", code, self.description)
        } else {
            self.description.clone()
        }
    }

    /// Transfer failure kind for this error
    pub fn to_transfer_error(&self) -> TransferError {
        let message = format!("{} ({})", self.format(), self.suggestion);
        match self.category {
            HttpErrorCategory::RateLimit => TransferError::RateLimited(message),
            _ if self.is_retryable => TransferError::Transient(message),
            _ => TransferError::Permanent(message),
        }
    }
}
