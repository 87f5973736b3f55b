use thiserror::Error;

/// Failure of one transfer attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Network drop or server-side error; retried with backoff
    #[error("Transient transfer failure: {0}")]
    Transient(String),

    /// Host throttled us; retried after an extra cool-down
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Expired link, missing file or refused access; never retried
    #[error("Permanent transfer failure: {0}")]
    Permanent(String),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited(_))
    }
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        Self::Transient(format!("I/O error: {}", e))
    }
}

/// Session snapshot persistence failures
#[derive(Error, Debug)]
pub enum SessionError {
    /// Snapshot exists but cannot be parsed
    #[error("Corrupt session snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),
}
