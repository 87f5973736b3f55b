use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while unpacking downloaded archives
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Archive could not be read or an entry could not be decoded
    #[error("Corrupt archive {path}: {message}")]
    CorruptArchive { path: PathBuf, message: String },

    /// Entry would land outside the extraction root
    #[error("Unsafe archive entry path: {0}")]
    UnsafePath(String),

    #[error("Extraction I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while moving finished files into the library
#[derive(Error, Debug)]
pub enum PlacementError {
    /// Destination root missing or not a directory
    #[error("Invalid destination root {path}: {message}")]
    InvalidRoot { path: PathBuf, message: String },

    /// Computed target escaped the destination root
    #[error("Refusing to write outside the library root: {0}")]
    OutsideRoot(PathBuf),

    #[error("Placement I/O error: {0}")]
    Io(#[from] std::io::Error),
}
