use super::config::{Config, MAX_PARALLELISM, MIN_PARALLELISM};
use crate::util::range::{PlaylistRange, RangeError};
use serde::{Deserialize, Serialize};

/// What the video extractor should fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    #[default]
    Video,
    SubtitlesOnly,
}

/// Opaque tokens passed through to the resolvers. Never persisted.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub gofile: Option<String>,
    pub realdebrid: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("gofile", &self.gofile.as_ref().map(|_| "<redacted>"))
            .field("realdebrid", &self.realdebrid.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Immutable options for one batch, threaded through resolver and scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub parallelism: usize,
    pub show_name_override: Option<String>,
    pub playlist_range: PlaylistRange,
    pub subtitle_languages: Vec<String>,
    pub mode: FetchMode,
    pub credentials: Credentials,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallelism: 3,
            show_name_override: None,
            playlist_range: PlaylistRange::all(),
            subtitle_languages: vec!["en".to_string(), "vi".to_string()],
            mode: FetchMode::Video,
            credentials: Credentials::default(),
        }
    }
}

impl RunOptions {
    /// Start from configured defaults
    pub fn from_config(config: &Config) -> Self {
        Self {
            parallelism: config.download.parallelism,
            show_name_override: None,
            playlist_range: PlaylistRange::all(),
            subtitle_languages: config.subtitles.languages.clone(),
            mode: FetchMode::Video,
            credentials: Credentials {
                gofile: config.credentials.gofile.clone(),
                realdebrid: config.credentials.realdebrid.clone(),
            },
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Result<Self, ValidationError> {
        validate_parallelism(parallelism)?;
        self.parallelism = parallelism;
        Ok(self)
    }

    /// Blank names clear the override
    pub fn with_show_name(mut self, name: Option<String>) -> Self {
        self.show_name_override = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self
    }

    pub fn with_range(mut self, spec: &str) -> Result<Self, ValidationError> {
        self.playlist_range = spec.parse().map_err(ValidationError::InvalidRange)?;
        Ok(self)
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Configuration validation failures
#[derive(Debug)]
pub enum ValidationError {
    ParallelismOutOfRange(usize),
    InvalidRange(RangeError),
    /// Zero retries would make every transient failure permanent
    ZeroRetryCount,
    EmptySubtitleLanguage,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::ParallelismOutOfRange(value) => write!(
                f,
                "parallelism must be between {} and {} (got {})",
                MIN_PARALLELISM, MAX_PARALLELISM, value
            ),
            ValidationError::InvalidRange(e) => write!(f, "invalid playlist range: {}", e),
            ValidationError::ZeroRetryCount => write!(f, "retry_count must be at least 1"),
            ValidationError::EmptySubtitleLanguage => write!(f, "subtitle language codes must not be empty"),
        }
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_parallelism(parallelism: usize) -> Result<(), ValidationError> {
    if (MIN_PARALLELISM..=MAX_PARALLELISM).contains(&parallelism) {
        Ok(())
    } else {
        Err(ValidationError::ParallelismOutOfRange(parallelism))
    }
}

/// Collect every problem in the configuration
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_parallelism(config.download.parallelism) {
        errors.push(e);
    }
    if config.download.retry_count == 0 {
        errors.push(ValidationError::ZeroRetryCount);
    }
    if config.subtitles.languages.iter().any(|l| l.trim().is_empty()) {
        errors.push(ValidationError::EmptySubtitleLanguage);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
