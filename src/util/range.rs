//! Playlist range selection
//!
//! Parses selections like `1,3,5-10` into a set of 1-based item indices.
//! An empty selection means every item.
//!
//! ```
//! use reelhaul::util::range::PlaylistRange;
//!
//! let range: PlaylistRange = "1,3,5-7".parse().unwrap();
//! assert!(range.contains(6));
//! assert!(!range.contains(4));
//! assert!(PlaylistRange::all().contains(99));
//! ```

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// A single `N` or `N-M` segment
static SEGMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:-(\d+))?$").expect("Invalid regex pattern"));

/// Upper bound on the indices a single segment may cover
const MAX_SPAN: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("invalid playlist range segment '{0}'")]
    InvalidSegment(String),

    #[error("playlist indices start at 1 (got '{0}')")]
    ZeroIndex(String),

    #[error("reversed playlist range '{0}'")]
    Reversed(String),

    #[error("playlist range segment '{0}' is too large")]
    TooLarge(String),
}

/// Inclusive span of 1-based indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpan {
    pub start: u32,
    pub end: u32,
}

impl RangeSpan {
    pub fn contains(&self, index: u32) -> bool {
        index >= self.start && index <= self.end
    }

    /// Number of indices in this span
    pub fn count(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// Parsed `playlist_range` option
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistRange {
    spans: Vec<RangeSpan>,
}

impl PlaylistRange {
    /// Range that selects every item
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_all(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn spans(&self) -> &[RangeSpan] {
        &self.spans
    }

    pub fn contains(&self, index: u32) -> bool {
        self.is_all() || self.spans.iter().any(|s| s.contains(index))
    }

    /// Indices selected out of `1..=len`, in ascending order
    pub fn select(&self, len: u32) -> Vec<u32> {
        (1..=len).filter(|i| self.contains(*i)).collect()
    }
}

impl FromStr for PlaylistRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if normalized.is_empty() {
            return Ok(Self::all());
        }

        let mut spans = Vec::new();
        for segment in normalized.split(',').filter(|seg| !seg.is_empty()) {
            let captures = SEGMENT_PATTERN
                .captures(segment)
                .ok_or_else(|| RangeError::InvalidSegment(segment.to_string()))?;

            let start: u32 = captures[1]
                .parse()
                .map_err(|_| RangeError::TooLarge(segment.to_string()))?;
            let end: u32 = match captures.get(2) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| RangeError::TooLarge(segment.to_string()))?,
                None => start,
            };

            if start == 0 {
                return Err(RangeError::ZeroIndex(segment.to_string()));
            }
            if end < start {
                return Err(RangeError::Reversed(segment.to_string()));
            }
            if end - start >= MAX_SPAN {
                return Err(RangeError::TooLarge(segment.to_string()));
            }

            spans.push(RangeSpan { start, end });
        }

        Ok(Self { spans })
    }
}

impl fmt::Display for PlaylistRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .spans
            .iter()
            .map(|s| {
                if s.start == s.end {
                    s.start.to_string()
                } else {
                    format!("{}-{}", s.start, s.end)
                }
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

// Persisted in its textual form so a resumed session shows the same spec the user typed
impl Serialize for PlaylistRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PlaylistRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
