//! Filename classification
//!
//! Turns a downloaded file name (or a video title) into a library category
//! plus the name the file should be stored under. Classification is pure
//! and idempotent: classifying a result's `sanitized_filename` again yields
//! the same result.

use super::naming::{UNKNOWN_SHOW, clean_show_name, sanitize_filename, split_extension};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

/// `S01E02`
static STRICT_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bS(\d{1,2})E(\d{1,2})\b").expect("Invalid regex pattern")
});

/// `EP 3`, `Episode 3`, `Tập 3`, `Folge 3`, `Capitulo 3`, or a pipe/dash separated ordinal
static LOOSE_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\b(?:Ep?|Episode|Tập phim|Tập|Folge|Capitulo|Cap)[ .\-_]?(\d{1,3})\b|[|\-–—]\s*(?:Ep?|Episode|Tập)?\s*(\d{1,3})\b\s*[|\]]?)",
    )
    .expect("Invalid regex pattern")
});

/// `第3集`, `3화`
static ASIAN_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:第(\d+)集|(\d+)화)").expect("Invalid regex pattern"));

static YEAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("Invalid regex pattern"));

static PART_ONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:Part|Pt)\.?\s*1\b").expect("Invalid regex pattern"));

static PART_TWO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:Part|Pt)\.?\s*2\b").expect("Invalid regex pattern"));

/// Any part marker with its leading separator, e.g. ` Part 1`, `-pt2`, ` 上篇`
static PART_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\s._-]*(?:\b(?:Part|Pt)\.?\s*[12]\b|上篇|中篇|下篇)").expect("Invalid regex pattern")
});

pub const TV_DIR: &str = "TV Shows";
pub const MOVIE_DIR: &str = "Movies";
pub const GENERIC_DIR: &str = "Generic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    TvShow,
    Movie,
    Generic,
}

/// Extra knowledge about where a name came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryHint {
    #[default]
    None,
    /// Title of a streaming-video item; without episode or year signals it
    /// is filed as generic rather than guessed to be a movie.
    StreamingVideo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: MediaCategory,
    pub show_name: String,
    pub season: u32,
    pub episode: u32,
    pub part_suffix: Option<String>,
    pub sanitized_filename: String,
}

impl ClassificationResult {
    /// Path below the library root, e.g. `TV Shows/Show/Season 01/Show - S01E02.mkv`
    pub fn relative_path(&self) -> PathBuf {
        match self.category {
            MediaCategory::TvShow => PathBuf::from(TV_DIR)
                .join(&self.show_name)
                .join(format!("Season {:02}", self.season))
                .join(&self.sanitized_filename),
            MediaCategory::Movie => PathBuf::from(MOVIE_DIR)
                .join(&self.show_name)
                .join(&self.sanitized_filename),
            MediaCategory::Generic => PathBuf::from(GENERIC_DIR).join(&self.sanitized_filename),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    Strict,
    Loose,
    Asian,
}

struct EpisodeMatch {
    kind: PatternKind,
    start: usize,
    end: usize,
    season: u32,
    episode: u32,
}

/// Classify a filename or title.
pub fn classify(
    filename_or_title: &str,
    show_name_override: Option<&str>,
    playlist_index: Option<u32>,
) -> ClassificationResult {
    classify_with_hint(filename_or_title, show_name_override, playlist_index, CategoryHint::None)
}

/// Classify with a hint about the item's origin.
pub fn classify_with_hint(
    filename_or_title: &str,
    show_name_override: Option<&str>,
    playlist_index: Option<u32>,
    hint: CategoryHint,
) -> ClassificationResult {
    let filename = sanitize_filename(filename_or_title);
    let (stem, ext) = split_extension(&filename);
    let ext_suffix = ext.map(|e| format!(".{}", e)).unwrap_or_default();

    let part_suffix = detect_part_suffix(&filename);
    let override_name = show_name_override
        .map(|s| sanitize_filename(s.trim()))
        .filter(|s| !s.is_empty() && s != "_");

    let episode = earliest_episode_match(&filename);

    if episode.is_some() || override_name.is_some() {
        let (season, episode_num, detected_show) = match &episode {
            Some(m) => (m.season, m.episode, Some(show_name_from_match(&filename, m))),
            None => (1, playlist_index.unwrap_or(1), None),
        };
        let show_name = override_name
            .or(detected_show)
            .unwrap_or_else(|| UNKNOWN_SHOW.to_string());

        let sanitized_filename = format!(
            "{} - S{:02}E{:02}{}{}",
            show_name,
            season,
            episode_num,
            part_suffix.as_deref().unwrap_or(""),
            ext_suffix
        );

        return ClassificationResult {
            category: MediaCategory::TvShow,
            show_name,
            season,
            episode: episode_num,
            part_suffix,
            sanitized_filename,
        };
    }

    // The part marker lives in the suffix, not the movie name
    let movie_title = |text: &str| clean_show_name(&PART_MARKER.replace_all(text, ""));
    let movie_name = match YEAR_TOKEN.find(&filename) {
        Some(year) => Some(movie_title(&filename[..year.start()])),
        None if hint == CategoryHint::StreamingVideo => None,
        None => Some(movie_title(stem)),
    }
    .filter(|name| name != UNKNOWN_SHOW);

    match movie_name {
        Some(name) => ClassificationResult {
            category: MediaCategory::Movie,
            sanitized_filename: format!("{}{}{}", name, part_suffix.as_deref().unwrap_or(""), ext_suffix),
            show_name: name,
            season: 0,
            episode: 0,
            part_suffix,
        },
        None => ClassificationResult {
            category: MediaCategory::Generic,
            show_name: String::new(),
            season: 0,
            episode: 0,
            part_suffix,
            sanitized_filename: filename.clone(),
        },
    }
}

fn detect_part_suffix(filename: &str) -> Option<String> {
    if filename.contains("上篇") || PART_ONE.is_match(filename) {
        Some("-pt1".to_string())
    } else if filename.contains("下篇") || filename.contains("中篇") || PART_TWO.is_match(filename) {
        Some("-pt2".to_string())
    } else {
        None
    }
}

/// The match that starts earliest in the name wins, whichever pattern found it.
/// Ties go to the more specific pattern.
fn earliest_episode_match(filename: &str) -> Option<EpisodeMatch> {
    let candidates = [
        STRICT_EPISODE.captures(filename).map(|c| to_match(PatternKind::Strict, &c)),
        LOOSE_EPISODE.captures(filename).map(|c| to_match(PatternKind::Loose, &c)),
        ASIAN_EPISODE.captures(filename).map(|c| to_match(PatternKind::Asian, &c)),
    ];

    candidates.into_iter().flatten().min_by_key(|m| m.start)
}

fn to_match(kind: PatternKind, captures: &Captures<'_>) -> EpisodeMatch {
    let whole = captures.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
    let number = |idx: usize| captures.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());

    let (season, episode) = match kind {
        PatternKind::Strict => (number(1).unwrap_or(1), number(2).unwrap_or(1)),
        PatternKind::Loose | PatternKind::Asian => (1, number(1).or_else(|| number(2)).unwrap_or(1)),
    };

    EpisodeMatch {
        kind,
        start: whole.0,
        end: whole.1,
        season,
        episode,
    }
}

fn show_name_from_match(filename: &str, m: &EpisodeMatch) -> String {
    let show = clean_show_name(&filename[..m.start]);
    if show.chars().count() >= 2 && show != UNKNOWN_SHOW {
        return show;
    }

    // "EP01 - Show Name.mkv": the title follows the marker
    if m.kind == PatternKind::Loose {
        let (rest, _) = split_extension(&filename[m.end..]);
        if rest.trim().chars().count() > 2 {
            return clean_show_name(rest);
        }
    }

    show
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assert_idempotent(result: &ClassificationResult, show: Option<&str>, index: Option<u32>, hint: CategoryHint) {
        let again = classify_with_hint(&result.sanitized_filename, show, index, hint);
        assert_eq!(&again, result);
    }

    #[test]
    fn test_chinese_episode_marker() {
        let result = classify("Drama Name 第1集.mkv", None, None);
        assert_eq!(result.category, MediaCategory::TvShow);
        assert_eq!(result.show_name, "Drama Name");
        assert_eq!(result.season, 1);
        assert_eq!(result.episode, 1);
        assert_eq!(result.sanitized_filename, "Drama Name - S01E01.mkv");
        assert_idempotent(&result, None, None, CategoryHint::None);
    }

    #[test]
    fn test_dash_ordinal_with_override() {
        let result = classify("Show - 2.mkv", Some("My Show"), None);
        assert_eq!(result.category, MediaCategory::TvShow);
        assert_eq!(result.show_name, "My Show");
        assert_eq!(result.episode, 2);
        assert_eq!(result.sanitized_filename, "My Show - S01E02.mkv");
        assert_idempotent(&result, Some("My Show"), None, CategoryHint::None);
    }

    #[test]
    fn test_movie_with_year() {
        let result = classify("The.Matrix.1999.1080p.mkv", None, None);
        assert_eq!(result.category, MediaCategory::Movie);
        assert_eq!(result.show_name, "The Matrix");
        assert_eq!(result.sanitized_filename, "The Matrix.mkv");
        assert_eq!(result.relative_path(), PathBuf::from("Movies/The Matrix/The Matrix.mkv"));
        assert_idempotent(&result, None, None, CategoryHint::None);
    }

    #[test]
    fn test_strict_pattern() {
        let result = classify("Some.Show.S02E05.1080p.WEB-DL.mkv", None, None);
        assert_eq!(result.show_name, "Some Show");
        assert_eq!((result.season, result.episode), (2, 5));
        assert_eq!(
            result.relative_path(),
            PathBuf::from("TV Shows/Some Show/Season 02/Some Show - S02E05.mkv")
        );
        assert_idempotent(&result, None, None, CategoryHint::None);
    }

    #[test]
    fn test_earliest_match_wins_over_pattern_priority() {
        // The loose "EP 3" occurs before the strict token, so it decides the split
        let result = classify("Show EP 3 recap of S01E09.mkv", None, None);
        assert_eq!(result.show_name, "Show");
        assert_eq!(result.episode, 3);

        // Strict occurs first here; the later "- 7" must not cut the show name
        let result = classify("Show S01E04 - 7 extras.mkv", None, None);
        assert_eq!(result.show_name, "Show");
        assert_eq!(result.episode, 4);
    }

    #[test]
    fn test_other_language_markers() {
        assert_eq!(classify("Phim Hay Tập 12.mp4", None, None).episode, 12);
        assert_eq!(classify("Drama 7화.mp4", None, None).episode, 7);
        assert_eq!(classify("Serie Folge 4.mkv", None, None).episode, 4);
        assert_eq!(classify("Novela Capitulo 21.mkv", None, None).episode, 21);
        assert_eq!(classify("Drama Name | Ep 3 |.mkv", None, None).show_name, "Drama Name");
    }

    #[test]
    fn test_show_name_after_marker() {
        let result = classify("EP01 - Great Show.mkv", None, None);
        assert_eq!(result.show_name, "Great Show");
        assert_eq!(result.episode, 1);
    }

    #[test]
    fn test_playlist_index_fallback_needs_override() {
        let result = classify("Random upload title.mp4", Some("Channel Series"), Some(7));
        assert_eq!(result.category, MediaCategory::TvShow);
        assert_eq!((result.season, result.episode), (1, 7));
        assert_eq!(result.sanitized_filename, "Channel Series - S01E07.mp4");
        assert_idempotent(&result, Some("Channel Series"), Some(7), CategoryHint::None);

        let without_override = classify("Random upload title.mp4", None, Some(7));
        assert_eq!(without_override.category, MediaCategory::Movie);
    }

    #[test]
    fn test_detected_episode_beats_playlist_index() {
        let result = classify("Channel Series Ep 3.mp4", Some("Channel Series"), Some(9));
        assert_eq!(result.episode, 3);
    }

    #[test]
    fn test_part_suffix() {
        let result = classify("Drama 第5集 上篇.mkv", None, None);
        assert_eq!(result.part_suffix.as_deref(), Some("-pt1"));
        assert_eq!(result.sanitized_filename, "Drama - S01E05-pt1.mkv");
        assert_idempotent(&result, None, None, CategoryHint::None);

        let result = classify("Show S01E05 Part 2.mkv", None, None);
        assert_eq!(result.sanitized_filename, "Show - S01E05-pt2.mkv");
        assert_idempotent(&result, None, None, CategoryHint::None);

        assert_eq!(classify("Drama 第5集 中篇.mkv", None, None).part_suffix.as_deref(), Some("-pt2"));
    }

    #[test]
    fn test_movie_parts_get_distinct_names() {
        let first = classify("Kill Bill 2003 Part 1.mkv", None, None);
        let second = classify("Kill Bill 2003 Part 2.mkv", None, None);
        assert_eq!(first.category, MediaCategory::Movie);
        assert_eq!(first.show_name, "Kill Bill");
        assert_eq!(first.sanitized_filename, "Kill Bill-pt1.mkv");
        assert_eq!(second.sanitized_filename, "Kill Bill-pt2.mkv");
        assert_eq!(
            second.relative_path(),
            PathBuf::from("Movies/Kill Bill/Kill Bill-pt2.mkv")
        );
        assert_ne!(first.relative_path(), second.relative_path());
        assert_idempotent(&first, None, None, CategoryHint::None);
        assert_idempotent(&second, None, None, CategoryHint::None);

        let no_year = classify("Kill Bill Part 2.mkv", None, None);
        assert_eq!(no_year.show_name, "Kill Bill");
        assert_eq!(no_year.sanitized_filename, "Kill Bill-pt2.mkv");
        assert_idempotent(&no_year, None, None, CategoryHint::None);
    }

    #[test]
    fn test_part_marker_needs_a_word_boundary() {
        let result = classify("Script 1 2004.mkv", None, None);
        assert_eq!(result.part_suffix, None);
        assert_eq!(result.sanitized_filename, "Script 1.mkv");
    }

    #[test]
    fn test_movie_without_year_uses_whole_title() {
        let result = classify("Some Indie Film.mp4", None, None);
        assert_eq!(result.category, MediaCategory::Movie);
        assert_eq!(result.show_name, "Some Indie Film");
        assert_idempotent(&result, None, None, CategoryHint::None);
    }

    #[test]
    fn test_streaming_video_without_signals_is_generic() {
        let result = classify_with_hint("My Vlog Day.webm", None, None, CategoryHint::StreamingVideo);
        assert_eq!(result.category, MediaCategory::Generic);
        assert_eq!(result.relative_path(), PathBuf::from("Generic/My Vlog Day.webm"));
        assert_idempotent(&result, None, None, CategoryHint::StreamingVideo);

        let dated = classify_with_hint("Concert Film 2019.webm", None, None, CategoryHint::StreamingVideo);
        assert_eq!(dated.category, MediaCategory::Movie);
    }

    #[test]
    fn test_unusable_title_is_generic() {
        let result = classify("1080p.mkv", None, None);
        assert_eq!(result.category, MediaCategory::Generic);
        assert_eq!(result.sanitized_filename, "1080p.mkv");
    }

    #[test]
    fn test_year_in_trailing_dash_is_not_an_episode() {
        let result = classify("Blade Runner - 2049.mkv", None, None);
        assert_eq!(result.category, MediaCategory::Movie);
        assert_eq!(result.show_name, "Blade Runner");
    }
}
