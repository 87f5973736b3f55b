use regex::Regex;
use std::sync::LazyLock;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL",
    "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9",
    "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Extensions that are always kept, regardless of size filters
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "sub", "vtt"];

/// Extensions handled by the archive step
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z"];

/// Fallback used when cleaning leaves nothing usable
pub const UNKNOWN_SHOW: &str = "Unknown Show";

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_]+").expect("Invalid regex pattern"));

static RELEASE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:VIETSUB|ENGSUB|ENG\s*SUB|VIET\s*SUB|THUYẾT\s*MINH|RAW|FULL|HD)\s*[|｜:：\-–—]\s*")
        .expect("Invalid regex pattern")
});

static TECH_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[?\s*\b(?:ENG\s*SUB|ENGSUB|FULL|WEB-?DL|WEBRip|BluRay|HDR|10bit|Atmos|DV|Vision|DDP\d\.\d|x265|HEVC|x264|H\.\d{3})\b\s*\]?")
        .expect("Invalid regex pattern")
});

static RESOLUTION_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:2160p|1080p|720p|480p|4k|8k)\b").expect("Invalid regex pattern")
});

static BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\[\]()《》「」【】]").expect("Invalid regex pattern"));

static TRAILING_PIPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[|｜]\s*$").expect("Invalid regex pattern"));

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[|｜._\-]").expect("Invalid regex pattern"));

static TRAILING_FINALE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+\b(?:END|FINALE|FINAL)$").expect("Invalid regex pattern"));

static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

/// Make a name safe for every filesystem we place into.
///
/// Percent-escapes are decoded, illegal characters become `_`, runs of
/// whitespace and underscores collapse to one space, and trailing dots and
/// spaces are trimmed.
pub fn sanitize_filename(name: &str) -> String {
    let decoded = urlencoding::decode(name)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| name.to_string());

    let replaced: String = decoded
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let mut result = WHITESPACE_RUNS.replace_all(&replaced, " ").trim().to_string();

    // Remove trailing spaces and dots
    result = result.trim_end_matches(|c| c == ' ' || c == '.').to_string();

    // Check for reserved names
    let upper = result.to_uppercase();
    let base = upper.split('.').next().unwrap_or("");
    if RESERVED_NAMES.contains(&base) {
        result = format!("_{}", result);
    }

    if result.is_empty() {
        result = "_".to_string();
    }

    result
}

/// Strip release noise from a show or movie title.
///
/// Returns [`UNKNOWN_SHOW`] when nothing is left.
pub fn clean_show_name(name: &str) -> String {
    let name = RELEASE_PREFIX.replace(name, "");
    let name = TECH_TAGS.replace_all(&name, "");
    let name = RESOLUTION_TAGS.replace_all(&name, "");
    let name = BRACKETS.replace_all(&name, " ");
    let name = TRAILING_PIPE.replace(&name, "");
    let name = SEPARATORS.replace_all(&name, " ");
    let name = SPACES.replace_all(name.trim(), " ");
    let name = TRAILING_FINALE.replace(&name, "");
    let clean = name.trim();

    if clean.is_empty() {
        UNKNOWN_SHOW.to_string()
    } else {
        clean.to_string()
    }
}

/// Split `name.ext` into stem and lowercase extension (without the dot)
pub fn split_extension(name: &str) -> (&str, Option<String>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() && !name[pos + 1..].contains(' ') => {
            (&name[..pos], Some(name[pos + 1..].to_lowercase()))
        }
        _ => (name, None),
    }
}

pub fn is_subtitle(name: &str) -> bool {
    matches!(split_extension(name).1, Some(ext) if SUBTITLE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_archive(name: &str) -> bool {
    matches!(split_extension(name).1, Some(ext) if ARCHIVE_EXTENSIONS.contains(&ext.as_str()))
}

/// Pull a language tag out of `Name.<lang>.<subtitle-ext>`.
///
/// Returns the name with the tag removed plus the tag itself. Tags are two or
/// three characters, matching `.en.srt` and `.vie.srt` style names.
pub fn split_subtitle_language(name: &str) -> (String, Option<String>) {
    if !is_subtitle(name) {
        return (name.to_string(), None);
    }

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() >= 3 {
        let lang = parts[parts.len() - 2];
        let lang_len = lang.chars().count();
        if (lang_len == 2 || lang_len == 3) && lang.chars().all(|c| c.is_alphabetic()) {
            let base = parts[..parts.len() - 2].join(".");
            let ext = parts[parts.len() - 1];
            return (format!("{}.{}", base, ext), Some(lang.to_string()));
        }
    }

    (name.to_string(), None)
}

/// Filename component of a URL path, percent-decoded
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(last).ok()?.into_owned();
    if decoded.is_empty() { None } else { Some(decoded) }
}
