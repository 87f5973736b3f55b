//! Source variants and their fetch policies

use crate::app::settings::Credentials;
use crate::download::task::SourceClass;
use crate::file::classify::CategoryHint;
use serde::{Deserialize, Serialize};

/// Hosts the premium unrestrictor accepts when a token is configured
pub const RD_SUPPORTED_HOSTS: &[&str] = &[
    "1fichier.com", "4shared.com", "alfafile.net", "clicknupload.org", "ddownload.com",
    "dropbox.com", "filefactory.com", "hexupload.net", "hitfile.net", "k2s.cc",
    "keep2share.cc", "mediafire.com", "mixdrop.co", "nitroflare.com", "oboom.com",
    "rapidgator.net", "sendspace.com", "solidfiles.com", "streamtape.com", "turbobit.net",
    "ulozto.net", "upload.ee", "uploaded.net", "uptobox.com", "userscloud.com",
    "vidoza.net", "wetransfer.com", "wipfiles.net", "worldbytez.com",
];

/// Streaming hosts handled by the media extractor
pub const VIDEO_HOSTS: &[&str] = &[
    "youtube.com", "youtu.be", "vimeo.com", "twitch.tv", "tiktok.com",
    "dailymotion.com", "soundcloud.com",
];

/// Which mechanism moves the payload bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferTool {
    Http,
    YtDlp,
    Megadl,
}

/// Scheduling and refresh rules attached to a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub class: SourceClass,
    /// Resolved URLs go stale and must be re-resolved on resume
    pub url_expires: bool,
    pub tool: TransferTool,
}

/// Closed set of supported sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Direct,
    Gofile,
    Pixeldrain,
    MediaFire,
    OneFichier,
    RealDebrid,
    Magnet,
    Mega,
    Video,
}

impl SourceKind {
    /// Identify the source of a raw input line.
    ///
    /// Hosts the unrestrictor supports are routed through it when a token
    /// is present.
    pub fn detect(line: &str, credentials: &Credentials) -> Self {
        let line = line.trim();
        let lower = line.to_lowercase();
        let has_rd = credentials.realdebrid.is_some();

        if lower.starts_with("magnet:?") {
            return Self::Magnet;
        }
        if lower.contains("gofile.io/d/") {
            return Self::Gofile;
        }
        if lower.contains("pixeldrain.com/u/") {
            return Self::Pixeldrain;
        }
        if lower.contains("real-debrid.com/d/") {
            return Self::RealDebrid;
        }
        if lower.contains("mediafire.com") {
            return if has_rd { Self::RealDebrid } else { Self::MediaFire };
        }
        if lower.contains("1fichier.com") {
            return if has_rd { Self::RealDebrid } else { Self::OneFichier };
        }
        if lower.contains("mega.nz") || lower.contains("transfer.it") {
            return Self::Mega;
        }

        let host = url::Url::parse(line)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();
        let host_matches = |candidates: &[&str]| {
            candidates
                .iter()
                .any(|c| host == *c || host.ends_with(&format!(".{}", c)))
        };

        if host_matches(VIDEO_HOSTS) {
            return Self::Video;
        }
        if has_rd && host_matches(RD_SUPPORTED_HOSTS) {
            return Self::RealDebrid;
        }
        Self::Direct
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        use SourceClass::*;
        let (class, url_expires, tool) = match self {
            Self::Direct => (DirectParallel, false, TransferTool::Http),
            Self::Gofile | Self::Pixeldrain | Self::MediaFire | Self::RealDebrid => {
                (DirectParallel, true, TransferTool::Http)
            }
            Self::OneFichier => (RateLimitedSerial, true, TransferTool::Http),
            Self::Magnet => (CacheThenFetchSerial, true, TransferTool::Http),
            Self::Mega => (RateLimitedSerial, false, TransferTool::Megadl),
            Self::Video => (RateLimitedSerial, false, TransferTool::YtDlp),
        };
        FetchPolicy { class, url_expires, tool }
    }

    pub fn category_hint(&self) -> CategoryHint {
        match self {
            Self::Video => CategoryHint::StreamingVideo,
            _ => CategoryHint::None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Gofile => "gofile",
            Self::Pixeldrain => "pixeldrain",
            Self::MediaFire => "mediafire",
            Self::OneFichier => "1fichier",
            Self::RealDebrid => "realdebrid",
            Self::Magnet => "magnet",
            Self::Mega => "mega",
            Self::Video => "video",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_rd() -> Credentials {
        Credentials {
            realdebrid: Some("token".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_detect_without_tokens() {
        let none = Credentials::default();
        assert_eq!(SourceKind::detect("magnet:?xt=urn:btih:abc", &none), SourceKind::Magnet);
        assert_eq!(SourceKind::detect("https://gofile.io/d/AbC123", &none), SourceKind::Gofile);
        assert_eq!(SourceKind::detect("https://pixeldrain.com/u/xyz", &none), SourceKind::Pixeldrain);
        assert_eq!(SourceKind::detect("https://www.mediafire.com/file/k/a.zip", &none), SourceKind::MediaFire);
        assert_eq!(SourceKind::detect("https://1fichier.com/?abc", &none), SourceKind::OneFichier);
        assert_eq!(SourceKind::detect("https://mega.nz/file/abc#key", &none), SourceKind::Mega);
        assert_eq!(SourceKind::detect("https://www.youtube.com/watch?v=x", &none), SourceKind::Video);
        assert_eq!(SourceKind::detect("https://youtu.be/x", &none), SourceKind::Video);
        assert_eq!(SourceKind::detect("https://rapidgator.net/file/x", &none), SourceKind::Direct);
        assert_eq!(SourceKind::detect("https://cdn.example.com/a.mkv", &none), SourceKind::Direct);
    }

    #[test]
    fn test_detect_routes_premium_hosts_with_token() {
        let creds = with_rd();
        assert_eq!(SourceKind::detect("https://1fichier.com/?abc", &creds), SourceKind::RealDebrid);
        assert_eq!(SourceKind::detect("https://www.mediafire.com/file/k/a.zip", &creds), SourceKind::RealDebrid);
        assert_eq!(SourceKind::detect("https://rapidgator.net/file/x", &creds), SourceKind::RealDebrid);
        assert_eq!(SourceKind::detect("https://www.youtube.com/watch?v=x", &creds), SourceKind::Video);
    }

    #[test]
    fn test_fetch_policy_lanes() {
        assert_eq!(SourceKind::Direct.fetch_policy().class, SourceClass::DirectParallel);
        assert!(!SourceKind::Direct.fetch_policy().url_expires);
        assert_eq!(SourceKind::OneFichier.fetch_policy().class, SourceClass::RateLimitedSerial);
        assert_eq!(SourceKind::Magnet.fetch_policy().class, SourceClass::CacheThenFetchSerial);
        assert_eq!(SourceKind::Video.fetch_policy().tool, TransferTool::YtDlp);
        assert!(SourceKind::RealDebrid.fetch_policy().url_expires);
    }
}
