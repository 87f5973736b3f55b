use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const MIN_PARALLELISM: usize = 1;
pub const MAX_PARALLELISM: usize = 5;

pub const GOFILE_TOKEN_ENV: &str = "REELHAUL_GOFILE_TOKEN";
pub const REALDEBRID_TOKEN_ENV: &str = "REELHAUL_RD_TOKEN";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Application configuration (saved to `<config>/settings.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub subtitles: SubtitleConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root of the TV Shows / Movies / Generic tree
    pub library_root: PathBuf,
    /// Staging area for in-flight downloads; relative paths resolve against
    /// the config directory. Defaults to `<config>/staging`.
    pub staging_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            library_root: crate::util::paths::resolve_default_library_root(),
            staging_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub parallelism: usize,
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    /// Pause between tasks of a serial lane
    pub serial_cooldown_secs: u64,
    /// Extra pause after a host reports rate limiting
    pub rate_limit_cooldown_secs: u64,
    /// Ceiling for the remote-cache poll of magnet links
    pub cache_timeout_secs: u64,
    pub cache_poll_interval_secs: u64,
    /// Archive entries smaller than this are discarded (subtitles exempt)
    pub min_extract_size_mb: u64,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            parallelism: 3,
            retry_count: 3,
            retry_delay_secs: 2,
            serial_cooldown_secs: 3,
            rate_limit_cooldown_secs: 30,
            cache_timeout_secs: 600,
            cache_poll_interval_secs: 2,
            min_extract_size_mb: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    pub languages: Vec<String>,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string(), "vi".to_string()],
        }
    }
}

/// Opaque per-source tokens
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub gofile: Option<String>,
    pub realdebrid: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("gofile", &self.gofile.as_ref().map(|_| "<redacted>"))
            .field("realdebrid", &self.realdebrid.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Load `settings.toml` from the config directory, falling back to defaults.
    ///
    /// Credential environment variables override the file.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = crate::util::paths::get_app_config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        if path.exists() {
            let content = std::fs::read_to_string(path).context(format!("Failed to read {:?}", path))?;
            let config: Config = toml::from_str(&content).context(format!("Failed to parse {:?}", path))?;
            Ok(config)
        } else {
            tracing::info!("Application config not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save to `settings.toml` (atomic write)
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;
        let config_path = crate::util::paths::get_app_config_path()?;
        self.save_to(&config_path)?;
        tracing::info!("Saved application config to {:?}", config_path);
        Ok(())
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;

        // Atomic write using temp file + rename
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, &content).context("Failed to write temp config file")?;
        std::fs::rename(&temp_path, path).context("Failed to rename temp config file")?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = non_empty_env(GOFILE_TOKEN_ENV) {
            tracing::debug!("Gofile token taken from {}", GOFILE_TOKEN_ENV);
            self.credentials.gofile = Some(token);
        }
        if let Some(token) = non_empty_env(REALDEBRID_TOKEN_ENV) {
            tracing::debug!("Real-Debrid token taken from {}", REALDEBRID_TOKEN_ENV);
            self.credentials.realdebrid = Some(token);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Err(errors) = crate::app::settings::validate_config(self) {
            return Err(anyhow::anyhow!(
                "Invalid configuration: {}",
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        Ok(())
    }

    /// Staging directory with relative paths resolved against the config dir
    pub fn staging_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.general.staging_dir {
            Some(dir) => Ok(crate::util::paths::resolve_relative_to_config(dir)),
            None => crate::util::paths::get_staging_dir(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
