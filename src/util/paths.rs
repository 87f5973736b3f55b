use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

// Global config directory override (for --config flag and tests)
static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

const APP_DIR_NAME: &str = "reelhaul";

/// Set config directory override (used by --config flag and tests)
pub fn set_config_dir_override(path: Option<PathBuf>) {
    if let Ok(mut override_path) = CONFIG_DIR_OVERRIDE.write() {
        *override_path = path;
    }
}

/// Get current config directory override
pub fn get_config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE.read().ok().and_then(|p| p.clone())
}

/// Find config directory by searching in priority order:
/// 1. Override from --config flag or set_config_dir_override() (highest priority)
/// 2. Environment variable REELHAUL_CONFIG_DIR
/// 3. User config directory (`~/.config/reelhaul/` on Unix, `%APPDATA%\reelhaul\` on Windows)
/// 4. Current working directory (`./config/`)
///
/// If no config directory is found, creates one in the user config directory.
/// An override that does not exist yet is created on demand.
pub fn find_config_directory() -> Result<PathBuf> {
    // Priority 1: Override from --config flag or tests
    if let Some(override_path) = get_config_dir_override() {
        if !override_path.exists() {
            std::fs::create_dir_all(&override_path)
                .with_context(|| format!("Failed to create config directory {:?}", override_path))?;
            tracing::info!("Created config directory at: {:?}", override_path);
        }
        tracing::trace!("Using config directory override: {:?}", override_path);
        return Ok(override_path);
    }

    // Priority 2: Environment variable
    if let Ok(env_path) = std::env::var("REELHAUL_CONFIG_DIR") {
        let env_config = PathBuf::from(env_path);
        if env_config.exists() {
            tracing::trace!("Found config directory from REELHAUL_CONFIG_DIR: {:?}", env_config);
            return Ok(env_config);
        }
    }

    // Priority 3: User config directory (platform standard location)
    if let Ok(user_config) = get_user_config_dir() {
        if user_config.exists() {
            tracing::trace!("Found config directory at: {:?}", user_config);
            return Ok(user_config);
        }
    }

    // Priority 4: Current working directory
    if let Ok(cwd) = std::env::current_dir() {
        let cwd_config = cwd.join("config");
        if cwd_config.exists() {
            tracing::trace!("Found config directory at: {:?}", cwd_config);
            return Ok(cwd_config);
        }
    }

    // Fallback: Create in user config directory
    let user_config = get_user_config_dir()?;
    std::fs::create_dir_all(&user_config).context("Failed to create user config directory")?;
    tracing::info!("Created config directory at: {:?}", user_config);
    Ok(user_config)
}

/// Get platform-specific user config directory
/// - Windows: `%APPDATA%\reelhaul`
/// - Unix: `~/.config/reelhaul`
fn get_user_config_dir() -> Result<PathBuf> {
    let base_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine user config directory"))?;
    Ok(base_dir.join(APP_DIR_NAME))
}

/// Get absolute path to settings.toml
pub fn get_app_config_path() -> Result<PathBuf> {
    Ok(find_config_directory()?.join("settings.toml"))
}

/// Session snapshot used for resume
pub fn get_session_path() -> Result<PathBuf> {
    Ok(find_config_directory()?.join("session.json"))
}

/// Placement history
pub fn get_history_path() -> Result<PathBuf> {
    Ok(find_config_directory()?.join("history.json"))
}

/// Download-archive marker handed to the video extractor tool so it skips
/// items it already fetched in an earlier run.
pub fn get_download_archive_path() -> Result<PathBuf> {
    Ok(find_config_directory()?.join("yt_history.txt"))
}

/// Scratch space for in-flight transfers and archive extraction
pub fn get_staging_dir() -> Result<PathBuf> {
    Ok(find_config_directory()?.join("staging"))
}

/// Get absolute path to application-wide logs directory
pub fn get_logs_dir() -> Result<PathBuf> {
    Ok(find_config_directory()?.join(".logs"))
}

/// Resolve the default library root at runtime: `<cwd>/Media`, or a relative
/// `Media` when the working directory is unavailable.
pub fn resolve_default_library_root() -> PathBuf {
    match std::env::current_dir() {
        Ok(cwd) => cwd.join("Media"),
        Err(_) => PathBuf::from("Media"),
    }
}

/// Resolve a relative path against the config directory.
///
/// Absolute paths are returned as-is.
pub fn resolve_relative_to_config(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match find_config_directory() {
        Ok(config_dir) => config_dir.join(path),
        Err(_) => path.to_path_buf(),
    }
}
