//! Library placement
//!
//! Computes where a finished file belongs and moves it there. All writes go
//! through [`Library`], which only ever touches paths inside its validated
//! root.

use super::classify::{CategoryHint, ClassificationResult, classify_with_hint};
use super::error::PlacementError;
use super::naming::{split_extension, split_subtitle_language};
use std::path::{Component, Path, PathBuf};

/// Inputs to classification that come from the task rather than the name
#[derive(Debug, Clone, Default)]
pub struct PlacementHints {
    pub show_name_override: Option<String>,
    pub playlist_index: Option<u32>,
    pub category_hint: CategoryHint,
}

/// A planned destination for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPlacement {
    pub classification: ClassificationResult,
    /// Final file name, including any subtitle language tag
    pub file_name: String,
    pub destination: PathBuf,
}

/// The destination library tree
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
}

impl Library {
    /// Validate (and create if needed) the library root.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, PlacementError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        if !root.is_dir() {
            return Err(PlacementError::InvalidRoot {
                path: root,
                message: "not a directory".to_string(),
            });
        }
        tracing::debug!("Library root: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decide where `file_name` belongs. Does not touch the filesystem.
    pub fn plan(&self, file_name: &str, hints: &PlacementHints) -> PlannedPlacement {
        let (processing_name, language) = split_subtitle_language(file_name);

        let classification = classify_with_hint(
            &processing_name,
            hints.show_name_override.as_deref(),
            hints.playlist_index,
            hints.category_hint,
        );

        let relative = classification.relative_path();
        let final_name = match &language {
            Some(lang) => {
                let (stem, ext) = split_extension(&classification.sanitized_filename);
                match ext {
                    Some(ext) => format!("{}.{}.{}", stem, lang, ext),
                    None => format!("{}.{}", stem, lang),
                }
            }
            None => classification.sanitized_filename.clone(),
        };
        let destination = self.root.join(relative.with_file_name(&final_name));

        PlannedPlacement {
            classification,
            file_name: final_name,
            destination,
        }
    }

    /// Size of an already-placed file at the planned destination
    pub fn existing_size(&self, planned: &PlannedPlacement) -> Option<u64> {
        std::fs::metadata(&planned.destination).ok().filter(|m| m.is_file()).map(|m| m.len())
    }

    /// Move `source` to its planned destination, creating parent directories.
    ///
    /// Replaces an existing file at the destination.
    pub async fn place(&self, source: &Path, planned: &PlannedPlacement) -> Result<PathBuf, PlacementError> {
        let destination = &planned.destination;
        if !self.contains(destination) {
            return Err(PlacementError::OutsideRoot(destination.clone()));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        move_file(source, destination).await?;
        tracing::info!(
            "Placed {} -> {}",
            source.display(),
            destination.strip_prefix(&self.root).unwrap_or(destination).display()
        );
        Ok(destination.clone())
    }

    /// True when `path` is lexically inside the root (no `..` escapes)
    pub fn contains(&self, path: &Path) -> bool {
        is_within(&self.root, path)
    }
}

/// Lexical containment check: `path` must start with `root` and carry no
/// parent-dir components after it.
pub fn is_within(root: &Path, path: &Path) -> bool {
    match path.strip_prefix(root) {
        Ok(rest) => rest.components().all(|c| matches!(c, Component::Normal(_))),
        Err(_) => false,
    }
}

/// Rename, falling back to copy + delete across filesystems
async fn move_file(source: &Path, destination: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!("Rename failed ({}), copying instead", e);
            tokio::fs::copy(source, destination).await?;
            tokio::fs::remove_file(source).await
        }
    }
}
