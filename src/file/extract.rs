//! Archive extraction
//!
//! Archives are unpacked one entry at a time so peak disk usage stays close
//! to one entry: the caller extracts an entry, moves it into the library and
//! deletes it before asking for the next one.
//!
//! Every entry path is validated against the extraction root before anything
//! is written. An unsafe entry is reported as [`ExtractionError::UnsafePath`]
//! and iteration continues with the next entry.

use super::error::ExtractionError;
use super::naming::split_extension;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

/// Directory and file names that archivers leave behind
const JUNK_NAMES: &[&str] = &["__MACOSX", ".DS_Store", "Thumbs.db", "desktop.ini"];

/// Outcome of one `extract_next_entry` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Entry written to `path`
    Extracted { name: String, path: PathBuf },
    /// Directory or junk metadata, nothing written
    Skipped { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    pub outcome: EntryOutcome,
    pub is_last: bool,
}

/// Cursor over the entries of one open archive
pub trait ArchiveEntries: Send {
    /// Extract the next entry below `dest_root`.
    ///
    /// Returns `Ok(None)` once every entry has been visited. An `Err` consumes
    /// the entry it was raised for, so callers may keep iterating.
    fn extract_next_entry(&mut self, dest_root: &Path) -> Result<Option<ExtractedEntry>, ExtractionError>;

    fn len(&self) -> usize;
}

/// Archive extraction capability
pub trait Extractor: Send + Sync {
    fn supports(&self, archive_path: &Path) -> bool;

    fn open(&self, archive_path: &Path) -> Result<Box<dyn ArchiveEntries>, ExtractionError>;
}

/// Relative path of a safe entry, or `UnsafePath` for absolute paths and `..`
pub fn safe_entry_path(name: &str) -> Result<PathBuf, ExtractionError> {
    let normalized = name.replace('\\', "/");
    let path = Path::new(&normalized);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => return Err(ExtractionError::UnsafePath(name.to_string())),
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(ExtractionError::UnsafePath(name.to_string()));
    }
    Ok(clean)
}

pub fn is_junk_entry(name: &str) -> bool {
    name.replace('\\', "/")
        .split('/')
        .any(|part| JUNK_NAMES.contains(&part))
}

fn archive_extension(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| split_extension(n).1)
}

/// Zip archives, read in-process
#[derive(Debug, Default, Clone)]
pub struct ZipExtractor;

struct ZipEntries {
    path: PathBuf,
    archive: zip::ZipArchive<File>,
    next: usize,
}

impl Extractor for ZipExtractor {
    fn supports(&self, archive_path: &Path) -> bool {
        archive_extension(archive_path).as_deref() == Some("zip")
    }

    fn open(&self, archive_path: &Path) -> Result<Box<dyn ArchiveEntries>, ExtractionError> {
        let file = File::open(archive_path)?;
        let archive = zip::ZipArchive::new(file)
            .map_err(|e| ExtractionError::corrupt(archive_path, e.to_string()))?;
        Ok(Box::new(ZipEntries {
            path: archive_path.to_path_buf(),
            archive,
            next: 0,
        }))
    }
}

impl ArchiveEntries for ZipEntries {
    fn extract_next_entry(&mut self, dest_root: &Path) -> Result<Option<ExtractedEntry>, ExtractionError> {
        if self.next >= self.archive.len() {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        let is_last = self.next == self.archive.len();

        let mut entry = self
            .archive
            .by_index(index)
            .map_err(|e| ExtractionError::corrupt(&self.path, e.to_string()))?;
        let name = entry.name().to_string();

        if entry.is_dir() || is_junk_entry(&name) {
            return Ok(Some(ExtractedEntry {
                outcome: EntryOutcome::Skipped { name },
                is_last,
            }));
        }

        let relative = safe_entry_path(&name)?;
        let target = dest_root.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| ExtractionError::corrupt(&self.path, format!("{}: {}", name, e)))?;

        Ok(Some(ExtractedEntry {
            outcome: EntryOutcome::Extracted { name, path: target },
            is_last,
        }))
    }

    fn len(&self) -> usize {
        self.archive.len()
    }
}

/// RAR and 7z archives through the external `7z` tool
#[derive(Debug, Clone)]
pub struct SevenZipExtractor {
    program: String,
}

impl Default for SevenZipExtractor {
    fn default() -> Self {
        Self { program: "7z".to_string() }
    }
}

struct ToolEntries {
    program: String,
    archive: PathBuf,
    entries: Vec<(String, bool)>,
    next: usize,
}

impl SevenZipExtractor {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Parse `7z l -slt` output into (path, is_dir) pairs
    fn parse_listing(listing: &str) -> Vec<(String, bool)> {
        let mut entries = Vec::new();
        let mut current: Option<String> = None;
        let mut is_dir = false;

        for line in listing.lines() {
            if let Some(path) = line.strip_prefix("Path = ") {
                if let Some(prev) = current.take() {
                    entries.push((prev, is_dir));
                }
                current = Some(path.trim().to_string());
                is_dir = false;
            } else if line.trim() == "Folder = +" || line.trim_start().starts_with("Attributes = D") {
                is_dir = true;
            }
        }
        if let Some(prev) = current {
            entries.push((prev, is_dir));
        }
        entries
    }
}

impl Extractor for SevenZipExtractor {
    fn supports(&self, archive_path: &Path) -> bool {
        matches!(archive_extension(archive_path).as_deref(), Some("rar") | Some("7z"))
    }

    fn open(&self, archive_path: &Path) -> Result<Box<dyn ArchiveEntries>, ExtractionError> {
        let output = Command::new(&self.program)
            .args(["l", "-ba", "-slt"])
            .arg(archive_path)
            .output()?;
        if !output.status.success() {
            return Err(ExtractionError::corrupt(
                archive_path,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let entries = Self::parse_listing(&listing);
        tracing::debug!("{} lists {} entries", archive_path.display(), entries.len());

        Ok(Box::new(ToolEntries {
            program: self.program.clone(),
            archive: archive_path.to_path_buf(),
            entries,
            next: 0,
        }))
    }
}

impl ArchiveEntries for ToolEntries {
    fn extract_next_entry(&mut self, dest_root: &Path) -> Result<Option<ExtractedEntry>, ExtractionError> {
        let Some((name, is_dir)) = self.entries.get(self.next).cloned() else {
            return Ok(None);
        };
        self.next += 1;
        let is_last = self.next == self.entries.len();

        if is_dir || is_junk_entry(&name) {
            return Ok(Some(ExtractedEntry {
                outcome: EntryOutcome::Skipped { name },
                is_last,
            }));
        }

        let relative = safe_entry_path(&name)?;
        let status = Command::new(&self.program)
            .args(["x", "-y"])
            .arg(&self.archive)
            .arg(format!("-o{}", dest_root.display()))
            .arg(&name)
            .output()?;
        if !status.status.success() {
            return Err(ExtractionError::corrupt(
                &self.archive,
                format!("{}: {}", name, String::from_utf8_lossy(&status.stderr).trim()),
            ));
        }

        Ok(Some(ExtractedEntry {
            outcome: EntryOutcome::Extracted {
                name,
                path: dest_root.join(relative),
            },
            is_last,
        }))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Routes an archive to the first extractor that supports it
pub struct ArchiveExtractor {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self {
            extractors: vec![Box::new(ZipExtractor), Box::new(SevenZipExtractor::default())],
        }
    }
}

impl ArchiveExtractor {
    pub fn new(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self { extractors }
    }
}

impl Extractor for ArchiveExtractor {
    fn supports(&self, archive_path: &Path) -> bool {
        self.extractors.iter().any(|e| e.supports(archive_path))
    }

    fn open(&self, archive_path: &Path) -> Result<Box<dyn ArchiveEntries>, ExtractionError> {
        match self.extractors.iter().find(|e| e.supports(archive_path)) {
            Some(extractor) => extractor.open(archive_path),
            None => Err(ExtractionError::corrupt(archive_path, "unsupported archive format")),
        }
    }
}
