//! Directory scanning - loads every managed definition file.
//!
//! Used for the startup load and for every reconciliation sweep. The scan
//! fails only when the directory itself cannot be read; individual files
//! that cannot be read, decoded or validated are skipped with a warning.
//!
//! # Async Safety
//!
//! The scan performs blocking filesystem I/O. Async callers go through
//! [`scan`], which runs it via `spawn_blocking`.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-file errors are logged and collected, never fatal

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dyna_core::{codec, is_managed_file, Definition, DefinitionError, DefinitionId, FileTimestamps};
use thiserror::Error;
use tracing::{debug, trace, warn};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort a whole scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The managed directory cannot be listed
    #[error("failed to read mock directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The blocking scan task panicked or was cancelled
    #[error("scan task failed: {0}")]
    Task(String),
}

/// Errors that cause a single file to be skipped.
#[derive(Debug, Error)]
pub enum FileError {
    /// The file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file name or content is not a valid definition
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

impl FileError {
    /// Returns true if the file vanished before it could be read.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// A file left out of a scan, with the reason.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error: FileError,
}

/// Result of a directory scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Every valid definition found
    pub definitions: Vec<Definition>,
    /// Managed files that were skipped
    pub skipped: Vec<SkippedFile>,
}

// ============================================================================
// Scanning
// ============================================================================

/// Scans the directory on the blocking pool.
///
/// # Errors
///
/// Returns `ScanError::ReadDir` if the directory cannot be listed and
/// `ScanError::Task` if the blocking task fails.
pub async fn scan(directory: PathBuf, extension: String) -> Result<ScanReport, ScanError> {
    match tokio::task::spawn_blocking(move || scan_directory(&directory, &extension)).await {
        Ok(result) => result,
        Err(e) => Err(ScanError::Task(e.to_string())),
    }
}

/// Loads every managed file in a flat directory.
///
/// Entries without the managed extension and anything that is not a
/// regular file are ignored. Subdirectories are not descended into.
///
/// This function performs blocking I/O and should be called via `spawn_blocking`.
///
/// # Errors
///
/// Returns `ScanError::ReadDir` if the directory cannot be listed.
pub fn scan_directory(directory: &Path, extension: &str) -> Result<ScanReport, ScanError> {
    let entries = std::fs::read_dir(directory).map_err(|source| ScanError::ReadDir {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut report = ScanReport::default();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %directory.display(), error = %e, "Failed to read directory entry");
                continue;
            }
        };

        let path = entry.path();
        if !is_managed_file(&path, extension) || !path.is_file() {
            trace!(path = %path.display(), "Ignoring unmanaged entry");
            continue;
        }

        match read_definition(&path) {
            Ok(definition) => {
                debug!(id = %definition.id(), path = %path.display(), "Loaded definition");
                report.definitions.push(definition);
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "Skipping invalid definition file");
                report.skipped.push(SkippedFile { path, error });
            }
        }
    }

    Ok(report)
}

/// Reads, decodes and validates one definition file.
///
/// The identifier comes from the file stem and the timestamps from the
/// file's metadata.
///
/// This function performs blocking I/O.
///
/// # Errors
///
/// Returns `FileError::Definition` for a bad name or bad content and
/// `FileError::Read` if the file cannot be read.
pub fn read_definition(path: &Path) -> Result<Definition, FileError> {
    let id = DefinitionId::from_path(path)?;

    let read_error = |source| FileError::Read {
        path: path.to_path_buf(),
        source,
    };
    let bytes = std::fs::read(path).map_err(read_error)?;
    let timestamps = std::fs::metadata(path)
        .map(|metadata| timestamps_of(&metadata))
        .unwrap_or_default();

    Ok(codec::load(id, &bytes, timestamps)?)
}

/// Extracts creation and modification times, when the platform reports them.
fn timestamps_of(metadata: &Metadata) -> FileTimestamps {
    FileTimestamps {
        created_at: metadata.created().ok().map(DateTime::<Utc>::from),
        modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dyna_core::Verb;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const VALID: &str = r#"{"url":"/foo","responses":{"get":{"ok":true}}}"#;

    #[test]
    fn test_scan_empty_directory() {
        let dir = TempDir::new().unwrap();
        let report = scan_directory(dir.path(), "json").unwrap();
        assert!(report.definitions.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_scan_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let result = scan_directory(&missing, "json");
        assert!(matches!(result, Err(ScanError::ReadDir { .. })));
    }

    #[test]
    fn test_scan_file_instead_of_directory_fails() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.json");
        fs::write(&file, VALID).unwrap();
        assert!(scan_directory(&file, "json").is_err());
    }

    #[test]
    fn test_scan_loads_valid_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("foo.json"), VALID).unwrap();
        fs::write(
            dir.path().join("bar.json"),
            r#"{"url":"/bar","responses":{"post":[1,2]}}"#,
        )
        .unwrap();

        let mut report = scan_directory(dir.path(), "json").unwrap();
        report.definitions.sort_by(|a, b| a.id().cmp(b.id()));

        let ids: Vec<_> = report.definitions.iter().map(|d| d.id().as_str()).collect();
        assert_eq!(ids, vec!["bar", "foo"]);
        assert!(report.skipped.is_empty());
        assert!(report.definitions.iter().all(|d| d.modified_at().is_some()));
    }

    #[test]
    fn test_corrupt_file_isolated() {
        let dir = TempDir::new().unwrap();
        for n in 0..3 {
            fs::write(
                dir.path().join(format!("ok-{n}.json")),
                format!(r#"{{"url":"/ok/{n}","responses":{{}}}}"#),
            )
            .unwrap();
        }
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("invalid.json"), r#"{"url":"","responses":{}}"#).unwrap();

        let report = scan_directory(dir.path(), "json").unwrap();
        assert_eq!(report.definitions.len(), 3);
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn test_scan_ignores_other_extensions_and_directories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::write(dir.path().join(".foo.json.tmp"), VALID).unwrap();
        fs::create_dir(dir.path().join("nested.json")).unwrap();
        fs::write(dir.path().join("foo.json"), VALID).unwrap();

        let report = scan_directory(dir.path(), "json").unwrap();
        assert_eq!(report.definitions.len(), 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_scan_reports_invalid_file_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("has space.json"), VALID).unwrap();

        let report = scan_directory(dir.path(), "json").unwrap();
        assert!(report.definitions.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(
            report.skipped.first().map(|s| &s.error),
            Some(FileError::Definition(DefinitionError::InvalidIdentifier { .. }))
        ));
    }

    #[test]
    fn test_read_definition() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo.json");
        fs::write(&path, VALID).unwrap();

        let definition = read_definition(&path).unwrap();
        assert_eq!(definition.id().as_str(), "foo");
        assert_eq!(definition.response(Verb::Get), Some(&json!({"ok": true})));
        assert_eq!(definition.response(Verb::Post), None);
    }

    #[test]
    fn test_read_definition_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_definition(&dir.path().join("gone.json")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_async_scan() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("foo.json"), VALID).unwrap();

        let report = scan(dir.path().to_path_buf(), "json".to_string())
            .await
            .unwrap();
        assert_eq!(report.definitions.len(), 1);
    }
}
