//! File-derived definition identifiers.
//!
//! The filesystem is the source of truth for identity: a definition stored in
//! `orders.json` has the identifier `orders`. Identifiers are validated so they
//! can be turned back into a file name without escaping the managed directory.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DefinitionError, DefinitionResult};

/// Extension of managed definition files (without the dot).
pub const DEFAULT_EXTENSION: &str = "json";

/// Maximum identifier length in bytes.
pub const MAX_ID_LEN: usize = 128;

/// Unique identifier of a mock definition.
///
/// Wraps the stem of the backing file name (e.g. `"user-list"` for
/// `user-list.json`). Only `[A-Za-z0-9_.-]` is allowed and the value may not
/// start with a dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DefinitionId(String);

impl DefinitionId {
    /// Validates and wraps an identifier.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::InvalidIdentifier` if the value is empty,
    /// too long, starts with a dot, or contains characters outside
    /// `[A-Za-z0-9_.-]`.
    pub fn parse(value: impl Into<String>) -> DefinitionResult<Self> {
        let value = value.into();
        check_identifier(&value).map_err(|reason| DefinitionError::InvalidIdentifier {
            value: value.clone(),
            reason: reason.to_string(),
        })?;
        Ok(Self(value))
    }

    /// Derives the identifier from a file path's stem.
    ///
    /// The caller is expected to have filtered the path with
    /// [`is_managed_file`] first; this only looks at the stem.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::InvalidIdentifier` if the path has no
    /// UTF-8 stem or the stem is not a valid identifier.
    pub fn from_path(path: &Path) -> DefinitionResult<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DefinitionError::InvalidIdentifier {
                value: path.display().to_string(),
                reason: "file name has no UTF-8 stem".to_string(),
            })?;
        Self::parse(stem)
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the backing file name for the given extension.
    #[must_use]
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.0)
    }
}

/// Returns `Err(reason)` if `value` cannot be used as an identifier.
fn check_identifier(value: &str) -> Result<(), &'static str> {
    if value.is_empty() {
        return Err("must not be empty");
    }
    if value.len() > MAX_ID_LEN {
        return Err("is longer than 128 bytes");
    }
    if value.starts_with('.') {
        return Err("must not start with '.'");
    }
    if value.contains('/') || value.contains('\\') {
        return Err("contains a path separator");
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.');
    if !value.chars().all(allowed) {
        return Err("may only contain ASCII letters, digits, '_', '-' and '.'");
    }
    Ok(())
}

/// Checks whether a path is a managed definition file.
///
/// Only the extension is considered (exact, case-sensitive match). Whether
/// the stem is a valid identifier is decided later by [`DefinitionId::from_path`]
/// so that bad names can be reported instead of silently ignored.
pub fn is_managed_file(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DefinitionId {
    type Error = DefinitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for DefinitionId {
    type Error = DefinitionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DefinitionId> for String {
    fn from(id: DefinitionId) -> Self {
        id.0
    }
}

impl AsRef<str> for DefinitionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
