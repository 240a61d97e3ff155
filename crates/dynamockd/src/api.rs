//! Definition API used by the HTTP layer.
//!
//! Reads come from the registry. Writes only touch files: the watch loop
//! (or the next sweep) is what makes a write visible in the registry, so
//! the directory stays the single source of truth.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dyna_core::{
    codec, is_managed_file, Definition, DefinitionError, DefinitionId, FileTimestamps, Verb,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::registry::Registry;

/// Whether several definitions may serve the same route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutePolicy {
    #[default]
    AllowDuplicates,
    /// Writes that would give a route a second identifier are refused
    RejectDuplicates,
}

/// Errors returned to API callers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("definition not found: {0}")]
    NotFound(String),

    #[error("invalid definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    #[error("route {route} is already served by {existing}")]
    RouteConflict { route: String, existing: DefinitionId },

    #[error("no definition serves route {0}")]
    RouteNotFound(String),

    #[error("{id} defines no {verb} response")]
    ResponseNotDefined { id: DefinitionId, verb: Verb },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read mock directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// CRUD over definitions plus the mocked-response lookup.
#[derive(Debug, Clone)]
pub struct DefinitionService {
    registry: Registry,
    directory: PathBuf,
    extension: String,
    route_policy: RoutePolicy,
}

impl DefinitionService {
    pub fn new(
        registry: Registry,
        directory: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            directory: directory.into(),
            extension: extension.into(),
            route_policy: RoutePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_route_policy(mut self, route_policy: RoutePolicy) -> Self {
        self.route_policy = route_policy;
        self
    }

    pub fn route_policy(&self) -> RoutePolicy {
        self.route_policy
    }

    /// All registered definitions, ordered by identifier.
    pub fn list_definitions(&self) -> Vec<Arc<Definition>> {
        let mut definitions = self.registry.list();
        definitions.sort_by(|a, b| a.id().cmp(b.id()));
        definitions
    }

    /// Looks up one definition. A malformed identifier is reported as not found.
    pub fn get_definition(&self, id: &str) -> Result<Arc<Definition>, ApiError> {
        let parsed = DefinitionId::parse(id).map_err(|_| ApiError::NotFound(id.to_string()))?;
        self.registry
            .get(&parsed)
            .map_err(|_| ApiError::NotFound(id.to_string()))
    }

    /// Validates `body` and writes it as `<id>.<ext>`.
    ///
    /// The canonical encoding goes to a hidden temporary file first and is
    /// then renamed into place, so the watch loop never reads a partial
    /// file. The registry itself is not touched.
    ///
    /// # Errors
    ///
    /// - `ApiError::InvalidDefinition` for a bad identifier or body
    /// - `ApiError::RouteConflict` under [`RoutePolicy::RejectDuplicates`]
    /// - `ApiError::Write` if the file cannot be written
    pub async fn create_or_replace_file(&self, id: &str, body: &[u8]) -> Result<PathBuf, ApiError> {
        let id = DefinitionId::parse(id)?;
        let definition = codec::load(id, body, FileTimestamps::default())?;

        if self.route_policy == RoutePolicy::RejectDuplicates {
            self.check_route_free(&definition)?;
        }

        let bytes = codec::encode(&definition)?;
        let target = self.path_of(definition.id());
        let temp = self
            .directory
            .join(format!(".{}.tmp", definition.id().file_name(&self.extension)));

        write_atomically(&temp, &target, &bytes).await?;
        info!(id = %definition.id(), path = %target.display(), "Definition file written");
        Ok(target)
    }

    /// Removes the file of one definition.
    ///
    /// # Errors
    ///
    /// - `ApiError::NotFound` if there is no such file
    /// - `ApiError::Delete` if removal fails for another reason
    pub async fn delete_file(&self, id: &str) -> Result<(), ApiError> {
        let parsed = DefinitionId::parse(id).map_err(|_| ApiError::NotFound(id.to_string()))?;
        let path = self.path_of(&parsed);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(id = %parsed, "Definition file deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ApiError::NotFound(id.to_string()))
            }
            Err(source) => Err(ApiError::Delete { path, source }),
        }
    }

    /// Removes every managed file in the directory and returns how many
    /// were deleted. Stops at the first failure.
    ///
    /// # Errors
    ///
    /// - `ApiError::ReadDir` if the directory cannot be listed
    /// - `ApiError::Delete` for the first file that cannot be removed
    pub async fn delete_all_files(&self) -> Result<usize, ApiError> {
        let read_dir_error = |source| ApiError::ReadDir {
            path: self.directory.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(read_dir_error)?;

        let mut deleted = 0;
        while let Some(entry) = entries.next_entry().await.map_err(read_dir_error)? {
            let path = entry.path();
            if !is_managed_file(&path, &self.extension) {
                continue;
            }
            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {}
                _ => continue,
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "File already gone");
                }
                Err(source) => return Err(ApiError::Delete { path, source }),
            }
        }

        info!(deleted, dir = %self.directory.display(), "Deleted all definition files");
        Ok(deleted)
    }

    /// Returns the payload a mocked request for `route` and `verb` gets.
    ///
    /// # Errors
    ///
    /// - `ApiError::RouteNotFound` if no definition serves the route
    /// - `ApiError::ResponseNotDefined` if the definition has no payload for the verb
    pub fn mocked_response(&self, route: &str, verb: Verb) -> Result<Value, ApiError> {
        let definition = self
            .registry
            .find_by_route(route)
            .ok_or_else(|| ApiError::RouteNotFound(route.to_string()))?;

        definition
            .response(verb)
            .cloned()
            .ok_or_else(|| ApiError::ResponseNotDefined {
                id: definition.id().clone(),
                verb,
            })
    }

    fn check_route_free(&self, definition: &Definition) -> Result<(), ApiError> {
        let conflict = self
            .list_definitions()
            .into_iter()
            .find(|other| other.id() != definition.id() && other.matches_route(definition.url()));

        match conflict {
            Some(existing) => Err(ApiError::RouteConflict {
                route: definition.url().to_string(),
                existing: existing.id().clone(),
            }),
            None => Ok(()),
        }
    }

    fn path_of(&self, id: &DefinitionId) -> PathBuf {
        self.directory.join(id.file_name(&self.extension))
    }
}

/// Writes `bytes` to `temp` and renames it over `target`.
async fn write_atomically(temp: &Path, target: &Path, bytes: &[u8]) -> Result<(), ApiError> {
    if let Err(source) = tokio::fs::write(temp, bytes).await {
        cleanup(temp).await;
        return Err(ApiError::Write {
            path: temp.to_path_buf(),
            source,
        });
    }

    if let Err(source) = tokio::fs::rename(temp, target).await {
        cleanup(temp).await;
        return Err(ApiError::Write {
            path: target.to_path_buf(),
            source,
        });
    }

    Ok(())
}

async fn cleanup(temp: &Path) {
    if let Err(e) = tokio::fs::remove_file(temp).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %temp.display(), error = %e, "Failed to remove temporary file");
        }
    }
}
