//! Event-driven watch loop.
//!
//! Subscribes to filesystem notifications for the managed directory and
//! applies each change to the registry as it happens. If the notification
//! stream dies the loop ends; the reconciliation sweep keeps the registry
//! correct from then on.

use std::path::{Path, PathBuf};

use dyna_core::{is_managed_file, DefinitionId};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::registry::Registry;
use crate::scan::{read_definition, FileError};

/// A filesystem subscription on one directory.
///
/// Notifications are produced on the backend's own thread and forwarded
/// into an unbounded channel so the async loop can await them.
pub struct DirectoryWatcher {
    directory: PathBuf,
    // Dropping the watcher ends the subscription
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl DirectoryWatcher {
    /// Subscribes to changes in `directory` (non-recursive).
    ///
    /// # Errors
    ///
    /// Returns the backend error if the watcher cannot be created or the
    /// directory cannot be watched (missing, permission denied, inotify
    /// limits, ...).
    pub fn new(directory: &Path) -> notify::Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            // Receiver gone means the loop already stopped
            let _ = tx.send(result);
        })?;
        watcher.watch(directory, RecursiveMode::NonRecursive)?;

        Ok(Self {
            directory: directory.to_path_buf(),
            _watcher: watcher,
            events,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// What a notification means for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    /// Re-read the file; upsert if valid, remove if it is gone.
    Reload(PathBuf),
    /// The file no longer exists under this name.
    Remove(PathBuf),
}

/// Runs the watch loop until cancelled or the notification stream closes.
pub async fn run_watch_loop(
    mut watcher: DirectoryWatcher,
    registry: Registry,
    extension: String,
    cancel_token: CancellationToken,
) {
    info!(dir = %watcher.directory().display(), "Watching mock directory");

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                info!("Watch loop shutting down");
                break;
            }

            next = watcher.events.recv() => {
                match next {
                    Some(Ok(event)) => {
                        for change in classify(event, &extension) {
                            apply_change(&registry, change).await;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Filesystem watcher reported an error");
                    }
                    None => {
                        error!(
                            "Filesystem notification stream closed, relying on reconciliation sweep"
                        );
                        break;
                    }
                }
            }
        }
    }

    debug!("Watch loop task completed");
}

/// Maps a notification to per-path changes, keeping only managed files.
fn classify(event: Event, extension: &str) -> Vec<Change> {
    let Event { kind, paths, .. } = event;
    let managed = |path: &PathBuf| is_managed_file(path, extension);

    match kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
            .into_iter()
            .filter(managed)
            .map(Change::Remove)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut paths = paths.into_iter();
            let from = paths.next().filter(managed).map(Change::Remove);
            let to = paths.next().filter(managed).map(Change::Reload);
            from.into_iter().chain(to).collect()
        }
        // Create, data/metadata modification, rename target, and the
        // ambiguous kinds: reading the file tells us what happened.
        _ => paths
            .into_iter()
            .filter(managed)
            .map(Change::Reload)
            .collect(),
    }
}

/// Applies one change to the registry.
///
/// Invalid content leaves any previous entry in place; the next valid write
/// or the next sweep replaces it.
async fn apply_change(registry: &Registry, change: Change) {
    match change {
        Change::Remove(path) => match DefinitionId::from_path(&path) {
            Ok(id) => {
                debug!(id = %id, "Definition file removed");
                registry.remove(&id);
            }
            Err(e) => {
                trace!(path = %path.display(), error = %e, "Ignoring removal of unmanaged name");
            }
        },
        Change::Reload(path) => {
            let read_path = path.clone();
            let read = tokio::task::spawn_blocking(move || read_definition(&read_path));
            let result = match read.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Definition read task failed");
                    return;
                }
            };

            match result {
                Ok(definition) => {
                    registry.upsert(definition);
                }
                Err(e) if e.is_not_found() => {
                    // Removed between the notification and the read
                    if let Ok(id) = DefinitionId::from_path(&path) {
                        registry.remove(&id);
                    }
                }
                Err(FileError::Definition(e)) => {
                    warn!(path = %path.display(), error = %e, "Ignoring invalid definition change");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read changed definition");
                }
            }
        }
    }
}
