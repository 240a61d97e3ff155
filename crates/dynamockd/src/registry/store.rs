//! Lock-protected definition store.

use std::collections::HashMap;
use std::sync::Arc;

use dyna_core::{Definition, DefinitionId};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::events::{RegistryEvent, ReloadSummary, UpsertOutcome};

/// Event channel capacity.
const EVENT_BUFFER: usize = 256;

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors returned by registry lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No definition is registered under this identifier.
    #[error("definition not found: {0}")]
    NotFound(DefinitionId),
}

// ============================================================================
// Registry
// ============================================================================

/// Shared handle to the definition store.
///
/// Cloning is cheap; all clones see the same map. Definitions are stored as
/// `Arc<Definition>` and always replaced whole, so a reader either sees the
/// old version or the new one, never a mix of response slots.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

struct Inner {
    entries: Mutex<HashMap<DefinitionId, Arc<Definition>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Returns a snapshot of all definitions, in no particular order.
    pub fn list(&self) -> Vec<Arc<Definition>> {
        self.inner.entries.lock().values().cloned().collect()
    }

    /// Looks up a definition by identifier.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the identifier is not registered.
    pub fn get(&self, id: &DefinitionId) -> Result<Arc<Definition>, RegistryError> {
        self.inner
            .entries
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Returns true if the identifier is registered.
    pub fn contains(&self, id: &DefinitionId) -> bool {
        self.inner.entries.lock().contains_key(id)
    }

    /// Finds the definition serving `route`.
    ///
    /// If several definitions share a route, the one with the smallest
    /// identifier wins so the answer does not depend on map order.
    pub fn find_by_route(&self, route: &str) -> Option<Arc<Definition>> {
        self.inner
            .entries
            .lock()
            .values()
            .filter(|definition| definition.matches_route(route))
            .min_by(|a, b| a.id().cmp(b.id()))
            .cloned()
    }

    /// Inserts or fully replaces the definition under its identifier.
    ///
    /// The new value is visible to every caller as soon as this returns.
    pub fn upsert(&self, definition: Definition) -> UpsertOutcome {
        let id = definition.id().clone();
        let definition = Arc::new(definition);

        let outcome = {
            let mut entries = self.inner.entries.lock();
            match entries.insert(id.clone(), Arc::clone(&definition)) {
                None => UpsertOutcome::Inserted,
                Some(previous) if *previous == *definition => UpsertOutcome::Unchanged,
                Some(_) => UpsertOutcome::Replaced,
            }
        };

        match outcome {
            UpsertOutcome::Unchanged => {
                trace!(id = %id, "Definition unchanged");
            }
            UpsertOutcome::Inserted | UpsertOutcome::Replaced => {
                let replaced = outcome == UpsertOutcome::Replaced;
                debug!(id = %id, replaced, route = definition.url(), "Definition upserted");
                self.publish(RegistryEvent::Upserted { id, replaced });
            }
        }

        outcome
    }

    /// Removes a definition.
    ///
    /// Removing an identifier that is not registered is a no-op: the watch
    /// loop and the reconciliation sweep can both observe the same deletion.
    /// Returns true if an entry was actually removed.
    pub fn remove(&self, id: &DefinitionId) -> bool {
        let removed = self.inner.entries.lock().remove(id).is_some();

        if removed {
            debug!(id = %id, "Definition removed");
            self.publish(RegistryEvent::Removed { id: id.clone() });
        } else {
            debug!(id = %id, "Definition already absent, nothing to remove");
        }

        removed
    }

    /// Replaces the whole content with a freshly scanned set.
    ///
    /// The swap happens under a single lock acquisition. If the set contains
    /// the same identifier twice, the last one wins.
    pub fn replace_all(&self, definitions: impl IntoIterator<Item = Definition>) -> ReloadSummary {
        let fresh: HashMap<DefinitionId, Arc<Definition>> = definitions
            .into_iter()
            .map(|definition| (definition.id().clone(), Arc::new(definition)))
            .collect();

        let summary = {
            let mut entries = self.inner.entries.lock();
            let mut summary = ReloadSummary {
                total: fresh.len(),
                ..ReloadSummary::default()
            };
            for (id, definition) in &fresh {
                match entries.get(id) {
                    None => summary.added += 1,
                    Some(previous) if previous == definition => {}
                    Some(_) => summary.updated += 1,
                }
            }
            summary.removed = entries.keys().filter(|id| !fresh.contains_key(*id)).count();
            *entries = fresh;
            summary
        };

        if summary.has_changes() {
            debug!(
                added = summary.added,
                updated = summary.updated,
                removed = summary.removed,
                total = summary.total,
                "Registry reloaded"
            );
        }
        self.publish(RegistryEvent::Reloaded(summary));

        summary
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns true if no definition is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to registry events.
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: RegistryEvent) {
        // No subscribers is the normal case
        let _ = self.inner.events.send(event);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}
