//! Registry events and mutation outcomes.

use dyna_core::DefinitionId;

/// Result of a single `upsert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No entry existed for the identifier.
    Inserted,
    /// An entry existed and was replaced wholesale.
    Replaced,
    /// An identical entry existed; the store is unchanged.
    Unchanged,
}

/// Counts produced by a wholesale `replace_all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Identifiers that were not present before
    pub added: usize,
    /// Identifiers present before whose content changed
    pub updated: usize,
    /// Identifiers that disappeared
    pub removed: usize,
    /// Total entries after the reload
    pub total: usize,
}

impl ReloadSummary {
    /// Returns true if the reload changed anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.updated > 0 || self.removed > 0
    }
}

/// Events published by the registry after each effective mutation.
///
/// Events are sent after the lock is released. Subscribers that fall behind
/// lose events instead of slowing writers down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A definition was inserted or replaced.
    Upserted {
        id: DefinitionId,
        /// Whether an older version was replaced
        replaced: bool,
    },

    /// A definition was removed.
    Removed { id: DefinitionId },

    /// The whole content was swapped by a directory scan.
    Reloaded(ReloadSummary),
}
