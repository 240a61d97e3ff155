//! Mock definition entity and its response slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DefinitionId, Verb};

// ============================================================================
// Responses
// ============================================================================

/// Canned payloads, one optional slot per mocked verb.
///
/// A missing or `null` slot means the verb is not mocked. Callers must get
/// `None` back for such a slot, never an empty object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Responses {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Value>,
}

impl Responses {
    /// Returns the payload for a verb, or `None` if the verb is not mocked.
    pub fn slot(&self, verb: Verb) -> Option<&Value> {
        match verb {
            Verb::Get => self.get.as_ref(),
            Verb::Post => self.post.as_ref(),
            Verb::Patch => self.patch.as_ref(),
            Verb::Delete => self.delete.as_ref(),
        }
    }

    /// Sets (or clears) the payload for a verb.
    pub fn set(&mut self, verb: Verb, payload: Option<Value>) {
        let slot = match verb {
            Verb::Get => &mut self.get,
            Verb::Post => &mut self.post,
            Verb::Patch => &mut self.patch,
            Verb::Delete => &mut self.delete,
        };
        *slot = payload;
    }

    /// Builder-style variant of [`Responses::set`].
    #[must_use]
    pub fn with(mut self, verb: Verb, payload: Value) -> Self {
        self.set(verb, Some(payload));
        self
    }

    /// Iterates over the defined slots in file order.
    pub fn iter(&self) -> impl Iterator<Item = (Verb, &Value)> + '_ {
        Verb::ALL
            .into_iter()
            .filter_map(move |verb| self.slot(verb).map(|payload| (verb, payload)))
    }

    /// Verbs that have a payload.
    pub fn defined_verbs(&self) -> Vec<Verb> {
        self.iter().map(|(verb, _)| verb).collect()
    }

    /// Returns true if no verb is mocked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Creation and modification times of the backing file.
///
/// Either value may be missing when the platform does not report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileTimestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Definition
// ============================================================================

/// One mock API record: a route and its per-verb canned responses.
///
/// The identifier comes from the backing file name and cannot change; a
/// renamed file produces a different definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Definition {
    id: DefinitionId,
    url: String,
    responses: Responses,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified_at: Option<DateTime<Utc>>,
}

impl Definition {
    /// Creates a definition without file timestamps.
    pub fn new(id: DefinitionId, url: impl Into<String>, responses: Responses) -> Self {
        Self {
            id,
            url: url.into(),
            responses,
            created_at: None,
            modified_at: None,
        }
    }

    /// Attaches the backing file's timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, timestamps: FileTimestamps) -> Self {
        self.created_at = timestamps.created_at;
        self.modified_at = timestamps.modified_at;
        self
    }

    pub fn id(&self) -> &DefinitionId {
        &self.id
    }

    /// The route this definition is served at, as written in the file.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn responses(&self) -> &Responses {
        &self.responses
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    /// Returns the canned payload for a verb, `None` if it is not defined.
    pub fn response(&self, verb: Verb) -> Option<&Value> {
        self.responses.slot(verb)
    }

    /// Checks whether this definition serves `route`.
    ///
    /// A single leading `/` is ignored on both sides, so `"/users"` and
    /// `"users"` name the same route.
    #[must_use]
    pub fn matches_route(&self, route: &str) -> bool {
        normalize_route(&self.url) == normalize_route(route)
    }

    /// Compares route and responses, ignoring identifier and timestamps.
    #[must_use]
    pub fn same_content(&self, other: &Definition) -> bool {
        self.url == other.url && self.responses == other.responses
    }
}

/// Strips one leading `/` from a route.
pub(crate) fn normalize_route(route: &str) -> &str {
    route.strip_prefix('/').unwrap_or(route)
}
