//! Decoding, validation and canonical encoding of definition files.
//!
//! A definition file carries only the route and the responses; the
//! identifier comes from the file name and timestamps from file metadata:
//!
//! ```json
//! {
//!   "url": "/users",
//!   "responses": {
//!     "get": [{"id": 1}],
//!     "post": {"created": true}
//!   }
//! }
//! ```
//!
//! Decoding is lenient about unknown keys (older files carried a `name`),
//! validation is strict about the fields that matter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Definition, DefinitionError, DefinitionId, DefinitionResult, FileTimestamps, Responses};

/// On-disk shape of a definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawDefinition {
    /// Route the definition is served at. Defaults to empty so a missing
    /// field surfaces as a validation error on `url`.
    #[serde(default)]
    pub url: String,
    pub responses: Responses,
}

/// Decodes file content into a definition.
///
/// # Errors
///
/// Returns `DefinitionError::Decode` if the bytes are not a JSON object with
/// a `responses` object.
pub fn parse(id: DefinitionId, bytes: &[u8]) -> DefinitionResult<Definition> {
    let raw: RawDefinition = serde_json::from_slice(bytes).map_err(DefinitionError::decode)?;
    Ok(Definition::new(id, raw.url, raw.responses))
}

/// Checks the structural rules of a decoded definition.
///
/// - the identifier is a valid file stem
/// - `url` is non-empty and contains no whitespace, query or fragment
/// - every present response slot is a JSON object or array
///
/// # Errors
///
/// Returns the first `DefinitionError::Validation` found, naming the field.
pub fn validate(definition: &Definition) -> DefinitionResult<()> {
    DefinitionId::parse(definition.id().as_str())
        .map_err(|e| DefinitionError::validation("id", e.to_string()))?;

    let url = definition.url();
    if url.trim().is_empty() {
        return Err(DefinitionError::validation("url", "must not be empty"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(DefinitionError::validation("url", "must not contain whitespace"));
    }
    if url.contains('?') || url.contains('#') {
        return Err(DefinitionError::validation(
            "url",
            "must be a path without query or fragment",
        ));
    }

    for (verb, payload) in definition.responses().iter() {
        if !matches!(payload, Value::Object(_) | Value::Array(_)) {
            return Err(DefinitionError::validation(
                format!("responses.{}", verb.as_str()),
                format!("expected a JSON object or array, found {}", kind_of(payload)),
            ));
        }
    }

    Ok(())
}

/// Decodes and validates file content, attaching file timestamps.
///
/// This is the single entry point used by the directory scan, the watch
/// loop and the definition API.
///
/// # Errors
///
/// Returns `DefinitionError::Decode` or `DefinitionError::Validation`.
pub fn load(
    id: DefinitionId,
    bytes: &[u8],
    timestamps: FileTimestamps,
) -> DefinitionResult<Definition> {
    let definition = parse(id, bytes)?.with_timestamps(timestamps);
    validate(&definition)?;
    Ok(definition)
}

/// Encodes a definition in the canonical file layout (pretty-printed).
///
/// # Errors
///
/// Returns `DefinitionError::Decode` if serialization fails, which only
/// happens for payloads serde cannot represent.
pub fn encode(definition: &Definition) -> DefinitionResult<Vec<u8>> {
    let raw = RawDefinition {
        url: definition.url().to_string(),
        responses: definition.responses().clone(),
    };
    let mut bytes = serde_json::to_vec_pretty(&raw).map_err(DefinitionError::decode)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
