//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur while identifying, decoding or validating a definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Identifier is not usable as a file stem
    #[error("Invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: String },

    /// Content is not a decodable definition document
    #[error("Failed to decode definition: {reason}")]
    Decode { reason: String },

    /// Decoded content violates a structural rule
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },
}

impl DefinitionError {
    /// Creates a validation error for the given field.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a decode error from any displayable error.
    pub fn decode<E: std::fmt::Display>(err: E) -> Self {
        Self::Decode {
            reason: err.to_string(),
        }
    }

    /// Returns the offending field for validation errors.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for definition operations.
pub type DefinitionResult<T> = Result<T, DefinitionError>;
