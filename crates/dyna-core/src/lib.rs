//! Dynamocker Core - Shared types for mock API definitions
//!
//! This crate provides the domain types shared between the daemon
//! (`dynamockd`) and anything that mounts an HTTP layer on top of it:
//! - `DefinitionId` - file-derived identity of a definition
//! - `Definition` / `Responses` - a route plus its per-verb canned payloads
//! - `codec` - decoding, validation and canonical encoding of definition files
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod codec;
pub mod definition;
pub mod error;
pub mod id;
pub mod verb;

// Re-exports for convenience
pub use codec::{encode, load, parse, validate, RawDefinition};
pub use definition::{Definition, FileTimestamps, Responses};
pub use error::{DefinitionError, DefinitionResult};
pub use id::{is_managed_file, DefinitionId, DEFAULT_EXTENSION, MAX_ID_LEN};
pub use verb::Verb;
