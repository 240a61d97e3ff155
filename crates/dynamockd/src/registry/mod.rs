//! Definition registry: the in-memory, read-authoritative view of the
//! mock directory.
//!
//! The registry is the only shared mutable state in the daemon. Both change
//! detection loops and the definition API hold a cheap clone of the same
//! [`Registry`] handle; every operation takes one store-wide lock for the
//! duration of an in-memory mutation and never performs I/O under it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   upsert/remove   ┌─────────────────────┐
//! │   Watch loop    │──────────────────▶│                     │
//! └─────────────────┘                   │      Registry       │
//! ┌─────────────────┐   replace_all     │  Mutex<HashMap<     │
//! │ Reconcile sweep │──────────────────▶│   DefinitionId,     │
//! └─────────────────┘                   │   Arc<Definition>>> │
//! ┌──────────────────┐   list/get       │                     │
//! │ DefinitionService│◀─────────────────│                     │
//! └──────────────────┘                  └──────────┬──────────┘
//!                                                  │ RegistryEvent
//!                                                  ▼
//!                                          broadcast::Sender
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - The lock is a `parking_lot::Mutex`, so there is no poisoning to handle
//! - Event publishing ignores the "no subscribers" case

mod events;
mod store;

pub use events::{RegistryEvent, ReloadSummary, UpsertOutcome};
pub use store::{Registry, RegistryError};
