//! Dynamocker daemon library.
//!
//! Keeps an in-memory registry of mock definitions consistent with the
//! directory of JSON files it is loaded from.
//!
//! - [`registry`]: the shared definition store
//! - [`scan`]: loading a whole directory
//! - [`sync`]: the watch and reconciliation loops and their lifecycle
//! - [`api`]: file-backed CRUD and mocked-response lookup
//! - [`config`]: environment configuration for the daemon

pub mod api;
pub mod config;
pub mod registry;
pub mod scan;
pub mod sync;
