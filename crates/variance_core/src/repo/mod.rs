//! Persistence of handler configs and category trees.
//!
//! # Responsibility
//! - Define the storage contract used by the handler service.
//! - Keep file and JSON details inside the repository boundary.
//!
//! # Invariants
//! - The layer index is never persisted as a source of truth; it is rebuilt
//!   from the document on load.

pub mod config_repo;
