//! Core use-case services.
//!
//! # Responsibility
//! - Expose category edits, visibility resolution and rendering as one
//!   handler API over the tree, the layer index and the document.
//! - Keep presentation layers decoupled from tree and document details.

pub mod outline_import;
pub mod variance_service;
