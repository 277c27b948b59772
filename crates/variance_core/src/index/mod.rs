//! Binding between the category tree and a layered document.
//!
//! # Responsibility
//! - Assign path identifiers to every document node.
//! - Guard layer and category name uniqueness.
//! - Expand names into concrete leaf identifiers for rendering.

pub mod layer_index;
