//! Persisted category tree shape.
//!
//! A category serializes as
//! `{ name, mode, subcategories: [[member, visible], ...], layers: [...] }`
//! where `member` is either a nested category object or a layer name. Flags
//! are only stored inside the member pairs.

use serde::{Deserialize, Serialize};

/// Wire form of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub name: String,
    /// Kept as text so unknown modes surface as a mode error, not a parse error.
    pub mode: String,
    #[serde(default)]
    pub subcategories: Vec<(MemberRecord, bool)>,
    /// Mirrors the layer names of a layer container; empty otherwise.
    #[serde(default)]
    pub layers: Vec<String>,
}

/// One entry of a `subcategories` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberRecord {
    Layer(String),
    Category(CategoryRecord),
}
