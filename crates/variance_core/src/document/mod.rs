//! Layered document collaborator contract.
//!
//! # Responsibility
//! - Describe what the engine needs from a document decoder/compositor:
//!   open-by-path, deep copy, group/leaf discrimination, per-node visibility
//!   and rasterization.
//! - Provide an outline projection of any document tree.
//!
//! # Invariants
//! - `children()` lists siblings in native bottom-to-top stacking order.
//! - Deep copies (`Clone`) share no mutable state with the original.

pub mod memory;

use crate::error::ErrorKind;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Errors reported by document collaborators.
#[derive(Debug)]
pub enum DocumentError {
    /// Document file cannot be read.
    Io { path: PathBuf, source: std::io::Error },
    /// Document file cannot be decoded.
    Decode { path: PathBuf, message: String },
    /// Rasterization failed.
    Composite(String),
}

impl DocumentError {
    /// Returns the coarse error class.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Invariant
    }
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read document `{}`: {source}", path.display())
            }
            Self::Decode { path, message } => {
                write!(f, "failed to decode document `{}`: {message}", path.display())
            }
            Self::Composite(message) => write!(f, "failed to composite document: {message}"),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// One group or leaf layer of a layered document.
pub trait DocumentNode: Sized {
    /// Display name.
    fn name(&self) -> &str;
    /// Returns whether this node is a group.
    fn is_group(&self) -> bool;
    /// Children in bottom-to-top order; empty for leaves.
    fn children(&self) -> &[Self];
    /// Mutable children in bottom-to-top order; empty for leaves.
    fn children_mut(&mut self) -> &mut [Self];
    fn is_visible(&self) -> bool;
    fn set_visible(&mut self, visible: bool);
}

/// Decoded layered document.
pub trait LayeredDocument: Clone {
    type Node: DocumentNode;
    /// Rasterized output of [`LayeredDocument::composite`].
    type Image;

    /// Returns the root group.
    fn root(&self) -> &Self::Node;
    fn root_mut(&mut self) -> &mut Self::Node;
    /// Merges visible leaves into one image using the document's own
    /// blending and stacking rules. `force` skips any cached preview.
    fn composite(&self, force: bool) -> Result<Self::Image, DocumentError>;
}

/// Opens layered documents by path.
pub trait DocumentOpener {
    type Document: LayeredDocument;

    fn open(&self, path: &Path) -> Result<Self::Document, DocumentError>;
}

/// Nested name tree of a document, in native child order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOutline {
    pub name: String,
    pub children: Vec<DocumentOutline>,
}

impl DocumentOutline {
    /// Builds the outline of `node` and all its descendants.
    pub fn of<N: DocumentNode>(node: &N) -> Self {
        Self {
            name: node.name().to_string(),
            children: node.children().iter().map(Self::of).collect(),
        }
    }
}
