//! Document layer index.
//!
//! # Responsibility
//! - Map path identifiers (`"1-0"`) onto indexed document nodes.
//! - Detect duplicate layer names and duplicate sibling category names.
//! - Resolve names into leaf identifiers, expanding groups depth-first.
//! - Apply a resolved identifier set onto a document copy.
//!
//! # Invariants
//! - Sibling order is reversed before numbering, so index `0` is the topmost
//!   node of its group.
//! - The document root is never indexed.
//! - The index is rebuilt from the document and never edited afterwards.

use crate::document::DocumentNode;
use crate::error::ErrorKind;
use crate::model::category::{CategoryError, CategoryId, CategoryTree};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Separator between path identifier levels.
pub const PATH_SEPARATOR: char = '-';

/// Errors from layer index operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Name is neither a path identifier nor a display name.
    LayerNotFound(String),
    /// Several document layers share these display names.
    DuplicateLayerNames(Vec<String>),
    /// Name is already used by a document layer.
    NameTaken(String),
    /// Name is a document path identifier.
    PathIdTaken(String),
    /// Name is the root category's own name.
    RootNameTaken(String),
    /// Sibling categories share these names.
    DuplicateCategoryNames { parent: String, names: Vec<String> },
    /// Tree walk failed.
    Category(CategoryError),
}

impl IndexError {
    /// Returns the coarse error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Category(err) => err.kind(),
            _ => ErrorKind::Invariant,
        }
    }
}

impl Display for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LayerNotFound(name) => write!(f, "layer not found in document: `{name}`"),
            Self::DuplicateLayerNames(names) => {
                write!(f, "duplicate layer names: {}", names.join(", "))
            }
            Self::NameTaken(name) => write!(f, "name already used by a layer: `{name}`"),
            Self::PathIdTaken(name) => {
                write!(f, "name already used as a layer identifier: `{name}`")
            }
            Self::RootNameTaken(name) => {
                write!(f, "name is reserved for the root category: `{name}`")
            }
            Self::DuplicateCategoryNames { parent, names } => write!(
                f,
                "duplicate sibling category names under `{parent}`: {}",
                names.join(", ")
            ),
            Self::Category(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IndexError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Category(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CategoryError> for IndexError {
    fn from(value: CategoryError) -> Self {
        Self::Category(value)
    }
}

/// Kind of an indexed document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexedKind {
    Group { child_count: usize },
    Leaf,
}

/// One indexed document node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedLayer {
    pub path: String,
    pub name: String,
    pub kind: IndexedKind,
}

impl IndexedLayer {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, IndexedKind::Group { .. })
    }
}

/// Path-identifier index over one document, in depth-first order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerIndex {
    entries: IndexMap<String, IndexedLayer>,
}

impl LayerIndex {
    /// Indexes every descendant of `root`.
    pub fn build<N: DocumentNode>(root: &N) -> Self {
        let mut index = Self::default();
        index.walk(root, None);
        index
    }

    fn walk<N: DocumentNode>(&mut self, node: &N, prefix: Option<&str>) {
        for (position, child) in node.children().iter().rev().enumerate() {
            let path = child_path(prefix, position);
            let kind = if child.is_group() {
                IndexedKind::Group {
                    child_count: child.children().len(),
                }
            } else {
                IndexedKind::Leaf
            };
            self.entries.insert(
                path.clone(),
                IndexedLayer {
                    path: path.clone(),
                    name: child.name().to_string(),
                    kind,
                },
            );
            if child.is_group() {
                self.walk(child, Some(&path));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a node by path identifier.
    pub fn get(&self, path: &str) -> Option<&IndexedLayer> {
        self.entries.get(path)
    }

    /// Iterates indexed nodes in depth-first order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexedLayer> {
        self.entries.values()
    }

    /// Returns whether any indexed node uses `name` as display name.
    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.values().any(|entry| entry.name == name)
    }

    /// Resolves a path identifier, or else the first node with that display name.
    pub fn resolve(&self, name: &str) -> Option<&IndexedLayer> {
        self.entries
            .get(name)
            .or_else(|| self.entries.values().find(|entry| entry.name == name))
    }

    /// Identifier -> display name map for diagnostics.
    pub fn layer_dict(&self) -> IndexMap<String, String> {
        self.entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.name.clone()))
            .collect()
    }

    /// Fails when two indexed nodes share a display name.
    pub fn check_duplicate_names(&self) -> Result<(), IndexError> {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.name.as_str()).or_default() += 1;
        }
        let duplicates: Vec<String> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name.to_string())
            .collect();
        if duplicates.is_empty() {
            return Ok(());
        }
        Err(IndexError::DuplicateLayerNames(duplicates))
    }

    /// Fails when `name` is already a document display name.
    pub fn ensure_name_available(&self, name: &str) -> Result<(), IndexError> {
        if self.contains_name(name) {
            return Err(IndexError::NameTaken(name.to_string()));
        }
        Ok(())
    }

    /// Checks a new category name against document names and identifiers,
    /// the root category's name and the siblings under `parent`.
    pub fn ensure_category_name_available(
        &self,
        tree: &CategoryTree,
        parent: CategoryId,
        name: &str,
    ) -> Result<(), IndexError> {
        self.ensure_name_available(name)?;
        if self.entries.contains_key(name) {
            return Err(IndexError::PathIdTaken(name.to_string()));
        }
        if tree.name(tree.root())? == name {
            return Err(IndexError::RootNameTaken(name.to_string()));
        }
        if tree.get_sub(parent, name).is_some() {
            return Err(IndexError::DuplicateCategoryNames {
                parent: tree.name(parent)?.to_string(),
                names: vec![name.to_string()],
            });
        }
        Ok(())
    }

    /// Fails when any category has two sub-categories with the same name.
    pub fn check_category_names(tree: &CategoryTree) -> Result<(), IndexError> {
        for id in tree.iter_preorder() {
            let mut seen = HashMap::new();
            let mut duplicates = Vec::new();
            for child in tree.subcategories(id)? {
                let name = tree.name(child)?;
                let count = seen.entry(name).or_insert(0usize);
                *count += 1;
                if *count == 2 {
                    duplicates.push(name.to_string());
                }
            }
            if !duplicates.is_empty() {
                return Err(IndexError::DuplicateCategoryNames {
                    parent: tree.name(id)?.to_string(),
                    names: duplicates,
                });
            }
        }
        Ok(())
    }

    /// Returns the leaf identifiers under `path`, depth-first; a leaf yields
    /// itself.
    pub fn leaf_ids(&self, path: &str) -> Result<Vec<String>, IndexError> {
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| IndexError::LayerNotFound(path.to_string()))?;
        match entry.kind {
            IndexedKind::Leaf => Ok(vec![entry.path.clone()]),
            IndexedKind::Group { child_count } => {
                let mut output = Vec::new();
                for position in 0..child_count {
                    output.extend(self.leaf_ids(&child_path(Some(path), position))?);
                }
                Ok(output)
            }
        }
    }

    /// Resolves names (path identifiers or display names) into leaf
    /// identifiers, expanding groups.
    pub fn parse_layer<I, S>(&self, names: I) -> Result<IndexSet<String>, IndexError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut output = IndexSet::new();
        for name in names {
            let name = name.as_ref();
            let entry = self
                .resolve(name)
                .ok_or_else(|| IndexError::LayerNotFound(name.to_string()))?;
            output.extend(self.leaf_ids(&entry.path)?);
        }
        Ok(output)
    }
}

/// Forces every group visible and shows exactly the leaves in `visible`.
///
/// Paths are computed with the same numbering as [`LayerIndex::build`].
pub fn apply_visible_set<N: DocumentNode>(root: &mut N, visible: &IndexSet<String>) {
    root.set_visible(true);
    apply_children(root, None, visible);
}

fn apply_children<N: DocumentNode>(node: &mut N, prefix: Option<&str>, visible: &IndexSet<String>) {
    for (position, child) in node.children_mut().iter_mut().rev().enumerate() {
        let path = child_path(prefix, position);
        if child.is_group() {
            child.set_visible(true);
            apply_children(child, Some(&path), visible);
        } else {
            child.set_visible(visible.contains(&path));
        }
    }
}

fn child_path(prefix: Option<&str>, position: usize) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{PATH_SEPARATOR}{position}"),
        None => position.to_string(),
    }
}
