//! Category tree: policy-constrained visibility engine.
//!
//! # Responsibility
//! - Store categories in an arena addressed by generation-checked handles.
//! - Enforce per-mode visibility invariants on every mutation.
//! - Resolve the tree into the de-duplicated, ordered set of visible layers.
//!
//! # Invariants
//! - A category holds either sub-categories or layer references, never both.
//! - Each member carries its own visibility flag, so flags cannot drift out of
//!   alignment with members across inserts and removals.
//! - Candidate flags are validated against the mode before being committed.
//! - Removing a category releases its whole subtree.

use crate::error::ErrorKind;
use crate::model::mode::VisibilityMode;
use crate::model::record::{CategoryRecord, MemberRecord};
use indexmap::IndexSet;
use log::debug;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Name given to the root category of a fresh tree.
pub const ROOT_CATEGORY_NAME: &str = "root";

/// Handle to one category stored in a [`CategoryTree`].
///
/// Handles of removed categories never alias a later category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CategoryId {
    index: u32,
    generation: u32,
}

impl Display for CategoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Which kind of members a category holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Nested categories.
    Categories,
    /// Leaf layer references.
    Layers,
}

impl Display for MemberKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Categories => f.write_str("categories"),
            Self::Layers => f.write_str("layers"),
        }
    }
}

/// Errors from category tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryError {
    /// Handle does not address a live category.
    HandleNotFound(CategoryId),
    /// Path segment has no matching sub-category.
    PathNotFound { segment: String, path: Vec<String> },
    /// Depth-first search found no category with this name.
    CategoryNotFound(String),
    /// Named member is neither a sub-category nor a layer of the category.
    MemberNotFound { category: String, name: String },
    /// Sibling already uses this name.
    DuplicateName { category: String, name: String },
    /// Flags do not satisfy the category's mode.
    InvariantViolation {
        category: String,
        mode: VisibilityMode,
        flags: Vec<bool>,
    },
    /// Mode string is not one of the known modes.
    UnknownMode(String),
    /// Persisted data has an unusable shape.
    InvalidData(String),
    /// Category mode is still `unk`.
    ModeUnset(String),
    /// `all` categories are always fully visible.
    ToggleForbidden(String),
    /// Hiding this member would leave a `one` category with nothing visible.
    LastVisible { category: String, name: String },
    /// Category already holds the other member kind.
    MemberKindMismatch { category: String, holds: MemberKind },
    /// Removal target is not a member of this kind under the category.
    MissingReference { category: String, name: String },
    /// Mode cannot be chosen explicitly.
    ModeNotSettable(VisibilityMode),
    /// Layer references are named by the document and cannot be renamed.
    LayerRename(String),
}

impl CategoryError {
    /// Returns the coarse error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ToggleForbidden(_)
            | Self::LastVisible { .. }
            | Self::MemberKindMismatch { .. }
            | Self::MissingReference { .. }
            | Self::ModeNotSettable(_)
            | Self::LayerRename(_) => ErrorKind::NotAllowed,
            _ => ErrorKind::Invariant,
        }
    }
}

impl Display for CategoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandleNotFound(id) => write!(f, "category handle not found: {id}"),
            Self::PathNotFound { segment, path } => write!(
                f,
                "sub-category `{segment}` not found on path {}",
                path.join("-")
            ),
            Self::CategoryNotFound(name) => write!(f, "category not found: `{name}`"),
            Self::MemberNotFound { category, name } => {
                write!(f, "`{name}` is not a member of category `{category}`")
            }
            Self::DuplicateName { category, name } => {
                write!(f, "duplicate name `{name}` in category `{category}`")
            }
            Self::InvariantViolation {
                category,
                mode,
                flags,
            } => write!(
                f,
                "category `{category}` in mode `{mode}` has invalid visibilities {flags:?}"
            ),
            Self::UnknownMode(mode) => write!(f, "unknown mode `{mode}`"),
            Self::InvalidData(message) => write!(f, "invalid category data: {message}"),
            Self::ModeUnset(category) => {
                write!(f, "category `{category}` has no mode yet")
            }
            Self::ToggleForbidden(category) => write!(
                f,
                "category `{category}` is in mode `all`; its members are always visible"
            ),
            Self::LastVisible { category, name } => write!(
                f,
                "cannot hide `{name}`: it is the only visible member of `one` category `{category}`"
            ),
            Self::MemberKindMismatch { category, holds } => {
                write!(f, "category `{category}` already holds {holds}")
            }
            Self::MissingReference { category, name } => {
                write!(f, "`{name}` cannot be removed from category `{category}`")
            }
            Self::ModeNotSettable(mode) => write!(f, "mode `{mode}` cannot be set explicitly"),
            Self::LayerRename(name) => write!(f, "layer reference `{name}` cannot be renamed"),
        }
    }
}

impl Error for CategoryError {}

/// Result type used by category tree operations.
pub type CategoryResult<T> = Result<T, CategoryError>;

#[derive(Debug, Clone)]
struct Slot<T> {
    value: T,
    visible: bool,
}

#[derive(Debug, Clone)]
enum Members {
    Categories(Vec<Slot<CategoryId>>),
    Layers(Vec<Slot<String>>),
}

impl Members {
    fn len(&self) -> usize {
        match self {
            Self::Categories(slots) => slots.len(),
            Self::Layers(slots) => slots.len(),
        }
    }

    fn kind(&self) -> MemberKind {
        match self {
            Self::Categories(_) => MemberKind::Categories,
            Self::Layers(_) => MemberKind::Layers,
        }
    }

    fn flags(&self) -> Vec<bool> {
        match self {
            Self::Categories(slots) => slots.iter().map(|slot| slot.visible).collect(),
            Self::Layers(slots) => slots.iter().map(|slot| slot.visible).collect(),
        }
    }

    fn assign_flags(&mut self, flags: &[bool]) {
        match self {
            Self::Categories(slots) => {
                for (slot, visible) in slots.iter_mut().zip(flags) {
                    slot.visible = *visible;
                }
            }
            Self::Layers(slots) => {
                for (slot, visible) in slots.iter_mut().zip(flags) {
                    slot.visible = *visible;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CategoryNode {
    name: String,
    mode: VisibilityMode,
    members: Members,
}

impl CategoryNode {
    fn empty(name: String, mode: VisibilityMode) -> Self {
        Self {
            name,
            mode,
            members: Members::Categories(Vec::new()),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    generation: u32,
    node: Option<CategoryNode>,
}

/// Arena-backed category tree with one root.
#[derive(Debug, Clone)]
pub struct CategoryTree {
    entries: Vec<Entry>,
    free: Vec<u32>,
    root: CategoryId,
}

impl Default for CategoryTree {
    fn default() -> Self {
        Self::new(ROOT_CATEGORY_NAME, VisibilityMode::All)
    }
}

impl CategoryTree {
    /// Creates a tree holding one empty root category.
    pub fn new(root_name: impl Into<String>, mode: VisibilityMode) -> Self {
        let mut tree = Self {
            entries: Vec::new(),
            free: Vec::new(),
            root: CategoryId {
                index: 0,
                generation: 0,
            },
        };
        tree.root = tree.alloc(CategoryNode::empty(root_name.into(), mode));
        tree
    }

    /// Returns the root handle.
    pub fn root(&self) -> CategoryId {
        self.root
    }

    /// Returns whether `id` addresses a live category.
    pub fn contains(&self, id: CategoryId) -> bool {
        self.node(id).is_ok()
    }

    pub fn name(&self, id: CategoryId) -> CategoryResult<&str> {
        Ok(self.node(id)?.name.as_str())
    }

    pub fn mode(&self, id: CategoryId) -> CategoryResult<VisibilityMode> {
        Ok(self.node(id)?.mode)
    }

    pub fn member_kind(&self, id: CategoryId) -> CategoryResult<MemberKind> {
        Ok(self.node(id)?.members.kind())
    }

    /// Returns the visibility flags in member order.
    pub fn visibilities(&self, id: CategoryId) -> CategoryResult<Vec<bool>> {
        Ok(self.node(id)?.members.flags())
    }

    /// Returns child category handles in insertion order.
    pub fn subcategories(&self, id: CategoryId) -> CategoryResult<Vec<CategoryId>> {
        Ok(match &self.node(id)?.members {
            Members::Categories(slots) => slots.iter().map(|slot| slot.value).collect(),
            Members::Layers(_) => Vec::new(),
        })
    }

    /// Returns layer references in insertion order.
    pub fn layers(&self, id: CategoryId) -> CategoryResult<Vec<&str>> {
        Ok(match &self.node(id)?.members {
            Members::Categories(_) => Vec::new(),
            Members::Layers(slots) => slots.iter().map(|slot| slot.value.as_str()).collect(),
        })
    }

    /// Finds the first sub-category named `name` and its member index.
    pub fn get_sub(&self, parent: CategoryId, name: &str) -> Option<(usize, CategoryId)> {
        match &self.node(parent).ok()?.members {
            Members::Categories(slots) => slots
                .iter()
                .enumerate()
                .find(|(_, slot)| self.name(slot.value).is_ok_and(|child| child == name))
                .map(|(index, slot)| (index, slot.value)),
            Members::Layers(_) => None,
        }
    }

    /// Finds the first layer reference named `name` and its member index.
    pub fn get_layer(&self, parent: CategoryId, name: &str) -> Option<(usize, &str)> {
        match &self.node(parent).ok()?.members {
            Members::Categories(_) => None,
            Members::Layers(slots) => slots
                .iter()
                .enumerate()
                .find(|(_, slot)| slot.value == name)
                .map(|(index, slot)| (index, slot.value.as_str())),
        }
    }

    /// Resolves an ancestor chain from the root (root excluded).
    ///
    /// Returns one handle per segment; an empty path yields an empty chain.
    pub fn resolve_path<S: AsRef<str>>(&self, path: &[S]) -> CategoryResult<Vec<CategoryId>> {
        let mut chain = Vec::with_capacity(path.len());
        let mut cursor = self.root;
        for segment in path {
            let segment = segment.as_ref();
            let (_, child) =
                self.get_sub(cursor, segment)
                    .ok_or_else(|| CategoryError::PathNotFound {
                        segment: segment.to_string(),
                        path: path.iter().map(|s| s.as_ref().to_string()).collect(),
                    })?;
            chain.push(child);
            cursor = child;
        }
        Ok(chain)
    }

    /// Resolves an ancestor chain and returns its last category, or the root
    /// for an empty chain.
    pub fn resolve_parent<S: AsRef<str>>(&self, path: &[S]) -> CategoryResult<CategoryId> {
        Ok(self.resolve_path(path)?.last().copied().unwrap_or(self.root))
    }

    /// Finds each name anywhere in the tree by pre-order search.
    ///
    /// The root itself takes part in the search; the first match wins.
    pub fn find_depth_first<S: AsRef<str>>(&self, names: &[S]) -> CategoryResult<Vec<CategoryId>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.find_in(self.root, name)
                    .ok_or_else(|| CategoryError::CategoryNotFound(name.to_string()))
            })
            .collect()
    }

    fn find_in(&self, id: CategoryId, name: &str) -> Option<CategoryId> {
        let node = self.node(id).ok()?;
        if node.name == name {
            return Some(id);
        }
        match &node.members {
            Members::Categories(slots) => slots
                .iter()
                .find_map(|slot| self.find_in(slot.value, name)),
            Members::Layers(_) => None,
        }
    }

    /// Flips the visibility of member `name` under the category's mode rules.
    ///
    /// - `all`: not allowed.
    /// - `unk`: fails until a mode is chosen.
    /// - `or`: flips one flag.
    /// - `one`: selects the member; hiding the selected member re-selects the
    ///   first member, and hiding the first member itself is not allowed.
    /// - `same`: every flag becomes the negation of the member's old flag.
    pub fn reverse_visibility(&mut self, parent: CategoryId, name: &str) -> CategoryResult<()> {
        let (index, flags) = self.toggle_target(parent, name)?;
        let visible = !flags[index];
        self.apply_visibility(parent, name, index, flags, visible)
    }

    /// Sets member `name` to `visible` under the category's mode rules.
    pub fn set_visibility(
        &mut self,
        parent: CategoryId,
        name: &str,
        visible: bool,
    ) -> CategoryResult<()> {
        let (index, flags) = self.toggle_target(parent, name)?;
        self.apply_visibility(parent, name, index, flags, visible)
    }

    fn toggle_target(&self, parent: CategoryId, name: &str) -> CategoryResult<(usize, Vec<bool>)> {
        let node = self.node(parent)?;
        match node.mode {
            VisibilityMode::All => return Err(CategoryError::ToggleForbidden(node.name.clone())),
            VisibilityMode::Unk => return Err(CategoryError::ModeUnset(node.name.clone())),
            VisibilityMode::Or | VisibilityMode::One | VisibilityMode::Same => {}
        }
        let index = self
            .member_index(parent, name)
            .ok_or_else(|| CategoryError::MemberNotFound {
                category: node.name.clone(),
                name: name.to_string(),
            })?;
        Ok((index, node.members.flags()))
    }

    fn apply_visibility(
        &mut self,
        parent: CategoryId,
        name: &str,
        index: usize,
        mut flags: Vec<bool>,
        visible: bool,
    ) -> CategoryResult<()> {
        let node = self.node(parent)?;
        match node.mode {
            VisibilityMode::Or => flags[index] = visible,
            VisibilityMode::One => {
                if visible {
                    flags = vec![false; flags.len()];
                    flags[index] = true;
                } else if flags[index] {
                    if index == 0 {
                        return Err(CategoryError::LastVisible {
                            category: node.name.clone(),
                            name: name.to_string(),
                        });
                    }
                    flags = VisibilityMode::One.default_flags(flags.len());
                }
            }
            VisibilityMode::Same => flags = vec![visible; flags.len()],
            VisibilityMode::All => return Err(CategoryError::ToggleForbidden(node.name.clone())),
            VisibilityMode::Unk => return Err(CategoryError::ModeUnset(node.name.clone())),
        }
        self.commit_flags(parent, flags)?;
        debug!(
            "event=visibility_set module=category status=ok member={} visible={}",
            name, visible
        );
        Ok(())
    }

    /// Appends a new sub-category and returns its handle.
    ///
    /// The first member of a category starts visible; later members follow
    /// `all`/`same` siblings and otherwise start hidden. Name uniqueness
    /// against the document is checked by the caller.
    pub fn add_sub(
        &mut self,
        parent: CategoryId,
        name: impl Into<String>,
        mode: VisibilityMode,
    ) -> CategoryResult<CategoryId> {
        let name = name.into();
        let node = self.node(parent)?;
        if let Members::Layers(slots) = &node.members {
            if !slots.is_empty() {
                return Err(CategoryError::MemberKindMismatch {
                    category: node.name.clone(),
                    holds: MemberKind::Layers,
                });
            }
        }
        if self.get_sub(parent, &name).is_some() {
            return Err(CategoryError::DuplicateName {
                category: node.name.clone(),
                name,
            });
        }
        let flags = node.members.flags();
        let visible = match (flags.first(), node.mode) {
            (None, _) => true,
            (Some(_), VisibilityMode::All) => true,
            (Some(first), VisibilityMode::Same) => *first,
            (Some(_), _) => false,
        };
        self.check_flags(parent, &appended(&flags, visible))?;

        let child = self.alloc(CategoryNode::empty(name, mode));
        let node = self.node_mut(parent)?;
        if matches!(node.members, Members::Layers(_)) {
            node.members = Members::Categories(Vec::new());
        }
        if let Members::Categories(slots) = &mut node.members {
            slots.push(Slot {
                value: child,
                visible,
            });
        }
        debug!(
            "event=category_add module=category status=ok child={} visible={}",
            child, visible
        );
        Ok(child)
    }

    /// Appends a layer reference.
    ///
    /// New references start hidden unless the mode requires otherwise:
    /// `all` shows it, `same` copies its siblings, and the first member of a
    /// `one` category is shown.
    pub fn add_layer(&mut self, parent: CategoryId, name: impl Into<String>) -> CategoryResult<()> {
        let name = name.into();
        let node = self.node(parent)?;
        if let Members::Categories(slots) = &node.members {
            if !slots.is_empty() {
                return Err(CategoryError::MemberKindMismatch {
                    category: node.name.clone(),
                    holds: MemberKind::Categories,
                });
            }
        }
        if self.get_layer(parent, &name).is_some() {
            return Err(CategoryError::DuplicateName {
                category: node.name.clone(),
                name,
            });
        }
        let flags = node.members.flags();
        let visible = match (flags.first(), node.mode) {
            (_, VisibilityMode::All) => true,
            (None, VisibilityMode::One) => true,
            (Some(first), VisibilityMode::Same) => *first,
            _ => false,
        };
        self.check_flags(parent, &appended(&flags, visible))?;

        let node = self.node_mut(parent)?;
        if matches!(node.members, Members::Categories(_)) {
            node.members = Members::Layers(Vec::new());
        }
        if let Members::Layers(slots) = &mut node.members {
            slots.push(Slot {
                value: name,
                visible,
            });
        }
        debug!(
            "event=layer_add module=category status=ok parent={} visible={}",
            parent, visible
        );
        Ok(())
    }

    /// Removes a sub-category and its whole subtree.
    pub fn remove_sub(&mut self, parent: CategoryId, name: &str) -> CategoryResult<()> {
        let Some((index, child)) = self.get_sub(parent, name) else {
            return Err(CategoryError::MissingReference {
                category: self.node(parent)?.name.clone(),
                name: name.to_string(),
            });
        };
        let flags = self.flags_after_removal(parent, index)?;
        if let Members::Categories(slots) = &mut self.node_mut(parent)?.members {
            slots.remove(index);
        }
        self.node_mut(parent)?.members.assign_flags(&flags);
        self.release(child);
        debug!(
            "event=category_remove module=category status=ok parent={} child={}",
            parent, child
        );
        Ok(())
    }

    /// Removes a layer reference.
    pub fn remove_layer(&mut self, parent: CategoryId, name: &str) -> CategoryResult<()> {
        let Some((index, _)) = self.get_layer(parent, name) else {
            return Err(CategoryError::MissingReference {
                category: self.node(parent)?.name.clone(),
                name: name.to_string(),
            });
        };
        let flags = self.flags_after_removal(parent, index)?;
        let node = self.node_mut(parent)?;
        if let Members::Layers(slots) = &mut node.members {
            slots.remove(index);
        }
        node.members.assign_flags(&flags);
        debug!(
            "event=layer_remove module=category status=ok parent={}",
            parent
        );
        Ok(())
    }

    fn flags_after_removal(&self, parent: CategoryId, index: usize) -> CategoryResult<Vec<bool>> {
        let node = self.node(parent)?;
        let mut flags = node.members.flags();
        let removed_visible = flags.remove(index);
        if node.mode == VisibilityMode::One && removed_visible && !flags.is_empty() {
            flags[0] = true;
        }
        self.check_flags(parent, &flags)?;
        Ok(flags)
    }

    /// Renames sub-category `name` under `parent`.
    pub fn rename(
        &mut self,
        parent: CategoryId,
        name: &str,
        new_name: impl Into<String>,
    ) -> CategoryResult<()> {
        let new_name = new_name.into();
        let Some((_, child)) = self.get_sub(parent, name) else {
            if self.get_layer(parent, name).is_some() {
                return Err(CategoryError::LayerRename(name.to_string()));
            }
            return Err(CategoryError::MemberNotFound {
                category: self.node(parent)?.name.clone(),
                name: name.to_string(),
            });
        };
        if new_name != name && self.get_sub(parent, &new_name).is_some() {
            return Err(CategoryError::DuplicateName {
                category: self.node(parent)?.name.clone(),
                name: new_name,
            });
        }
        self.node_mut(child)?.name = new_name;
        debug!(
            "event=category_rename module=category status=ok child={}",
            child
        );
        Ok(())
    }

    /// Changes the mode of `id` and rebuilds its flags from the mode default.
    pub fn change_mode(&mut self, id: CategoryId, mode: VisibilityMode) -> CategoryResult<()> {
        if !mode.is_settable() {
            return Err(CategoryError::ModeNotSettable(mode));
        }
        let node = self.node_mut(id)?;
        let flags = mode.default_flags(node.members.len());
        node.mode = mode;
        node.members.assign_flags(&flags);
        debug!(
            "event=mode_change module=category status=ok category={} mode={}",
            id, mode
        );
        Ok(())
    }

    /// Collects the visible layer references reachable from `id`.
    ///
    /// Descends only into sub-categories whose own flag is set. A layer
    /// reachable by several paths appears once, at its first position.
    pub fn visible_layers(&self, id: CategoryId) -> CategoryResult<IndexSet<String>> {
        let mut output = IndexSet::new();
        self.collect_layers(id, true, &mut output)?;
        Ok(output)
    }

    /// Collects every layer reference under `id`, regardless of visibility.
    pub fn all_layers(&self, id: CategoryId) -> CategoryResult<IndexSet<String>> {
        let mut output = IndexSet::new();
        self.collect_layers(id, false, &mut output)?;
        Ok(output)
    }

    fn collect_layers(
        &self,
        id: CategoryId,
        visible_only: bool,
        output: &mut IndexSet<String>,
    ) -> CategoryResult<()> {
        match &self.node(id)?.members {
            Members::Categories(slots) => {
                for slot in slots {
                    if slot.visible || !visible_only {
                        self.collect_layers(slot.value, visible_only, output)?;
                    }
                }
            }
            Members::Layers(slots) => {
                for slot in slots {
                    if slot.visible || !visible_only {
                        output.insert(slot.value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Verifies the mode invariant of one category.
    pub fn check_visibility(&self, id: CategoryId) -> CategoryResult<()> {
        let node = self.node(id)?;
        self.check_flags(id, &node.members.flags())
    }

    /// Verifies the mode invariant of every category in the tree.
    pub fn check_tree(&self) -> CategoryResult<()> {
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            self.check_visibility(id)?;
            pending.extend(self.subcategories(id)?);
        }
        Ok(())
    }

    /// Returns every live category handle in pre-order.
    pub fn iter_preorder(&self) -> Vec<CategoryId> {
        let mut output = Vec::new();
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            output.push(id);
            if let Ok(children) = self.subcategories(id) {
                pending.extend(children.into_iter().rev());
            }
        }
        output
    }

    fn check_flags(&self, id: CategoryId, flags: &[bool]) -> CategoryResult<()> {
        let node = self.node(id)?;
        if node.mode.accepts(flags) {
            return Ok(());
        }
        Err(CategoryError::InvariantViolation {
            category: node.name.clone(),
            mode: node.mode,
            flags: flags.to_vec(),
        })
    }

    fn commit_flags(&mut self, id: CategoryId, flags: Vec<bool>) -> CategoryResult<()> {
        self.check_flags(id, &flags)?;
        self.node_mut(id)?.members.assign_flags(&flags);
        Ok(())
    }

    fn member_index(&self, parent: CategoryId, name: &str) -> Option<usize> {
        self.get_sub(parent, name)
            .map(|(index, _)| index)
            .or_else(|| self.get_layer(parent, name).map(|(index, _)| index))
    }

    fn node(&self, id: CategoryId) -> CategoryResult<&CategoryNode> {
        self.entries
            .get(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.node.as_ref())
            .ok_or(CategoryError::HandleNotFound(id))
    }

    fn node_mut(&mut self, id: CategoryId) -> CategoryResult<&mut CategoryNode> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.node.as_mut())
            .ok_or(CategoryError::HandleNotFound(id))
    }

    fn alloc(&mut self, node: CategoryNode) -> CategoryId {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.node = Some(node);
            return CategoryId {
                index,
                generation: entry.generation,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            node: Some(node),
        });
        CategoryId {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, id: CategoryId) {
        let Some(entry) = self
            .entries
            .get_mut(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
        else {
            return;
        };
        let Some(node) = entry.node.take() else {
            return;
        };
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);
        if let Members::Categories(slots) = node.members {
            for slot in slots {
                self.release(slot.value);
            }
        }
    }

    /// Builds a tree from its persisted form.
    ///
    /// Fails when a mode is unknown, a member list mixes layers and
    /// categories, or any category violates its mode invariant.
    pub fn from_record(record: &CategoryRecord) -> CategoryResult<Self> {
        let mut tree = Self {
            entries: Vec::new(),
            free: Vec::new(),
            root: CategoryId {
                index: 0,
                generation: 0,
            },
        };
        tree.root = tree.insert_record(record)?;
        Ok(tree)
    }

    fn insert_record(&mut self, record: &CategoryRecord) -> CategoryResult<CategoryId> {
        let mode: VisibilityMode = record
            .mode
            .parse()
            .map_err(|_| CategoryError::UnknownMode(record.mode.clone()))?;

        let layer_count = record
            .subcategories
            .iter()
            .filter(|(member, _)| matches!(member, MemberRecord::Layer(_)))
            .count();
        let members = if record.subcategories.is_empty() {
            let flags = mode.default_flags(record.layers.len());
            Members::Layers(
                record
                    .layers
                    .iter()
                    .zip(flags)
                    .map(|(name, visible)| Slot {
                        value: name.clone(),
                        visible,
                    })
                    .collect(),
            )
        } else if layer_count == record.subcategories.len() {
            let slots: Vec<Slot<String>> = record
                .subcategories
                .iter()
                .filter_map(|(member, visible)| match member {
                    MemberRecord::Layer(name) => Some(Slot {
                        value: name.clone(),
                        visible: *visible,
                    }),
                    MemberRecord::Category(_) => None,
                })
                .collect();
            if !record.layers.is_empty()
                && !record.layers.iter().eq(slots.iter().map(|slot| &slot.value))
            {
                return Err(CategoryError::InvalidData(format!(
                    "category `{}` lists layers that do not match its members",
                    record.name
                )));
            }
            Members::Layers(slots)
        } else if layer_count == 0 {
            let mut slots = Vec::with_capacity(record.subcategories.len());
            for (member, visible) in &record.subcategories {
                if let MemberRecord::Category(child) = member {
                    slots.push(Slot {
                        value: self.insert_record(child)?,
                        visible: *visible,
                    });
                }
            }
            Members::Categories(slots)
        } else {
            return Err(CategoryError::InvalidData(format!(
                "category `{}` mixes layer references and sub-categories",
                record.name
            )));
        };

        if !mode.accepts(&members.flags()) {
            return Err(CategoryError::InvariantViolation {
                category: record.name.clone(),
                mode,
                flags: members.flags(),
            });
        }
        Ok(self.alloc(CategoryNode {
            name: record.name.clone(),
            mode,
            members,
        }))
    }

    /// Converts the subtree at `id` to its persisted form.
    pub fn to_record(&self, id: CategoryId) -> CategoryResult<CategoryRecord> {
        let node = self.node(id)?;
        let (subcategories, layers) = match &node.members {
            Members::Categories(slots) => {
                let mut members = Vec::with_capacity(slots.len());
                for slot in slots {
                    members.push((
                        MemberRecord::Category(self.to_record(slot.value)?),
                        slot.visible,
                    ));
                }
                (members, Vec::new())
            }
            Members::Layers(slots) => (
                slots
                    .iter()
                    .map(|slot| (MemberRecord::Layer(slot.value.clone()), slot.visible))
                    .collect(),
                slots.iter().map(|slot| slot.value.clone()).collect(),
            ),
        };
        Ok(CategoryRecord {
            name: node.name.clone(),
            mode: node.mode.as_str().to_string(),
            subcategories,
            layers,
        })
    }
}

fn appended(flags: &[bool], visible: bool) -> Vec<bool> {
    let mut output = flags.to_vec();
    output.push(visible);
    output
}

impl TryFrom<CategoryRecord> for CategoryTree {
    type Error = CategoryError;

    fn try_from(value: CategoryRecord) -> Result<Self, Self::Error> {
        Self::from_record(&value)
    }
}

impl Serialize for CategoryTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = self
            .to_record(self.root)
            .map_err(<S::Error as serde::ser::Error>::custom)?;
        record.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CategoryTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = CategoryRecord::deserialize(deserializer)?;
        Self::from_record(&record).map_err(<D::Error as serde::de::Error>::custom)
    }
}
