//! Variance handler use-case service.
//!
//! # Responsibility
//! - Bind one category tree to one layered document and its layer index.
//! - Validate names against the document before any tree mutation.
//! - Resolve the tree into document leaf identifiers and render them.
//!
//! # Invariants
//! - Edits address a target by name plus its ancestor chain from the root
//!   (root excluded); an empty chain means the root's direct members.
//! - Layer and sibling-category names are unique when a handler is built.
//! - Rendering works on a deep copy; the loaded document is never mutated.

use crate::document::{DocumentError, DocumentNode, DocumentOpener, DocumentOutline, LayeredDocument};
use crate::error::ErrorKind;
use crate::index::layer_index::{apply_visible_set, IndexError, LayerIndex, PATH_SEPARATOR};
use crate::model::category::{CategoryError, CategoryId, CategoryTree};
use crate::model::mode::VisibilityMode;
use crate::repo::config_repo::{ConfigRepoError, ConfigRepository, HandlerConfig};
use crate::service::outline_import::{parse_outline, OutlineError};
use indexmap::IndexSet;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Errors from variance handler operations.
#[derive(Debug)]
pub enum VarianceError {
    /// Category tree rejected the operation.
    Category(CategoryError),
    /// Layer index rejected the operation.
    Index(IndexError),
    /// Document collaborator failed.
    Document(DocumentError),
    /// Config persistence failed.
    Config(ConfigRepoError),
    /// Outline text cannot be parsed.
    Outline(OutlineError),
    /// Category-only operation addressed a layer reference.
    TargetIsLayer {
        operation: &'static str,
        name: String,
    },
    /// Target is neither a sub-category nor a layer under its parent.
    TargetNotFound { name: String, parents: Vec<String> },
    /// Outline line disagrees with a category's existing mode.
    ModeMismatch {
        category: String,
        existing: VisibilityMode,
        requested: VisibilityMode,
    },
    /// Root category can only be addressed in mode `all`.
    RootModeMustBeAll(VisibilityMode),
}

impl VarianceError {
    /// Returns the coarse error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Category(err) => err.kind(),
            Self::Index(err) => err.kind(),
            Self::Document(err) => err.kind(),
            Self::Config(err) => err.kind(),
            Self::TargetIsLayer { .. } => ErrorKind::NotAllowed,
            Self::Outline(_)
            | Self::TargetNotFound { .. }
            | Self::ModeMismatch { .. }
            | Self::RootModeMustBeAll(_) => ErrorKind::Invariant,
        }
    }
}

impl Display for VarianceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Category(err) => write!(f, "{err}"),
            Self::Index(err) => write!(f, "{err}"),
            Self::Document(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Outline(err) => write!(f, "{err}"),
            Self::TargetIsLayer { operation, name } => {
                write!(f, "cannot {operation} layer reference `{name}`")
            }
            Self::TargetNotFound { name, parents } => write!(
                f,
                "category `{name}` not found under [{}]",
                parents.join(", ")
            ),
            Self::ModeMismatch {
                category,
                existing,
                requested,
            } => write!(
                f,
                "category `{category}` is in mode `{existing}`, not `{requested}`"
            ),
            Self::RootModeMustBeAll(mode) => {
                write!(f, "root category must use mode `all`, got `{mode}`")
            }
        }
    }
}

impl Error for VarianceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Category(err) => Some(err),
            Self::Index(err) => Some(err),
            Self::Document(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Outline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CategoryError> for VarianceError {
    fn from(value: CategoryError) -> Self {
        Self::Category(value)
    }
}

impl From<IndexError> for VarianceError {
    fn from(value: IndexError) -> Self {
        match value {
            IndexError::Category(err) => Self::Category(err),
            other => Self::Index(other),
        }
    }
}

impl From<DocumentError> for VarianceError {
    fn from(value: DocumentError) -> Self {
        Self::Document(value)
    }
}

impl From<ConfigRepoError> for VarianceError {
    fn from(value: ConfigRepoError) -> Self {
        Self::Config(value)
    }
}

impl From<OutlineError> for VarianceError {
    fn from(value: OutlineError) -> Self {
        Self::Outline(value)
    }
}

/// Result type used by variance handler operations.
pub type VarianceResult<T> = Result<T, VarianceError>;

/// Category lookup strategy for [`VarianceHandler::get_categories`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Names form one ancestor chain starting below the root.
    Path,
    /// Each name is searched independently anywhere in the tree.
    DepthFirst,
}

/// Splits `"A-B-C"` into path segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Category tree bound to one layered document.
pub struct VarianceHandler<D: LayeredDocument> {
    tree: CategoryTree,
    psd_path: PathBuf,
    document: D,
    index: LayerIndex,
}

impl<D: LayeredDocument> VarianceHandler<D> {
    /// Opens the document at `psd_path` and starts from an empty `all` root.
    pub fn new<O>(psd_path: impl Into<PathBuf>, opener: &O) -> VarianceResult<Self>
    where
        O: DocumentOpener<Document = D>,
    {
        let psd_path = psd_path.into();
        let document = opener.open(&psd_path)?;
        Self::from_parts(CategoryTree::default(), psd_path, document)
    }

    /// Reloads a handler from a saved config and reopens its document.
    pub fn from_config<R, O>(config_path: &Path, repo: &R, opener: &O) -> VarianceResult<Self>
    where
        R: ConfigRepository,
        O: DocumentOpener<Document = D>,
    {
        let config = repo.load_config(config_path)?;
        let tree = CategoryTree::from_record(&config.root)?;
        let document = opener.open(&config.psd_path)?;
        Self::from_parts(tree, config.psd_path, document)
    }

    /// Builds a handler from already loaded parts.
    ///
    /// Fails on duplicate layer names or duplicate sibling category names.
    pub fn from_parts(
        tree: CategoryTree,
        psd_path: impl Into<PathBuf>,
        document: D,
    ) -> VarianceResult<Self> {
        let index = LayerIndex::build(document.root());
        index.check_duplicate_names()?;
        LayerIndex::check_category_names(&tree)?;
        tree.check_tree()?;
        let psd_path = psd_path.into();
        info!(
            "event=handler_open module=service status=ok layers={} categories={}",
            index.len(),
            tree.iter_preorder().len()
        );
        Ok(Self {
            tree,
            psd_path,
            document,
            index,
        })
    }

    pub fn tree(&self) -> &CategoryTree {
        &self.tree
    }

    pub fn index(&self) -> &LayerIndex {
        &self.index
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn psd_path(&self) -> &Path {
        &self.psd_path
    }

    /// Snapshot of the persisted handler state.
    pub fn to_config(&self) -> VarianceResult<HandlerConfig> {
        Ok(HandlerConfig {
            psd_path: self.psd_path.clone(),
            root: self.tree.to_record(self.tree.root())?,
            layer_count: self.index.len(),
            layer_dict: self.index.layer_dict(),
        })
    }

    /// Writes the handler config to `path`.
    pub fn save_config<R: ConfigRepository>(&self, path: &Path, repo: &R) -> VarianceResult<()> {
        repo.save_config(path, &self.to_config()?)?;
        Ok(())
    }

    /// Resolves categories by ancestor chain or by depth-first search.
    pub fn get_categories<S: AsRef<str>>(
        &self,
        names: &[S],
        mode: SearchMode,
    ) -> VarianceResult<Vec<CategoryId>> {
        let found = match mode {
            SearchMode::Path => self.tree.resolve_path(names)?,
            SearchMode::DepthFirst => self.tree.find_depth_first(names)?,
        };
        Ok(found)
    }

    /// Resolves a `"A-B"` category path string; see [`get_categories`].
    ///
    /// [`get_categories`]: Self::get_categories
    pub fn get_categories_at(
        &self,
        path: &str,
        mode: SearchMode,
    ) -> VarianceResult<Vec<CategoryId>> {
        self.get_categories(&split_path(path), mode)
    }

    /// Toggles member `target` of the category reached through `parents`.
    pub fn reverse_visibility<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
    ) -> VarianceResult<()> {
        let result = self
            .tree
            .resolve_parent(parents)
            .and_then(|parent| self.tree.reverse_visibility(parent, target))
            .map_err(VarianceError::from);
        logged("reverse_visibility", result)
    }

    /// Sets member `target` of the category reached through `parents`.
    pub fn set_visibility<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
        visible: bool,
    ) -> VarianceResult<()> {
        let result = self
            .tree
            .resolve_parent(parents)
            .and_then(|parent| self.tree.set_visibility(parent, target, visible))
            .map_err(VarianceError::from);
        logged("set_visibility", result)
    }

    /// Renames sub-category `target`.
    pub fn rename_category<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
        new_name: &str,
    ) -> VarianceResult<()> {
        let result = self.rename_category_inner(target, parents, new_name);
        logged("category_rename", result)
    }

    fn rename_category_inner<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
        new_name: &str,
    ) -> VarianceResult<()> {
        let parent = self.tree.resolve_parent(parents)?;
        if new_name != target && self.tree.get_sub(parent, target).is_some() {
            self.index
                .ensure_category_name_available(&self.tree, parent, new_name)?;
        }
        self.tree.rename(parent, target, new_name)?;
        Ok(())
    }

    /// Adds a new sub-category named `new_name` under category `target`.
    ///
    /// With an empty `parents` chain, `target` may also name the root.
    pub fn add_category<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
        new_name: &str,
        mode: VisibilityMode,
    ) -> VarianceResult<CategoryId> {
        let result = self
            .locate_category(target, parents, "add a category under")
            .and_then(|category| {
                self.index
                    .ensure_category_name_available(&self.tree, category, new_name)?;
                Ok(self.tree.add_sub(category, new_name, mode)?)
            });
        logged("category_add", result)
    }

    /// Deletes sub-category `target` and its subtree.
    ///
    /// A missing target is rejected as not allowed, the same as a missing
    /// layer reference in [`delete_layer`](Self::delete_layer).
    pub fn delete_category<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
    ) -> VarianceResult<()> {
        let result = self.delete_category_inner(target, parents);
        logged("category_delete", result)
    }

    fn delete_category_inner<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
    ) -> VarianceResult<()> {
        let parent = self.tree.resolve_parent(parents)?;
        if self.tree.get_layer(parent, target).is_some() {
            return Err(VarianceError::TargetIsLayer {
                operation: "delete",
                name: target.to_string(),
            });
        }
        self.tree.remove_sub(parent, target)?;
        Ok(())
    }

    /// Changes the mode of category `target` and resets its visibilities.
    pub fn change_mode<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
        mode: VisibilityMode,
    ) -> VarianceResult<()> {
        let result = if mode.is_settable() {
            self.locate_category(target, parents, "change the mode of")
                .and_then(|category| Ok(self.tree.change_mode(category, mode)?))
        } else {
            Err(CategoryError::ModeNotSettable(mode).into())
        };
        logged("mode_change", result)
    }

    /// Adds a reference to document layer `layer_id` under category `target`.
    ///
    /// `layer_id` must be an indexed path identifier that is not also used as
    /// a display name.
    pub fn add_layer<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
        layer_id: &str,
    ) -> VarianceResult<()> {
        let result = self.add_layer_inner(target, parents, layer_id);
        logged("layer_add", result)
    }

    fn add_layer_inner<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
        layer_id: &str,
    ) -> VarianceResult<()> {
        self.index.ensure_name_available(layer_id)?;
        if self.index.get(layer_id).is_none() {
            return Err(IndexError::LayerNotFound(layer_id.to_string()).into());
        }
        let category = self.locate_category(target, parents, "add a layer under")?;
        self.tree.add_layer(category, layer_id)?;
        Ok(())
    }

    /// Removes layer reference `target` from the category reached through
    /// `parents`.
    pub fn delete_layer<S: AsRef<str>>(
        &mut self,
        target: &str,
        parents: &[S],
    ) -> VarianceResult<()> {
        let result = self
            .tree
            .resolve_parent(parents)
            .and_then(|parent| self.tree.remove_layer(parent, target))
            .map_err(VarianceError::from);
        logged("layer_delete", result)
    }

    /// Resolves the tree into the set of visible document leaf identifiers.
    ///
    /// Layer references naming a group contribute all of its leaves.
    pub fn visible_layer_ids(&self) -> VarianceResult<IndexSet<String>> {
        let names = self.tree.visible_layers(self.tree.root())?;
        let ids = self.index.parse_layer(&names)?;
        debug!(
            "event=visible_resolve module=service status=ok names={} leaves={}",
            names.len(),
            ids.len()
        );
        Ok(ids)
    }

    /// Deep-copies the document with exactly the leaves in `visible_ids` shown
    /// and every group shown.
    pub fn copy_document(&self, visible_ids: &IndexSet<String>) -> D {
        let mut copy = self.document.clone();
        apply_visible_set(copy.root_mut(), visible_ids);
        copy
    }

    /// Renders the current tree state.
    pub fn render(&self) -> VarianceResult<D::Image> {
        let ids = self.visible_layer_ids()?;
        let image = self.copy_document(&ids).composite(true)?;
        info!(
            "event=render module=service status=ok leaves={}",
            ids.len()
        );
        Ok(image)
    }

    /// Renders an ad-hoc selection.
    ///
    /// Targets that are path identifiers are used as-is; other targets are
    /// found as categories anywhere in the tree and contribute their visible
    /// layers (`visible_only`) or all of their layers.
    pub fn render_specific<S: AsRef<str>>(
        &self,
        targets: &[S],
        visible_only: bool,
    ) -> VarianceResult<D::Image> {
        let mut names: IndexSet<String> = IndexSet::new();
        let mut categories = Vec::new();
        for target in targets {
            let target = target.as_ref();
            if self.index.get(target).is_some() {
                names.insert(target.to_string());
            } else {
                categories.push(target);
            }
        }
        for category in self.tree.find_depth_first(&categories)? {
            let layers = if visible_only {
                self.tree.visible_layers(category)?
            } else {
                self.tree.all_layers(category)?
            };
            names.extend(layers);
        }
        let ids = self.index.parse_layer(&names)?;
        Ok(self.copy_document(&ids).composite(true)?)
    }

    /// Returns the document outline, from the root or from one indexed node.
    pub fn outline(&self, search_root: Option<&str>) -> VarianceResult<DocumentOutline> {
        let Some(path) = search_root else {
            return Ok(DocumentOutline::of(self.document.root()));
        };
        if self.index.get(path).is_none() {
            return Err(IndexError::LayerNotFound(path.to_string()).into());
        }
        let mut node = self.document.root();
        for segment in path.split(PATH_SEPARATOR) {
            let position: usize = segment
                .parse()
                .map_err(|_| IndexError::LayerNotFound(path.to_string()))?;
            let children = node.children();
            node = children
                .len()
                .checked_sub(position + 1)
                .and_then(|native| children.get(native))
                .ok_or_else(|| IndexError::LayerNotFound(path.to_string()))?;
        }
        Ok(DocumentOutline::of(node))
    }

    /// Applies an outline document to the tree.
    ///
    /// Either every line applies or the tree is left unchanged. Returns the
    /// number of categories created.
    pub fn import_outline(&mut self, text: &str) -> VarianceResult<usize> {
        let lines = parse_outline(text)?;
        let snapshot = self.tree.clone();
        let mut created = 0;
        for line in &lines {
            match self.apply_outline_line(line.mode, &line.path, &line.children) {
                Ok(count) => created += count,
                Err(err) => {
                    self.tree = snapshot;
                    warn!(
                        "event=outline_import module=service status=rejected line={} error_kind={} error={}",
                        line.line_no,
                        err.kind(),
                        err
                    );
                    return Err(err);
                }
            }
        }
        info!(
            "event=outline_import module=service status=ok lines={} created={}",
            lines.len(),
            created
        );
        Ok(created)
    }

    fn apply_outline_line(
        &mut self,
        mode: VisibilityMode,
        path: &[String],
        children: &[String],
    ) -> VarianceResult<usize> {
        let (target, parents) = match path.split_last() {
            Some((last, parents)) => (last.as_str(), parents),
            None => {
                if mode != VisibilityMode::All {
                    return Err(VarianceError::RootModeMustBeAll(mode));
                }
                (self.tree.name(self.tree.root())?, &[][..])
            }
        };
        let target = target.to_string();
        let category = self.locate_category(&target, parents, "add a category under")?;
        let existing = self.tree.mode(category)?;
        if existing == VisibilityMode::Unk {
            if mode.is_settable() {
                self.tree.change_mode(category, mode)?;
            }
        } else if existing != mode {
            return Err(VarianceError::ModeMismatch {
                category: target,
                existing,
                requested: mode,
            });
        }
        for child in children {
            self.index
                .ensure_category_name_available(&self.tree, category, child)?;
            self.tree.add_sub(category, child.as_str(), VisibilityMode::Unk)?;
        }
        Ok(children.len())
    }

    fn locate_category<S: AsRef<str>>(
        &self,
        target: &str,
        parents: &[S],
        operation: &'static str,
    ) -> VarianceResult<CategoryId> {
        let parent = self.tree.resolve_parent(parents)?;
        if let Some((_, category)) = self.tree.get_sub(parent, target) {
            return Ok(category);
        }
        if parents.is_empty() && self.tree.name(parent)? == target {
            return Ok(parent);
        }
        Err(self.missing_category(parent, target, parents, operation))
    }

    fn missing_category<S: AsRef<str>>(
        &self,
        parent: CategoryId,
        target: &str,
        parents: &[S],
        operation: &'static str,
    ) -> VarianceError {
        if self.tree.get_layer(parent, target).is_some() {
            return VarianceError::TargetIsLayer {
                operation,
                name: target.to_string(),
            };
        }
        VarianceError::TargetNotFound {
            name: target.to_string(),
            parents: parents.iter().map(|p| p.as_ref().to_string()).collect(),
        }
    }
}

fn logged<T>(event: &'static str, result: VarianceResult<T>) -> VarianceResult<T> {
    match &result {
        Ok(_) => debug!("event={} module=service status=ok", event),
        Err(err) => warn!(
            "event={} module=service status=rejected error_kind={} error={}",
            event,
            err.kind(),
            err
        ),
    }
    result
}
