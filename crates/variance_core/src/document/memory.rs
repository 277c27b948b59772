//! In-memory layered document.
//!
//! Used where no native decoder is wired in. Documents are plain JSON trees:
//! `{ "name": ..., "visible": bool, "children": [...] }`, where the presence of
//! `children` marks a group. Compositing yields the visible leaf names from
//! top to bottom.

use super::{DocumentError, DocumentNode, DocumentOpener, LayeredDocument};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_visible() -> bool {
    true
}

/// One node of a [`MemoryDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLayer {
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<MemoryLayer>>,
}

impl MemoryLayer {
    /// Creates a visible leaf layer.
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            children: None,
        }
    }

    /// Creates a visible group; `children` are bottom-to-top.
    pub fn group(name: impl Into<String>, children: Vec<MemoryLayer>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            children: Some(children),
        }
    }
}

impl DocumentNode for MemoryLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_group(&self) -> bool {
        self.children.is_some()
    }

    fn children(&self) -> &[Self] {
        self.children.as_deref().unwrap_or_default()
    }

    fn children_mut(&mut self) -> &mut [Self] {
        match &mut self.children {
            Some(children) => children.as_mut_slice(),
            None => &mut [],
        }
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

/// Layered document held entirely in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub root: MemoryLayer,
}

impl MemoryDocument {
    /// Wraps `children` (bottom-to-top) in an unnamed root group.
    pub fn new(children: Vec<MemoryLayer>) -> Self {
        Self {
            root: MemoryLayer::group("", children),
        }
    }

    /// Decodes a document from its JSON form.
    pub fn from_json_str(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }
}

impl LayeredDocument for MemoryDocument {
    type Node = MemoryLayer;
    type Image = Vec<String>;

    fn root(&self) -> &MemoryLayer {
        &self.root
    }

    fn root_mut(&mut self) -> &mut MemoryLayer {
        &mut self.root
    }

    fn composite(&self, _force: bool) -> Result<Vec<String>, DocumentError> {
        let mut stack = Vec::new();
        collect_visible(&self.root, &mut stack);
        Ok(stack)
    }
}

fn collect_visible(node: &MemoryLayer, stack: &mut Vec<String>) {
    if !node.visible {
        return;
    }
    match &node.children {
        Some(children) => {
            for child in children.iter().rev() {
                collect_visible(child, stack);
            }
        }
        None => stack.push(node.name.clone()),
    }
}

/// Opens JSON-encoded [`MemoryDocument`] files.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryDocumentOpener;

impl DocumentOpener for MemoryDocumentOpener {
    type Document = MemoryDocument;

    fn open(&self, path: &Path) -> Result<MemoryDocument, DocumentError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        MemoryDocument::from_json_str(&raw).map_err(|err| DocumentError::Decode {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryDocument, MemoryLayer};
    use crate::document::{DocumentOutline, LayeredDocument};

    #[test]
    fn composite_lists_visible_leaves_top_to_bottom() {
        let mut hidden = MemoryLayer::group("Hidden", vec![MemoryLayer::leaf("Ghost")]);
        hidden.visible = false;
        let doc = MemoryDocument::new(vec![
            MemoryLayer::leaf("Background"),
            hidden,
            MemoryLayer::group(
                "Face",
                vec![MemoryLayer::leaf("Mouth"), MemoryLayer::leaf("Eyes")],
            ),
        ]);

        assert_eq!(
            doc.composite(true).unwrap(),
            vec!["Eyes".to_string(), "Mouth".to_string(), "Background".to_string()]
        );
    }

    #[test]
    fn json_form_marks_groups_by_children() {
        let doc = MemoryDocument::from_json_str(
            r#"{ "root": { "name": "", "children": [
                { "name": "Body" },
                { "name": "Arms", "visible": false, "children": [] }
            ] } }"#,
        )
        .unwrap();

        let outline = DocumentOutline::of(doc.root());
        assert_eq!(outline.children.len(), 2);
        assert!(doc.root.children.as_ref().unwrap()[1].children.is_some());
        assert!(!doc.root.children.as_ref().unwrap()[1].visible);
        assert!(doc.root.children.as_ref().unwrap()[0].visible);
    }
}
