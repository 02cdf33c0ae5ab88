//! Node storage and detached subtree construction
//!
//! Nodes live in the owning [`Document`](crate::Document) arena and are
//! addressed by [`NodeHandle`]. Inline comments are first-class entries so the
//! audit trail survives serialization.

use serde::{Deserialize, Serialize};

use crate::attr::Attribute;

/// Stable handle to a node inside a document arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub(crate) u32);

impl NodeHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Ordered entry directly under a node element: attribute or inline comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEntry {
    Attribute(Attribute),
    Comment(String),
}

/// Ordered entry of a child container: child node or inline comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEntry {
    Node(NodeHandle),
    Comment(CommentHandle),
}

/// Handle to an interned comment string
///
/// Comments are interned separately so [`ChildEntry`] stays `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommentHandle(pub(crate) u32);

/// Arena storage for one node
#[derive(Debug, Clone, Default)]
pub struct NodeData {
    pub id: Option<String>,
    pub key: Option<String>,
    pub entries: Vec<NodeEntry>,
    /// `None` means the node has no child container at all; `Some(vec![])`
    /// is an explicitly empty container. The two serialize differently.
    pub children: Option<Vec<ChildEntry>>,
}

impl NodeData {
    pub fn new(id: Option<String>, key: Option<String>) -> Self {
        Self {
            id,
            key,
            entries: Vec::new(),
            children: None,
        }
    }

    /// Attributes in document order, skipping comments
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter().filter_map(|e| match e {
            NodeEntry::Attribute(a) => Some(a),
            NodeEntry::Comment(_) => None,
        })
    }

    pub(crate) fn attribute_entry_index(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| match e {
            NodeEntry::Attribute(a) => a.name == name,
            NodeEntry::Comment(_) => false,
        })
    }

    /// One-line rendering of the node's attributes, used in tombstones
    pub(crate) fn describe(&self) -> String {
        let attrs: Vec<String> = self
            .attributes()
            .map(|a| format!("{}={}", a.name, a.value_str()))
            .collect();
        format!(
            "id={} {}",
            self.id.as_deref().unwrap_or(""),
            attrs.join(" ")
        )
    }
}

/// Declarative description of a subtree to materialize into a document
///
/// Built by callers that assemble new content (dialog nodes, timeline
/// events), then handed to [`Document::create_node`](crate::Document::create_node).
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    pub id: Option<String>,
    pub key: Option<String>,
    pub attrs: Vec<SpecAttr>,
    pub children: Vec<NodeSpec>,
    /// Whether to emit an (empty) child container even without children
    pub force_child_container: bool,
}

/// Attribute inside a [`NodeSpec`]
#[derive(Debug, Clone)]
pub struct SpecAttr {
    pub attr: Attribute,
    /// Marks float attributes whose value is relative to the owning window
    /// start and must be offset when the spec is materialized at a position
    pub relative_time: bool,
}

impl From<Attribute> for SpecAttr {
    fn from(attr: Attribute) -> Self {
        Self {
            attr,
            relative_time: false,
        }
    }
}

impl SpecAttr {
    pub fn relative(attr: Attribute) -> Self {
        Self {
            attr,
            relative_time: true,
        }
    }
}

impl NodeSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Node without an `id` attribute (anonymous container slot)
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_attr(mut self, attr: Attribute) -> Self {
        self.attrs.push(attr.into());
        self
    }

    pub fn with_relative_time_attr(mut self, attr: Attribute) -> Self {
        self.attrs.push(SpecAttr::relative(attr));
        self
    }

    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = NodeSpec>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_empty_children(mut self) -> Self {
        self.force_child_container = true;
        self
    }
}
