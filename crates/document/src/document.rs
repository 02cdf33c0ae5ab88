//! Arena-backed document trees
//!
//! A document is loaded wholesale, mutated in place through many discrete
//! edits, and written back wholesale. Nodes live in an arena and are addressed
//! by handle, so deep copies across documents are plain subtree walks and
//! "in-place" mutation never invalidates outstanding handles.
//!
//! Every structural edit leaves a human-readable audit comment next to the
//! mutated element. The serialized output stays diff-reviewable before being
//! committed as authoritative content.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attr::{Attribute, FLOAT};
use crate::error::DocumentError;
use crate::node::{ChildEntry, CommentHandle, NodeData, NodeEntry, NodeHandle, NodeSpec};

/// Format version quadruple carried in the document header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocVersion {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
    pub build: u32,
}

impl Default for DocVersion {
    fn default() -> Self {
        Self {
            major: 4,
            minor: 0,
            revision: 9,
            build: 330,
        }
    }
}

/// Attribute name used for relative timestamps nested inside event subtrees
pub const TIME_ATTR: &str = "Time";

fn audit(msg: &str) -> String {
    format!("Edited - {msg}")
}

fn with_note(note: Option<&str>, msg: &str) -> String {
    match note {
        Some(n) => audit(&format!("{n} - {msg}")),
        None => audit(msg),
    }
}

/// A tree of attribute-keyed nodes with an inline audit trail
#[derive(Debug, Clone)]
pub struct Document {
    pub version: DocVersion,
    pub region_id: String,
    root: NodeHandle,
    nodes: Vec<NodeData>,
    comments: Vec<String>,
}

impl Document {
    /// Create a document whose root is built from `root`
    pub fn new(region_id: impl Into<String>, root: NodeSpec) -> Self {
        let mut doc = Self {
            version: DocVersion::default(),
            region_id: region_id.into(),
            root: NodeHandle(0),
            nodes: Vec::new(),
            comments: Vec::new(),
        };
        doc.root = doc.create_node(&root);
        doc
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> NodeHandle {
        let handle = NodeHandle(self.nodes.len() as u32);
        self.nodes.push(data);
        handle
    }

    pub fn node(&self, handle: NodeHandle) -> &NodeData {
        &self.nodes[handle.index()]
    }

    pub(crate) fn node_mut(&mut self, handle: NodeHandle) -> &mut NodeData {
        &mut self.nodes[handle.index()]
    }

    pub fn node_id(&self, handle: NodeHandle) -> Option<&str> {
        self.node(handle).id.as_deref()
    }

    pub fn node_key(&self, handle: NodeHandle) -> Option<&str> {
        self.node(handle).key.as_deref()
    }

    /// Require the node's `id` to equal `expected`
    pub fn expect_id(&self, handle: NodeHandle, expected: &str) -> Result<(), DocumentError> {
        let found = self.node_id(handle).unwrap_or("");
        if found == expected {
            Ok(())
        } else {
            Err(DocumentError::UnexpectedNode {
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }

    pub fn comment_text(&self, handle: CommentHandle) -> &str {
        &self.comments[handle.0 as usize]
    }

    pub(crate) fn intern_comment(&mut self, text: String) -> CommentHandle {
        let handle = CommentHandle(self.comments.len() as u32);
        self.comments.push(text);
        handle
    }

    // ---- attribute access ----

    /// Required attribute lookup; absence is a structural defect
    pub fn attr(&self, handle: NodeHandle, name: &str) -> Result<&Attribute, DocumentError> {
        self.attr_opt(handle, name).ok_or_else(|| {
            DocumentError::missing_attribute(name, self.node(handle).describe())
        })
    }

    pub fn attr_opt(&self, handle: NodeHandle, name: &str) -> Option<&Attribute> {
        self.node(handle).attributes().find(|a| a.name == name)
    }

    pub fn attr_value(&self, handle: NodeHandle, name: &str) -> Result<&str, DocumentError> {
        self.attr(handle, name).map(Attribute::value_str)
    }

    pub fn attr_value_opt(&self, handle: NodeHandle, name: &str) -> Option<&str> {
        self.attr_opt(handle, name).map(Attribute::value_str)
    }

    pub fn attr_f64(&self, handle: NodeHandle, name: &str) -> Result<f64, DocumentError> {
        self.attr(handle, name)?.as_f64()
    }

    pub fn attr_i64(&self, handle: NodeHandle, name: &str) -> Result<i64, DocumentError> {
        self.attr(handle, name)?.as_i64()
    }

    /// Update an existing attribute in place, leaving an audit comment
    /// immediately before the attribute entry
    pub fn set_attr(
        &mut self,
        handle: NodeHandle,
        name: &str,
        new_value: impl Into<String>,
        note: Option<&str>,
    ) -> Result<(), DocumentError> {
        let new_value = new_value.into();
        let node = self.node_mut(handle);
        let idx = node.attribute_entry_index(name).ok_or_else(|| {
            DocumentError::missing_attribute(name, node.describe())
        })?;
        let old_value = match &mut node.entries[idx] {
            NodeEntry::Attribute(attr) => {
                let old = attr.value_str().to_string();
                attr.set_value(new_value.clone());
                old
            }
            NodeEntry::Comment(_) => unreachable!("attribute_entry_index returns attributes"),
        };
        let msg = with_note(
            note,
            &format!("Updated attribute {name} value from {old_value} to {new_value}"),
        );
        self.node_mut(handle).entries.insert(idx, NodeEntry::Comment(msg));
        tracing::debug!(attribute = name, old = %old_value, new = %new_value, "updated attribute");
        Ok(())
    }

    /// Update the attribute when present, otherwise add it with an audit
    /// comment recording the addition
    pub fn upsert_attr(
        &mut self,
        handle: NodeHandle,
        attr: Attribute,
        note: Option<&str>,
    ) -> Result<(), DocumentError> {
        if self.attr_opt(handle, &attr.name).is_some() {
            let value = attr.value_str().to_string();
            return self.set_attr(handle, &attr.name.clone(), value, note);
        }
        let msg = with_note(note, "Added new attribute");
        let node = self.node_mut(handle);
        node.entries.push(NodeEntry::Comment(msg));
        tracing::debug!(attribute = %attr.name, value = %attr.value_str(), "added attribute");
        node.entries.push(NodeEntry::Attribute(attr));
        Ok(())
    }

    // ---- child access ----

    /// Child nodes in order, skipping inline comments
    pub fn children(&self, handle: NodeHandle) -> impl Iterator<Item = NodeHandle> + '_ {
        self.node(handle)
            .children
            .iter()
            .flatten()
            .filter_map(|entry| match entry {
                ChildEntry::Node(h) => Some(*h),
                ChildEntry::Comment(_) => None,
            })
    }

    pub fn child_count(&self, handle: NodeHandle) -> usize {
        self.children(handle).count()
    }

    /// Children whose `id` equals `id`
    pub fn children_with_id(&self, handle: NodeHandle, id: &str) -> Vec<NodeHandle> {
        self.children(handle)
            .filter(|&c| self.node_id(c).unwrap_or("") == id)
            .collect()
    }

    /// Exactly-one-child lookup; zero or several matches abort the edit
    pub fn child_with_id(&self, handle: NodeHandle, id: &str) -> Result<NodeHandle, DocumentError> {
        let matches = self.children_with_id(handle, id);
        match matches.len() {
            1 => Ok(matches[0]),
            0 => Err(DocumentError::MissingChild {
                id: id.to_string(),
                parent: self.node(handle).describe(),
            }),
            count => Err(DocumentError::AmbiguousChild {
                id: id.to_string(),
                parent: self.node(handle).describe(),
                count,
            }),
        }
    }

    /// Resolve an insertion index: `-1` appends, index `-(k+1)` into `len`
    /// nodes lands at `len - k` (so `-2` is second-from-end), positive
    /// indices insert before that slot
    fn resolve_insert_index(index: isize, len: usize) -> Result<usize, DocumentError> {
        if index == -1 {
            return Ok(len);
        }
        let resolved = if index < 0 {
            len as isize + index + 1
        } else {
            index
        };
        if resolved < 0 || resolved > len as isize {
            return Err(DocumentError::IndexOutOfRange { index, len });
        }
        Ok(resolved as usize)
    }

    /// Insert a detached node into `parent`'s child container, creating the
    /// container if needed, with an adjacent audit comment
    pub fn insert_child(
        &mut self,
        parent: NodeHandle,
        child: NodeHandle,
        index: isize,
        note: Option<&str>,
    ) -> Result<(), DocumentError> {
        let msg = with_note(note, "Added child node");
        let comment = self.intern_comment(msg);
        let container = self.node_mut(parent).children.get_or_insert_with(Vec::new);
        let len = container
            .iter()
            .filter(|e| matches!(e, ChildEntry::Node(_)))
            .count();
        let pos = Self::resolve_insert_index(index, len)?;
        // position among all entries, counting comments, so the new node
        // lands before the pos-th child node
        let raw_pos = Self::raw_position(container, pos);
        container.insert(raw_pos, ChildEntry::Node(child));
        container.insert(raw_pos, ChildEntry::Comment(comment));
        Ok(())
    }

    /// Append without index arithmetic
    pub fn append_child(
        &mut self,
        parent: NodeHandle,
        child: NodeHandle,
        note: Option<&str>,
    ) -> Result<(), DocumentError> {
        self.insert_child(parent, child, -1, note)
    }

    /// Map a node-index to an entry-index inside a mixed node/comment list
    fn raw_position(entries: &[ChildEntry], node_index: usize) -> usize {
        let mut seen = 0usize;
        for (raw, entry) in entries.iter().enumerate() {
            if let ChildEntry::Node(_) = entry {
                if seen == node_index {
                    return raw;
                }
                seen += 1;
            }
        }
        entries.len()
    }

    fn node_index_of(entries: &[ChildEntry], child: NodeHandle) -> Option<usize> {
        entries.iter().position(|e| matches!(e, ChildEntry::Node(h) if *h == child))
    }

    /// Remove `child` from `parent`, leaving a tombstone comment describing
    /// the removed node so the diff trail stays auditable
    pub fn delete_child(
        &mut self,
        parent: NodeHandle,
        child: NodeHandle,
    ) -> Result<(), DocumentError> {
        let description = self.node(child).describe();
        let comment = self.intern_comment(audit(&format!("Deleted child node {description}")));
        let container = self
            .node_mut(parent)
            .children
            .as_mut()
            .ok_or(DocumentError::NotAChild)?;
        let raw = Self::node_index_of(container, child).ok_or(DocumentError::NotAChild)?;
        container.remove(raw);
        container.insert(raw, ChildEntry::Comment(comment));
        tracing::debug!(node = %description, "deleted child node");
        Ok(())
    }

    /// Remove `child` without a tombstone; used when relocating a node that
    /// is immediately re-attached elsewhere
    pub fn detach_child(
        &mut self,
        parent: NodeHandle,
        child: NodeHandle,
    ) -> Result<(), DocumentError> {
        let container = self
            .node_mut(parent)
            .children
            .as_mut()
            .ok_or(DocumentError::NotAChild)?;
        let raw = Self::node_index_of(container, child).ok_or(DocumentError::NotAChild)?;
        container.remove(raw);
        Ok(())
    }

    // ---- construction and cross-document copy ----

    /// Materialize a spec as a detached subtree, returning its root handle
    pub fn create_node(&mut self, spec: &NodeSpec) -> NodeHandle {
        let mut data = NodeData::new(spec.id.clone(), spec.key.clone());
        for attr in &spec.attrs {
            data.entries.push(NodeEntry::Attribute(attr.attr.clone()));
        }
        if spec.force_child_container || !spec.children.is_empty() {
            data.children = Some(Vec::new());
        }
        let handle = self.alloc(data);
        for child_spec in &spec.children {
            let child = self.create_node(child_spec);
            if let Some(container) = &mut self.node_mut(handle).children {
                container.push(ChildEntry::Node(child));
            }
        }
        handle
    }

    /// Deep-copy a subtree from another document into this arena, comments
    /// included, returning a detached handle. The source is never mutated.
    pub fn copy_subtree_from(&mut self, src: &Document, src_handle: NodeHandle) -> NodeHandle {
        let src_node = src.node(src_handle);
        let mut data = NodeData::new(src_node.id.clone(), src_node.key.clone());
        data.entries = src_node.entries.clone();
        if src_node.children.is_some() {
            data.children = Some(Vec::new());
        }
        let handle = self.alloc(data);
        if let Some(src_children) = &src.node(src_handle).children {
            for entry in src_children.clone() {
                let copied = match entry {
                    ChildEntry::Node(child) => {
                        ChildEntry::Node(self.copy_subtree_from(src, child))
                    }
                    ChildEntry::Comment(c) => {
                        let text = src.comment_text(c).to_string();
                        ChildEntry::Comment(self.intern_comment(text))
                    }
                };
                if let Some(container) = &mut self.node_mut(handle).children {
                    container.push(copied);
                }
            }
        }
        handle
    }

    // ---- recursive tree walks ----

    /// Collect every identifier-typed attribute value in the subtree
    pub fn collect_identifier_values(&self, handle: NodeHandle, out: &mut Vec<String>) {
        for attr in self.node(handle).attributes() {
            if attr.is_identifier() {
                out.push(attr.value_str().to_string());
            }
        }
        let children: Vec<NodeHandle> = self.children(handle).collect();
        for child in children {
            self.collect_identifier_values(child, out);
        }
    }

    /// Rewrite identifier-typed attributes through `map`, identity outside
    /// its domain. Returns the number of rewrites performed. Rewrites are
    /// silent (no audit comment): they happen wholesale during splicing.
    pub fn remap_identifiers(
        &mut self,
        handle: NodeHandle,
        map: &HashMap<String, String>,
    ) -> usize {
        let mut count = 0usize;
        for entry in &mut self.node_mut(handle).entries {
            if let NodeEntry::Attribute(attr) = entry {
                if attr.is_identifier() {
                    if let Some(mapped) = map.get(attr.value_str()) {
                        tracing::trace!(attribute = %attr.name, from = %attr.value_str(), to = %mapped, "remapped identifier");
                        let mapped = mapped.clone();
                        attr.set_value(mapped);
                        count += 1;
                    }
                }
            }
        }
        let children: Vec<NodeHandle> = self.children(handle).collect();
        for child in children {
            count += self.remap_identifiers(child, map);
        }
        count
    }

    /// Shift every nested relative-time attribute (`Time`, float) by `delta`
    pub fn shift_time_attributes(
        &mut self,
        handle: NodeHandle,
        delta: f64,
    ) -> Result<(), DocumentError> {
        let mut updates: Vec<String> = Vec::new();
        for attr in self.node(handle).attributes() {
            if attr.name == TIME_ATTR && attr.ty == FLOAT {
                updates.push((attr.as_f64()? + delta).to_string());
            }
        }
        if !updates.is_empty() {
            let mut updates = updates.into_iter();
            for entry in &mut self.node_mut(handle).entries {
                if let NodeEntry::Attribute(attr) = entry {
                    if attr.name == TIME_ATTR && attr.ty == FLOAT {
                        if let Some(next) = updates.next() {
                            attr.set_value(next);
                        }
                    }
                }
            }
        }
        let children: Vec<NodeHandle> = self.children(handle).collect();
        for child in children {
            self.shift_time_attributes(child, delta)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Attribute;

    fn doc_with_root() -> Document {
        Document::new(
            "TestRegion",
            NodeSpec::new("Root")
                .with_attr(Attribute::float("Duration", 5.0))
                .with_empty_children(),
        )
    }

    #[test]
    fn test_attr_required_vs_optional() {
        let doc = doc_with_root();
        assert_eq!(doc.attr_value(doc.root(), "Duration").unwrap(), "5");
        assert!(doc.attr_opt(doc.root(), "Missing").is_none());
        assert!(doc.attr(doc.root(), "Missing").is_err());
    }

    #[test]
    fn test_set_attr_leaves_audit_comment_before_entry() {
        let mut doc = doc_with_root();
        doc.set_attr(doc.root(), "Duration", "7", None).unwrap();
        assert_eq!(doc.attr_value(doc.root(), "Duration").unwrap(), "7");
        let entries = &doc.node(doc.root()).entries;
        match (&entries[0], &entries[1]) {
            (NodeEntry::Comment(c), NodeEntry::Attribute(a)) => {
                assert_eq!(c, "Edited - Updated attribute Duration value from 5 to 7");
                assert_eq!(a.name, "Duration");
            }
            other => panic!("unexpected entry layout: {other:?}"),
        }
    }

    #[test]
    fn test_upsert_adds_missing_attribute_with_comment() {
        let mut doc = doc_with_root();
        doc.upsert_attr(doc.root(), Attribute::float("StartTime", 0.0), Some("shift"))
            .unwrap();
        assert_eq!(doc.attr_value(doc.root(), "StartTime").unwrap(), "0");
        let entries = &doc.node(doc.root()).entries;
        assert!(matches!(&entries[1], NodeEntry::Comment(c) if c == "Edited - shift - Added new attribute"));
    }

    #[test]
    fn test_insert_child_negative_index_semantics() {
        let mut doc = doc_with_root();
        let root = doc.root();
        for name in ["a", "b", "c"] {
            let child = doc.create_node(&NodeSpec::new(name));
            doc.append_child(root, child, None).unwrap();
        }
        // -1 appends
        let tail = doc.create_node(&NodeSpec::new("tail"));
        doc.insert_child(root, tail, -1, None).unwrap();
        // -2 is second-from-end: before "tail", audit comments not counted
        let near_end = doc.create_node(&NodeSpec::new("near_end"));
        doc.insert_child(root, near_end, -2, None).unwrap();
        let ids: Vec<&str> = doc
            .children(root)
            .map(|h| doc.node_id(h).unwrap_or(""))
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "near_end", "tail"]);
    }

    #[test]
    fn test_insert_child_out_of_range() {
        let mut doc = doc_with_root();
        let root = doc.root();
        let child = doc.create_node(&NodeSpec::new("x"));
        let err = doc.insert_child(root, child, -5, None).unwrap_err();
        assert!(matches!(err, DocumentError::IndexOutOfRange { .. }));
    }

    #[test]
    fn test_delete_child_leaves_tombstone() {
        let mut doc = doc_with_root();
        let root = doc.root();
        let child = doc.create_node(
            &NodeSpec::new("Key").with_attr(Attribute::new("TemplateId", "FixedString", "t1")),
        );
        doc.append_child(root, child, None).unwrap();
        doc.delete_child(root, child).unwrap();
        assert_eq!(doc.child_count(root), 0);
        let container = doc.node(root).children.as_ref().expect("container");
        let tombstones: Vec<&str> = container
            .iter()
            .filter_map(|e| match e {
                ChildEntry::Comment(c) => Some(doc.comment_text(*c)),
                ChildEntry::Node(_) => None,
            })
            .collect();
        assert!(tombstones
            .iter()
            .any(|t| t.contains("Deleted child node") && t.contains("TemplateId=t1")));
    }

    #[test]
    fn test_child_with_id_requires_exactly_one() {
        let mut doc = doc_with_root();
        let root = doc.root();
        assert!(matches!(
            doc.child_with_id(root, "Phases"),
            Err(DocumentError::MissingChild { .. })
        ));
        for _ in 0..2 {
            let c = doc.create_node(&NodeSpec::new("Phases"));
            doc.append_child(root, c, None).unwrap();
        }
        assert!(matches!(
            doc.child_with_id(root, "Phases"),
            Err(DocumentError::AmbiguousChild { count: 2, .. })
        ));
    }

    #[test]
    fn test_copy_subtree_across_documents() {
        let mut src = doc_with_root();
        let src_root = src.root();
        let child = src.create_node(
            &NodeSpec::new("Actor").with_attr(Attribute::identifier("UUID", "actor-1")),
        );
        src.append_child(src_root, child, None).unwrap();

        let mut dst = Document::new("Other", NodeSpec::new("Root").with_empty_children());
        let copied = dst.copy_subtree_from(&src, src_root);
        assert_eq!(dst.node_id(copied), Some("Root"));
        let copied_children: Vec<NodeHandle> = dst.children(copied).collect();
        assert_eq!(copied_children.len(), 1);
        assert_eq!(
            dst.attr_value(copied_children[0], "UUID").unwrap(),
            "actor-1"
        );
        // source untouched
        assert_eq!(src.child_count(src_root), 1);
    }

    #[test]
    fn test_identifier_walks() {
        let mut doc = doc_with_root();
        let root = doc.root();
        let child = doc.create_node(
            &NodeSpec::new("Actor")
                .with_attr(Attribute::identifier("UUID", "a"))
                .with_child(NodeSpec::new("Inner").with_attr(Attribute::identifier("Ref", "b"))),
        );
        doc.append_child(root, child, None).unwrap();

        let mut seen = Vec::new();
        doc.collect_identifier_values(root, &mut seen);
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);

        let map: HashMap<String, String> =
            [("a".to_string(), "x".to_string())].into_iter().collect();
        let rewritten = doc.remap_identifiers(root, &map);
        assert_eq!(rewritten, 1);
        assert_eq!(doc.attr_value(child, "UUID").unwrap(), "x");
        // identity outside the map's domain
        let inner = doc.children(child).next().expect("inner");
        assert_eq!(doc.attr_value(inner, "Ref").unwrap(), "b");
    }

    #[test]
    fn test_shift_time_attributes_recurses() {
        let mut doc = doc_with_root();
        let root = doc.root();
        let keys = doc.create_node(
            &NodeSpec::new("Keys").with_child(
                NodeSpec::new("Key")
                    .with_attr(Attribute::float("Time", 1.5))
                    .with_attr(Attribute::new("Value", "bool", "True")),
            ),
        );
        doc.append_child(root, keys, None).unwrap();
        doc.shift_time_attributes(root, 2.0).unwrap();
        let key = doc.children(keys).next().expect("key");
        assert_eq!(doc.attr_value(key, "Time").unwrap(), "3.5");
        assert_eq!(doc.attr_value(key, "Value").unwrap(), "True");
    }
}
