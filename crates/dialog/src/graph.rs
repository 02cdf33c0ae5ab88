//! Parsed view over a dialog document
//!
//! [`DialogTree`] owns the backing [`Document`] and a parsed node list.
//! Lookups by uuid and by parent are indexed lazily; structural mutation
//! invalidates the indexes. The model does not proactively validate child
//! references, only lookups fail on dangling uuids.

use std::collections::HashMap;

use stagehand_document::{Document, DocumentError, NodeHandle, NodeSpec};

use crate::build::NewDialogNode;
use crate::error::DialogError;
use crate::types::{
    DialogNodeKind, DialogSpeaker, EditorData, Flag, FlagGroup, FlagGroupKind, TaggedLine,
};

/// Parsed header of one dialog node
#[derive(Debug, Clone)]
pub struct DialogNodeRef {
    pub handle: NodeHandle,
    pub uuid: String,
    pub kind: DialogNodeKind,
    pub speaker: Option<i64>,
    pub group_id: Option<String>,
    pub group_index: Option<i64>,
    pub show_once: bool,
    pub is_root: bool,
}

/// A dialog document and its parsed graph structure
#[derive(Debug)]
pub struct DialogTree {
    pub doc: Document,
    nodes_container: NodeHandle,
    nodes: Vec<DialogNodeRef>,
    roots: Vec<String>,
    speakers: Vec<DialogSpeaker>,
    uuid_index: Option<HashMap<String, usize>>,
    parent_index: Option<HashMap<String, Vec<String>>>,
}

impl DialogTree {
    /// Parse the graph structure out of a loaded document
    pub fn from_document(doc: Document) -> Result<Self, DialogError> {
        let root = doc.root();
        doc.expect_id(root, "dialog")?;

        let speaker_list = doc.child_with_id(root, "speakerlist")?;
        let mut speakers = Vec::new();
        for handle in doc.children_with_id(speaker_list, "speaker") {
            speakers.push(DialogSpeaker {
                index: doc.attr_i64(handle, "index")?,
                mapping_id: doc.attr_value(handle, "SpeakerMappingId")?.to_string(),
                list_id: doc.attr_value(handle, "list")?.to_string(),
            });
        }

        let nodes_container = doc.child_with_id(root, "nodes")?;
        let mut nodes = Vec::new();
        let mut roots = Vec::new();
        for handle in doc.children(nodes_container) {
            match doc.node_id(handle) {
                Some("node") => nodes.push(parse_node_ref(&doc, handle)?),
                Some("RootNodes") => {
                    roots.push(doc.attr_value(handle, "RootNodes")?.to_string());
                }
                _ => {}
            }
        }

        tracing::debug!(
            nodes = nodes.len(),
            roots = roots.len(),
            speakers = speakers.len(),
            "parsed dialog document"
        );
        Ok(Self {
            doc,
            nodes_container,
            nodes,
            roots,
            speakers,
            uuid_index: None,
            parent_index: None,
        })
    }

    pub fn nodes(&self) -> &[DialogNodeRef] {
        &self.nodes
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn speakers(&self) -> &[DialogSpeaker] {
        &self.speakers
    }

    fn ensure_uuid_index(&mut self) -> Result<(), DialogError> {
        if self.uuid_index.is_some() {
            return Ok(());
        }
        let mut index = HashMap::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.uuid.clone(), i).is_some() {
                return Err(DialogError::DuplicateNode(node.uuid.clone()));
            }
        }
        self.uuid_index = Some(index);
        Ok(())
    }

    /// Node lookup by uuid; missing uuids are an error
    pub fn node_by_uuid(&mut self, uuid: &str) -> Result<&DialogNodeRef, DialogError> {
        self.ensure_uuid_index()?;
        let index = self
            .uuid_index
            .as_ref()
            .and_then(|m| m.get(uuid).copied())
            .ok_or_else(|| DialogError::NodeNotFound(uuid.to_string()))?;
        Ok(&self.nodes[index])
    }

    /// Uuids of every node that lists `uuid` among its children
    pub fn parents_of(&mut self, uuid: &str) -> Result<Vec<String>, DialogError> {
        if self.parent_index.is_none() {
            let mut index: HashMap<String, Vec<String>> = HashMap::new();
            for node in &self.nodes {
                for child in self.children_uuids(node.handle)? {
                    index.entry(child).or_default().push(node.uuid.clone());
                }
            }
            self.parent_index = Some(index);
        }
        self.parent_index
            .as_ref()
            .and_then(|m| m.get(uuid).cloned())
            .ok_or_else(|| DialogError::NoParents(uuid.to_string()))
    }

    // ---- node content accessors ----

    /// Child-link uuids of a node, in graph order
    pub fn children_uuids(&self, node: NodeHandle) -> Result<Vec<String>, DialogError> {
        let container = self.doc.child_with_id(node, "children")?;
        let mut uuids = Vec::new();
        for child in self.doc.children_with_id(container, "child") {
            uuids.push(self.doc.attr_value(child, "UUID")?.to_string());
        }
        Ok(uuids)
    }

    fn flag_groups(&self, node: NodeHandle, container_id: &str) -> Result<Vec<FlagGroup>, DialogError> {
        let containers = self.doc.children_with_id(node, container_id);
        let Some(&container) = containers.first() else {
            return Ok(Vec::new());
        };
        let mut groups = Vec::new();
        for group in self.doc.children_with_id(container, "flaggroup") {
            let kind = FlagGroupKind::from_tag(self.doc.attr_value(group, "type")?);
            let mut flags = Vec::new();
            for flag in self.doc.children_with_id(group, "flag") {
                let param = match self.doc.attr_value_opt(flag, "paramval") {
                    Some(v) => Some(v.parse::<i64>().map_err(|e| {
                        DocumentError::parse(format!("flag paramval: {e}"))
                    })?),
                    None => None,
                };
                flags.push(Flag {
                    uuid: self.doc.attr_value(flag, "UUID")?.to_string(),
                    value: self.doc.attr_value(flag, "value")? == "True",
                    param,
                });
            }
            groups.push(FlagGroup { kind, flags });
        }
        Ok(groups)
    }

    /// Precondition groups gating this node
    pub fn check_flags(&self, node: NodeHandle) -> Result<Vec<FlagGroup>, DialogError> {
        self.flag_groups(node, "checkflags")
    }

    /// Postcondition groups applied when this node plays
    pub fn set_flags(&self, node: NodeHandle) -> Result<Vec<FlagGroup>, DialogError> {
        self.flag_groups(node, "setflags")
    }

    pub fn has_check_flag(&self, node: NodeHandle, uuid: &str) -> Result<bool, DialogError> {
        Ok(self.check_flags(node)?.iter().any(|g| g.has_flag(uuid)))
    }

    pub fn has_set_flag(&self, node: NodeHandle, uuid: &str) -> Result<bool, DialogError> {
        Ok(self.set_flags(node)?.iter().any(|g| g.has_flag(uuid)))
    }

    /// Localized text variants, in document order; the first is the default
    pub fn tagged_lines(&self, node: NodeHandle) -> Result<Vec<TaggedLine>, DialogError> {
        let containers = self.doc.children_with_id(node, "TaggedTexts");
        let Some(&container) = containers.first() else {
            return Ok(Vec::new());
        };
        let mut lines = Vec::new();
        for tagged in self.doc.children_with_id(container, "TaggedText") {
            for texts in self.doc.children_with_id(tagged, "TagTexts") {
                for text in self.doc.children_with_id(texts, "TagText") {
                    lines.push(TaggedLine {
                        handle: self.doc.attr_value(text, "TagText")?.to_string(),
                        line_id: self.doc.attr_value(text, "LineId")?.to_string(),
                        custom_sequence_id: self
                            .doc
                            .attr_value_opt(text, "CustomSequenceId")
                            .map(str::to_string),
                    });
                }
            }
        }
        Ok(lines)
    }

    pub fn editor_data(&self, node: NodeHandle) -> Result<Vec<EditorData>, DialogError> {
        let containers = self.doc.children_with_id(node, "editorData");
        let Some(&container) = containers.first() else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for data in self.doc.children_with_id(container, "data") {
            entries.push(EditorData {
                key: self.doc.attr_value(data, "key")?.to_string(),
                value: self.doc.attr_value(data, "val")?.to_string(),
            });
        }
        Ok(entries)
    }

    /// For alias nodes: uuid of the mirrored node
    pub fn alias_source(&self, node: NodeHandle) -> Option<&str> {
        self.doc.attr_value_opt(node, "SourceNode")
    }

    /// For jump nodes: uuid the traversal is redirected to
    pub fn jump_target(&self, node: NodeHandle) -> Option<&str> {
        self.doc.attr_value_opt(node, "jumptarget")
    }

    // ---- mutation ----

    /// Graft child links into an existing node's child list. Index `-1`
    /// appends; other negative indexes resolve against the current length.
    pub fn insert_children(
        &mut self,
        node_uuid: &str,
        uuids: &[String],
        index: isize,
    ) -> Result<(), DialogError> {
        let handle = self.node_by_uuid(node_uuid)?.handle;
        let container = self.doc.child_with_id(handle, "children")?;
        for (i, uuid) in uuids.iter().enumerate() {
            let child = self.doc.create_node(&child_link_spec(uuid));
            // negative indexes stay stable as the container grows, keeping
            // insertion order; positive ones advance by one per entry
            let effective = if index < 0 { index } else { index + i as isize };
            self.doc
                .insert_child(container, child, effective, Some("child link"))?;
        }
        self.parent_index = None;
        tracing::debug!(node = node_uuid, count = uuids.len(), "grafted child links");
        Ok(())
    }

    /// Drop every child link of a node, tombstoned
    pub fn clear_children(&mut self, node_uuid: &str) -> Result<(), DialogError> {
        let handle = self.node_by_uuid(node_uuid)?.handle;
        let container = self.doc.child_with_id(handle, "children")?;
        let children: Vec<NodeHandle> = self.doc.children_with_id(container, "child");
        for child in children {
            self.doc.delete_child(container, child)?;
        }
        self.parent_index = None;
        Ok(())
    }

    /// Materialize a built node and prepend it to the node list
    pub fn add_node(&mut self, new: &NewDialogNode) -> Result<NodeHandle, DialogError> {
        let spec = new.to_spec()?;
        let handle = self.doc.create_node(&spec);
        self.doc
            .insert_child(self.nodes_container, handle, 0, Some("new dialog node"))?;
        let node_ref = parse_node_ref(&self.doc, handle)?;
        tracing::debug!(uuid = %node_ref.uuid, kind = node_ref.kind.tag(), "added dialog node");
        if let Some(index) = &mut self.uuid_index {
            if index.insert(node_ref.uuid.clone(), self.nodes.len()).is_some() {
                return Err(DialogError::DuplicateNode(node_ref.uuid));
            }
        }
        self.parent_index = None;
        self.nodes.push(node_ref);
        Ok(handle)
    }
}

fn child_link_spec(uuid: &str) -> NodeSpec {
    NodeSpec::new("child").with_attr(stagehand_document::Attribute::new(
        "UUID",
        "FixedString",
        uuid,
    ))
}

fn parse_node_ref(doc: &Document, handle: NodeHandle) -> Result<DialogNodeRef, DialogError> {
    let kind = DialogNodeKind::from_tag(doc.attr_value(handle, "constructor")?);
    let speaker = match doc.attr_value_opt(handle, "speaker") {
        Some(v) => Some(
            v.parse::<i64>()
                .map_err(|e| DocumentError::parse(format!("speaker index: {e}")))?,
        ),
        None => None,
    };
    let group_index = match doc.attr_value_opt(handle, "GroupIndex") {
        Some(v) => Some(
            v.parse::<i64>()
                .map_err(|e| DocumentError::parse(format!("group index: {e}")))?,
        ),
        None => None,
    };
    Ok(DialogNodeRef {
        handle,
        uuid: doc.attr_value(handle, "UUID")?.to_string(),
        kind,
        speaker,
        group_id: doc.attr_value_opt(handle, "GroupID").map(str::to_string),
        group_index,
        show_once: doc.attr_value_opt(handle, "ShowOnce") == Some("True"),
        is_root: doc.attr_value_opt(handle, "Root") == Some("True"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::NewDialogNode;
    use crate::types::DialogNodeKind;
    use stagehand_document::Attribute;

    pub(crate) fn empty_dialog_doc() -> Document {
        let speaker = |index: i64, mapping: &str| {
            NodeSpec::new("speaker")
                .with_key("index")
                .with_attr(Attribute::new("index", "int32", index.to_string()))
                .with_attr(Attribute::new("SpeakerMappingId", "LSString", mapping))
                .with_attr(Attribute::new("list", "LSString", "list-1"))
        };
        Document::new(
            "dialog",
            NodeSpec::new("dialog")
                .with_child(
                    NodeSpec::new("speakerlist")
                        .with_child(speaker(0, "speaker-zero"))
                        .with_child(speaker(1, "speaker-one")),
                )
                .with_child(NodeSpec::new("nodes").with_empty_children()),
        )
    }

    fn tree_with_nodes() -> DialogTree {
        let mut tree = DialogTree::from_document(empty_dialog_doc()).unwrap();
        let answer = NewDialogNode::new(DialogNodeKind::Answer, "answer-1")
            .with_speaker(0)
            .with_child("question-1")
            .with_line(TaggedLine::new("h_answer", "line-1"));
        let question = NewDialogNode::new(DialogNodeKind::Question, "question-1")
            .with_speaker(1)
            .with_line(TaggedLine::new("h_question", "line-2"));
        tree.add_node(&answer).unwrap();
        tree.add_node(&question).unwrap();
        tree
    }

    #[test]
    fn test_parse_roster_and_lookup() {
        let mut tree = tree_with_nodes();
        assert_eq!(tree.speakers().len(), 2);
        assert_eq!(tree.speakers()[1].mapping_id, "speaker-one");
        let node = tree.node_by_uuid("answer-1").unwrap();
        assert_eq!(node.kind, DialogNodeKind::Answer);
        assert_eq!(node.speaker, Some(0));
        assert!(matches!(
            tree.node_by_uuid("missing"),
            Err(DialogError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_uuid_is_an_error() {
        let mut tree = DialogTree::from_document(empty_dialog_doc()).unwrap();
        let node = NewDialogNode::new(DialogNodeKind::Answer, "dup").with_speaker(0);
        tree.add_node(&node).unwrap();
        // index not built yet, second add succeeds physically
        tree.uuid_index = None;
        tree.add_node(&node).unwrap();
        assert!(matches!(
            tree.node_by_uuid("dup"),
            Err(DialogError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_children_and_parents() {
        let mut tree = tree_with_nodes();
        let handle = tree.node_by_uuid("answer-1").unwrap().handle;
        assert_eq!(tree.children_uuids(handle).unwrap(), vec!["question-1"]);
        assert_eq!(tree.parents_of("question-1").unwrap(), vec!["answer-1"]);
        assert!(matches!(
            tree.parents_of("answer-1"),
            Err(DialogError::NoParents(_))
        ));
    }

    #[test]
    fn test_insert_children_negative_index() {
        let mut tree = tree_with_nodes();
        tree.insert_children(
            "answer-1",
            &["a".to_string(), "b".to_string()],
            -1,
        )
        .unwrap();
        let handle = tree.node_by_uuid("answer-1").unwrap().handle;
        assert_eq!(
            tree.children_uuids(handle).unwrap(),
            vec!["question-1", "a", "b"]
        );
        // -2 lands the new link second-from-end
        tree.insert_children("answer-1", &["c".to_string()], -2).unwrap();
        assert_eq!(
            tree.children_uuids(handle).unwrap(),
            vec!["question-1", "a", "c", "b"]
        );
    }

    #[test]
    fn test_clear_children_leaves_tombstones() {
        let mut tree = tree_with_nodes();
        tree.clear_children("answer-1").unwrap();
        let handle = tree.node_by_uuid("answer-1").unwrap().handle;
        assert!(tree.children_uuids(handle).unwrap().is_empty());
        let out = stagehand_document::xml::to_string(&tree.doc).unwrap();
        assert!(out.contains("Deleted child node"));
    }

    #[test]
    fn test_tagged_lines_and_flags() {
        let mut tree = DialogTree::from_document(empty_dialog_doc()).unwrap();
        let node = NewDialogNode::new(DialogNodeKind::Question, "q")
            .with_speaker(1)
            .with_line(TaggedLine::new("h_first", "line-a"))
            .with_line(TaggedLine::new("h_second", "line-b").with_custom_sequence("line-b"))
            .with_check_flag_group(FlagGroup::new(
                FlagGroupKind::Tag,
                vec![Flag::new("tag-1", true).with_param(1)],
            ))
            .with_set_flag_group(FlagGroup::new(
                FlagGroupKind::Object,
                vec![Flag::new("start-flag", true).with_param(0)],
            ));
        let handle = tree.add_node(&node).unwrap();

        let lines = tree.tagged_lines(handle).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].handle, "h_first");
        assert_eq!(lines[0].custom_sequence_id, None);
        assert_eq!(lines[1].custom_sequence_id.as_deref(), Some("line-b"));

        assert!(tree.has_check_flag(handle, "tag-1").unwrap());
        assert!(tree.has_set_flag(handle, "start-flag").unwrap());
        assert!(!tree.has_set_flag(handle, "tag-1").unwrap());
        let checks = tree.check_flags(handle).unwrap();
        assert_eq!(checks[0].kind, FlagGroupKind::Tag);
        assert_eq!(checks[0].flags[0].param, Some(1));
    }
}
