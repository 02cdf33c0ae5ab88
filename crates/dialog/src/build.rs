//! Construction of new dialog subtrees
//!
//! [`NewDialogNode`] emits the canonical node shape: child-link container,
//! empty GameData/Tags stubs, set/check flag containers, then tagged text for
//! speaking kinds or editor data for cinematics. [`BranchBuilder`] assembles
//! a whole conversation branch (option, transition, variant entries, shared
//! destination) and enforces one-shot finalization.

use stagehand_document::{Attribute, NodeSpec};

use crate::error::DialogError;
use crate::types::{DialogNodeKind, Flag, FlagGroup, FlagGroupKind, TaggedLine};

fn bool_attr(name: &str, value: bool) -> Attribute {
    Attribute::new(name, "bool", if value { "True" } else { "False" })
}

fn flag_spec(flag: &Flag) -> NodeSpec {
    let mut spec = NodeSpec::new("flag")
        .with_key("UUID")
        .with_attr(Attribute::new("UUID", "FixedString", &flag.uuid))
        .with_attr(bool_attr("value", flag.value));
    if let Some(param) = flag.param {
        spec = spec.with_attr(Attribute::new("paramval", "int32", param.to_string()));
    }
    spec
}

fn flag_group_spec(group: &FlagGroup) -> NodeSpec {
    NodeSpec::new("flaggroup")
        .with_key("type")
        .with_attr(Attribute::new("type", "FixedString", group.kind.tag()))
        .with_children(group.flags.iter().map(flag_spec))
}

fn tag_text_spec(line: &TaggedLine) -> NodeSpec {
    let mut spec = NodeSpec::new("TagText")
        .with_attr(Attribute::translated("TagText", &line.handle))
        .with_attr(Attribute::identifier("LineId", &line.line_id))
        .with_attr(bool_attr("stub", true));
    if let Some(seq) = &line.custom_sequence_id {
        spec = spec.with_attr(Attribute::identifier("CustomSequenceId", seq));
    }
    spec
}

fn tagged_text_spec(lines: &[TaggedLine]) -> NodeSpec {
    NodeSpec::new("TaggedText")
        .with_attr(bool_attr("HasTagRule", true))
        .with_child(NodeSpec::new("TagTexts").with_children(lines.iter().map(tag_text_spec)))
        .with_child(
            NodeSpec::new("RuleGroup")
                .with_attr(Attribute::new("TagCombineOp", "uint8", "0"))
                .with_child(NodeSpec::new("Rules")),
        )
}

fn game_data_stub() -> NodeSpec {
    NodeSpec::new("GameData")
        .with_child(NodeSpec::new("AiPersonalities").with_key("AiPersonality"))
        .with_child(NodeSpec::new("MusicInstrumentSounds"))
        .with_child(NodeSpec::new("OriginSound"))
}

/// Builder for one dialog node in its canonical subtree shape
#[derive(Debug, Clone)]
pub struct NewDialogNode {
    pub kind: DialogNodeKind,
    pub uuid: String,
    pub speaker: Option<i64>,
    pub source_node: Option<String>,
    pub transition_mode: Option<u8>,
    pub end_node: bool,
    pub children: Vec<String>,
    pub set_flags: Vec<FlagGroup>,
    pub check_flags: Vec<FlagGroup>,
    pub lines: Vec<TaggedLine>,
    pub editor_note: Option<String>,
}

impl NewDialogNode {
    pub fn new(kind: DialogNodeKind, uuid: impl Into<String>) -> Self {
        Self {
            kind,
            uuid: uuid.into(),
            speaker: None,
            source_node: None,
            transition_mode: None,
            end_node: false,
            children: Vec::new(),
            set_flags: Vec::new(),
            check_flags: Vec::new(),
            lines: Vec::new(),
            editor_note: None,
        }
    }

    pub fn with_speaker(mut self, speaker: i64) -> Self {
        self.speaker = Some(speaker);
        self
    }

    pub fn with_source_node(mut self, uuid: impl Into<String>) -> Self {
        self.source_node = Some(uuid.into());
        self
    }

    /// Transition mode 2 marks a silent pass-through response
    pub fn with_transition_mode(mut self, mode: u8) -> Self {
        self.transition_mode = Some(mode);
        self
    }

    pub fn as_end_node(mut self) -> Self {
        self.end_node = true;
        self
    }

    pub fn with_child(mut self, uuid: impl Into<String>) -> Self {
        self.children.push(uuid.into());
        self
    }

    pub fn with_children(mut self, uuids: impl IntoIterator<Item = String>) -> Self {
        self.children.extend(uuids);
        self
    }

    pub fn with_set_flag_group(mut self, group: FlagGroup) -> Self {
        self.set_flags.push(group);
        self
    }

    pub fn with_check_flag_group(mut self, group: FlagGroup) -> Self {
        self.check_flags.push(group);
        self
    }

    pub fn with_line(mut self, line: TaggedLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn with_editor_note(mut self, note: impl Into<String>) -> Self {
        self.editor_note = Some(note.into());
        self
    }

    /// Emit the canonical subtree for this node
    pub fn to_spec(&self) -> Result<NodeSpec, DialogError> {
        if self.editor_note.is_some() && self.kind != DialogNodeKind::Cinematic {
            return Err(DialogError::InvalidBuilder(format!(
                "editor note on non-cinematic node {}",
                self.uuid
            )));
        }
        if !self.lines.is_empty() && !self.kind.carries_text() {
            return Err(DialogError::InvalidBuilder(format!(
                "tagged text on {} node {}",
                self.kind.tag(),
                self.uuid
            )));
        }

        let mut spec = NodeSpec::new("node")
            .with_key("UUID")
            .with_attr(Attribute::new("constructor", "FixedString", self.kind.tag()))
            .with_attr(Attribute::new("UUID", "FixedString", &self.uuid));
        if self.end_node {
            spec = spec.with_attr(bool_attr("endnode", true));
        }
        if let Some(speaker) = self.speaker {
            spec = spec.with_attr(Attribute::new("speaker", "int32", speaker.to_string()));
        }
        if let Some(source) = &self.source_node {
            spec = spec.with_attr(Attribute::new("SourceNode", "FixedString", source));
        }
        if let Some(mode) = self.transition_mode {
            spec = spec.with_attr(Attribute::new("transitionmode", "uint8", mode.to_string()));
        }

        let child_links = NodeSpec::new("children").with_children(self.children.iter().map(|c| {
            NodeSpec::new("child").with_attr(Attribute::new("UUID", "FixedString", c))
        }));
        spec = spec
            .with_child(child_links)
            .with_child(game_data_stub())
            .with_child(NodeSpec::new("Tags"))
            .with_child(
                NodeSpec::new("setflags").with_children(self.set_flags.iter().map(flag_group_spec)),
            )
            .with_child(
                NodeSpec::new("checkflags")
                    .with_children(self.check_flags.iter().map(flag_group_spec)),
            );

        if self.kind.carries_text() {
            spec = spec.with_child(
                NodeSpec::new("TaggedTexts")
                    .with_children(if self.lines.is_empty() {
                        Vec::new()
                    } else {
                        vec![tagged_text_spec(&self.lines)]
                    }),
            );
        } else if let Some(note) = &self.editor_note {
            spec = spec.with_child(
                NodeSpec::new("editorData").with_child(
                    NodeSpec::new("data")
                        .with_key("key")
                        .with_attr(Attribute::new("key", "FixedString", "CinematicNodeContext"))
                        .with_attr(Attribute::new("val", "LSString", note)),
                ),
            );
        }
        Ok(spec)
    }
}

/// Fixed identifiers a branch cluster is built around
#[derive(Debug, Clone)]
pub struct BranchIds {
    /// Option node grafted into the existing menu
    pub entry_option: String,
    /// Responder node whose children are the branch options
    pub response_hub: String,
    /// Shared node every branch entry converges back to
    pub destination: String,
    /// Pre-existing node that lets the player leave the branch
    pub leave_option: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Open,
    Finalized,
}

/// Assembles a self-consistent conversation branch
///
/// Collects option nodes while open, then finalizes exactly once into the
/// response hub (and optional alias back into existing content). Reuse after
/// finalization is an explicit error.
#[derive(Debug)]
pub struct BranchBuilder {
    ids: BranchIds,
    /// Object flag set when the player commits to a branch option
    start_flag: String,
    /// Object flag set when a branch entry finishes playing
    completion_flag: String,
    options: Vec<String>,
    state: BuilderState,
}

impl BranchBuilder {
    pub fn new(
        ids: BranchIds,
        start_flag: impl Into<String>,
        completion_flag: impl Into<String>,
    ) -> Self {
        Self {
            ids,
            start_flag: start_flag.into(),
            completion_flag: completion_flag.into(),
            options: Vec::new(),
            state: BuilderState::Open,
        }
    }

    fn guard(&self) -> Result<(), DialogError> {
        match self.state {
            BuilderState::Open => Ok(()),
            BuilderState::Finalized => Err(DialogError::AlreadyFinalized),
        }
    }

    /// Option uuids collected so far, in insertion order
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// The top-level option that enters this branch from the existing menu
    pub fn entry_option(
        &self,
        line: TaggedLine,
        check_flags: Vec<FlagGroup>,
    ) -> NewDialogNode {
        let mut node = NewDialogNode::new(DialogNodeKind::Question, &self.ids.entry_option)
            .with_speaker(1)
            .with_child(&self.ids.response_hub)
            .with_line(line);
        for group in check_flags {
            node = node.with_check_flag_group(group);
        }
        node
    }

    /// One selectable option plus its transition into the branch entries.
    /// `response_lines` voice the transition; when empty it passes through
    /// silently.
    pub fn add_branch(
        &mut self,
        option_uuid: impl Into<String>,
        transition_uuid: impl Into<String>,
        entry_uuids: Vec<String>,
        player_line: TaggedLine,
        response_lines: Vec<TaggedLine>,
        required_tags: Vec<Flag>,
    ) -> Result<Vec<NewDialogNode>, DialogError> {
        self.guard()?;
        let option_uuid = option_uuid.into();
        let transition_uuid = transition_uuid.into();
        self.options.push(option_uuid.clone());

        let mut transition = NewDialogNode::new(DialogNodeKind::Answer, &transition_uuid)
            .with_speaker(0)
            .with_children(entry_uuids);
        if response_lines.is_empty() {
            transition = transition.with_transition_mode(2);
        } else {
            for line in sequence_lines(response_lines) {
                transition = transition.with_line(line);
            }
        }

        let mut option = NewDialogNode::new(DialogNodeKind::Question, &option_uuid)
            .with_speaker(1)
            .with_child(&transition_uuid)
            .with_set_flag_group(FlagGroup::new(
                FlagGroupKind::Object,
                vec![Flag::new(&self.start_flag, true).with_param(0)],
            ))
            .with_line(player_line);
        if !required_tags.is_empty() {
            option = option.with_check_flag_group(FlagGroup::new(FlagGroupKind::Tag, required_tags));
        }
        Ok(vec![option, transition])
    }

    /// Register an already-existing node as one of the branch options
    pub fn add_existing_option(&mut self, uuid: impl Into<String>) -> Result<(), DialogError> {
        self.guard()?;
        self.options.push(uuid.into());
        Ok(())
    }

    /// One cinematic branch entry: variant preconditions select when it
    /// applies, the completion flag marks it done, and it converges on the
    /// shared destination.
    pub fn cinematic_entry(
        &self,
        uuid: impl Into<String>,
        variant_flags: Vec<FlagGroup>,
        editor_note: impl Into<String>,
    ) -> Result<NewDialogNode, DialogError> {
        self.guard()?;
        let mut node = NewDialogNode::new(DialogNodeKind::Cinematic, uuid)
            .with_speaker(-1)
            .with_child(&self.ids.destination)
            .with_set_flag_group(FlagGroup::new(
                FlagGroupKind::Object,
                vec![Flag::new(&self.completion_flag, true).with_param(0)],
            ))
            .with_editor_note(editor_note);
        for group in variant_flags {
            node = node.with_check_flag_group(group);
        }
        Ok(node)
    }

    /// One-shot finalization: the response hub listing every collected
    /// option, plus an optional alias routing the destination back through
    /// `existing_response`.
    pub fn finalize(
        &mut self,
        existing_response: Option<&str>,
        response_lines: Vec<TaggedLine>,
    ) -> Result<Vec<NewDialogNode>, DialogError> {
        self.guard()?;
        self.state = BuilderState::Finalized;

        let mut hub_children = self.options.clone();
        hub_children.push(self.ids.leave_option.clone());

        let mut hub = NewDialogNode::new(DialogNodeKind::Answer, &self.ids.response_hub)
            .with_speaker(0)
            .with_children(hub_children.iter().cloned());
        if response_lines.is_empty() {
            hub = hub.with_transition_mode(2);
        } else {
            for line in sequence_lines(response_lines) {
                hub = hub.with_line(line);
            }
        }

        let mut nodes = vec![hub];
        if let Some(source) = existing_response {
            nodes.push(
                NewDialogNode::new(DialogNodeKind::Alias, &self.ids.destination)
                    .with_speaker(-1)
                    .with_source_node(source)
                    .with_children(hub_children),
            );
        }
        tracing::info!(options = self.options.len(), "finalized branch");
        Ok(nodes)
    }
}

/// Mark every line after the first with its own custom sequence id
fn sequence_lines(lines: Vec<TaggedLine>) -> Vec<TaggedLine> {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line
            } else {
                let seq = line.line_id.clone();
                line.with_custom_sequence(seq)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> BranchIds {
        BranchIds {
            entry_option: "entry".to_string(),
            response_hub: "hub".to_string(),
            destination: "dest".to_string(),
            leave_option: "leave".to_string(),
        }
    }

    #[test]
    fn test_cinematic_rejects_tagged_text() {
        let node = NewDialogNode::new(DialogNodeKind::Cinematic, "c")
            .with_line(TaggedLine::new("h", "l"));
        assert!(matches!(node.to_spec(), Err(DialogError::InvalidBuilder(_))));
    }

    #[test]
    fn test_editor_note_only_on_cinematic() {
        let bad = NewDialogNode::new(DialogNodeKind::Answer, "a").with_editor_note("note");
        assert!(bad.to_spec().is_err());
        let good = NewDialogNode::new(DialogNodeKind::Cinematic, "c").with_editor_note("note");
        assert!(good.to_spec().is_ok());
    }

    #[test]
    fn test_canonical_subtree_order() {
        let spec = NewDialogNode::new(DialogNodeKind::Question, "q")
            .with_speaker(1)
            .with_child("x")
            .with_line(TaggedLine::new("h", "l"))
            .to_spec()
            .unwrap();
        let ids: Vec<&str> = spec
            .children
            .iter()
            .map(|c| c.id.as_deref().unwrap_or(""))
            .collect();
        assert_eq!(
            ids,
            vec!["children", "GameData", "Tags", "setflags", "checkflags", "TaggedTexts"]
        );
    }

    #[test]
    fn test_silent_transition_gets_mode_two() {
        let mut builder = BranchBuilder::new(ids(), "start-flag", "end-flag");
        let nodes = builder
            .add_branch(
                "opt-1",
                "trans-1",
                vec!["entry-a".to_string()],
                TaggedLine::new("h_player", "l1"),
                Vec::new(),
                Vec::new(),
            )
            .unwrap();
        assert_eq!(nodes[1].transition_mode, Some(2));
        assert!(nodes[1].lines.is_empty());
        // option sets the start flag and leads only to the transition
        assert_eq!(nodes[0].children, vec!["trans-1"]);
        assert!(nodes[0].set_flags[0].has_flag("start-flag"));
    }

    #[test]
    fn test_voiced_transition_sequences_extra_lines() {
        let mut builder = BranchBuilder::new(ids(), "start-flag", "end-flag");
        let nodes = builder
            .add_branch(
                "opt-1",
                "trans-1",
                vec![],
                TaggedLine::new("h_player", "l1"),
                vec![
                    TaggedLine::new("h_a", "line-a"),
                    TaggedLine::new("h_b", "line-b"),
                ],
                Vec::new(),
            )
            .unwrap();
        let transition = &nodes[1];
        assert_eq!(transition.transition_mode, None);
        assert_eq!(transition.lines[0].custom_sequence_id, None);
        assert_eq!(
            transition.lines[1].custom_sequence_id.as_deref(),
            Some("line-b")
        );
    }

    #[test]
    fn test_finalize_is_one_shot() {
        let mut builder = BranchBuilder::new(ids(), "start-flag", "end-flag");
        builder.add_existing_option("opt-existing").unwrap();
        let nodes = builder.finalize(Some("old-response"), Vec::new()).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].children, vec!["opt-existing", "leave"]);
        assert_eq!(nodes[1].kind, DialogNodeKind::Alias);
        assert_eq!(nodes[1].source_node.as_deref(), Some("old-response"));

        assert!(matches!(
            builder.finalize(None, Vec::new()),
            Err(DialogError::AlreadyFinalized)
        ));
        assert!(matches!(
            builder.add_existing_option("late"),
            Err(DialogError::AlreadyFinalized)
        ));
        assert!(matches!(
            builder.cinematic_entry("late", Vec::new(), "n"),
            Err(DialogError::AlreadyFinalized)
        ));
    }

    #[test]
    fn test_finalize_without_alias() {
        let mut builder = BranchBuilder::new(ids(), "s", "e");
        let nodes = builder.finalize(None, Vec::new()).unwrap();
        assert_eq!(nodes.len(), 1);
    }
}
