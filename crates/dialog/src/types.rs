//! Value objects of the interaction graph

use serde::{Deserialize, Serialize};

/// Constructor kind of a dialog node, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialogNodeKind {
    /// Conversation opener spoken by the responder
    Greeting,
    /// Responder's line
    Answer,
    /// Player-facing option
    Question,
    /// Cinematic trigger, no spoken text of its own
    Cinematic,
    /// Redirects traversal to a target node
    Jump,
    /// Mirrors another node's content by reference
    Alias,
    /// Tag outside the known vocabulary, preserved verbatim
    Unrecognized(String),
}

impl DialogNodeKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "TagGreeting" => Self::Greeting,
            "TagAnswer" => Self::Answer,
            "TagQuestion" => Self::Question,
            "TagCinematic" => Self::Cinematic,
            "Jump" => Self::Jump,
            "Alias" => Self::Alias,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Greeting => "TagGreeting",
            Self::Answer => "TagAnswer",
            Self::Question => "TagQuestion",
            Self::Cinematic => "TagCinematic",
            Self::Jump => "Jump",
            Self::Alias => "Alias",
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Kinds that carry a tagged-text container (everything except
    /// cinematics and aliases)
    pub fn carries_text(&self) -> bool {
        !matches!(self, Self::Cinematic | Self::Alias)
    }
}

/// One boolean condition: flag uuid, expected/target value, optional parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub uuid: String,
    pub value: bool,
    pub param: Option<i64>,
}

impl Flag {
    pub fn new(uuid: impl Into<String>, value: bool) -> Self {
        Self {
            uuid: uuid.into(),
            value,
            param: None,
        }
    }

    pub fn with_param(mut self, param: i64) -> Self {
        self.param = Some(param);
        self
    }
}

/// Scope of a flag group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlagGroupKind {
    Object,
    Global,
    Tag,
    Unrecognized(String),
}

impl FlagGroupKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Object" => Self::Object,
            "Global" => Self::Global,
            "Tag" => Self::Tag,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Object => "Object",
            Self::Global => "Global",
            Self::Tag => "Tag",
            Self::Unrecognized(tag) => tag,
        }
    }
}

/// A set of flags sharing one scope, gating traversal or marking state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagGroup {
    pub kind: FlagGroupKind,
    pub flags: Vec<Flag>,
}

impl FlagGroup {
    pub fn new(kind: FlagGroupKind, flags: Vec<Flag>) -> Self {
        Self { kind, flags }
    }

    pub fn has_flag(&self, uuid: &str) -> bool {
        self.flags.iter().any(|f| f.uuid == uuid)
    }
}

/// One localized text variant of a node; the first line of a node is the
/// default variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedLine {
    /// Localization handle resolved externally to display text
    pub handle: String,
    pub line_id: String,
    pub custom_sequence_id: Option<String>,
}

impl TaggedLine {
    pub fn new(handle: impl Into<String>, line_id: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            line_id: line_id.into(),
            custom_sequence_id: None,
        }
    }

    pub fn with_custom_sequence(mut self, id: impl Into<String>) -> Self {
        self.custom_sequence_id = Some(id.into());
        self
    }
}

/// Editor-only annotation on a cinematic node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorData {
    pub key: String,
    pub value: String,
}

/// One entry of the document's speaker roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogSpeaker {
    pub index: i64,
    pub mapping_id: String,
    pub list_id: String,
}
