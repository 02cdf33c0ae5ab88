//! Unified error type for document operations
//!
//! Structural assumptions are enforced fail-fast: a half-edited document is
//! unsafe to persist, so there is no partial-success mode.

use thiserror::Error;

/// Unified error type for document operations
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Required attribute is missing from a node
    #[error("Missing attribute '{name}' on node '{node}'")]
    MissingAttribute { name: String, node: String },

    /// Expected exactly one child with the given id, found none
    #[error("Missing child '{id}' under node '{parent}'")]
    MissingChild { id: String, parent: String },

    /// Expected exactly one child with the given id, found several
    #[error("Ambiguous child lookup '{id}' under node '{parent}': {count} matches")]
    AmbiguousChild {
        id: String,
        parent: String,
        count: usize,
    },

    /// A node carries an id that was already seen where uniqueness is required
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    /// A node's id did not match the expected element kind
    #[error("Unexpected node: expected '{expected}', found '{found}'")]
    UnexpectedNode { expected: String, found: String },

    /// Child index is outside the container
    #[error("Child index {index} out of range for container of length {len}")]
    IndexOutOfRange { index: isize, len: usize },

    /// The child to mutate is not in the given container
    #[error("Node is not a child of the given parent")]
    NotAChild,

    /// Value could not be parsed into the declared type
    #[error("Parse error: {0}")]
    Parse(String),

    /// Underlying XML reader/writer failure
    #[error("XML error: {0}")]
    Xml(String),

    /// Filesystem failure while loading or persisting a document
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocumentError {
    /// Create a missing-attribute error
    pub fn missing_attribute(name: impl Into<String>, node: impl Into<String>) -> Self {
        Self::MissingAttribute {
            name: name.into(),
            node: node.into(),
        }
    }

    /// Create a parse error for string-to-value conversion failures
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

impl From<quick_xml::Error> for DocumentError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}
