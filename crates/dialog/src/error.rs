//! Unified error type for dialog-graph operations

use thiserror::Error;

use stagehand_document::DocumentError;

/// Unified error type for dialog-graph operations
#[derive(Debug, Error)]
pub enum DialogError {
    /// No node with the given uuid exists in the graph
    #[error("Dialog node not found: {0}")]
    NodeNotFound(String),

    /// Two nodes in one document carry the same uuid
    #[error("Duplicate dialog node uuid: {0}")]
    DuplicateNode(String),

    /// No node lists the given uuid among its children
    #[error("No parent links node: {0}")]
    NoParents(String),

    /// The branch builder was finalized and rejects further mutation
    #[error("Branch builder already finalized")]
    AlreadyFinalized,

    /// A node builder was configured inconsistently for its kind
    #[error("Invalid node builder: {0}")]
    InvalidBuilder(String),

    /// A branch variant carries a tag missing from the precedence list
    #[error("Unknown variant tag: {0}")]
    UnknownVariantTag(String),

    /// A fixed-path walk asked for a child choice that does not exist
    #[error("Path choice {choice} out of range at node {node} ({children} children)")]
    PathExhausted {
        node: String,
        choice: usize,
        children: usize,
    },

    /// Underlying document failure
    #[error(transparent)]
    Document(#[from] DocumentError),
}
