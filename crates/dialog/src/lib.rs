//! Branching interaction graphs over attribute-tree documents
//!
//! Parses dialog documents into a graph view (node kinds, flag groups,
//! tagged text, speaker roster), builds new nodes and whole conversation
//! branches in the canonical subtree shape, and offers a debug walker over
//! fixed choice paths.

pub mod build;
pub mod error;
pub mod graph;
pub mod order;
pub mod types;
pub mod walk;

pub use build::{BranchBuilder, BranchIds, NewDialogNode};
pub use error::DialogError;
pub use graph::{DialogNodeRef, DialogTree};
pub use order::{order_branch_entries, BranchVariant};
pub use types::{
    DialogNodeKind, DialogSpeaker, EditorData, Flag, FlagGroup, FlagGroupKind, TaggedLine,
};
pub use walk::{walk_path, PathStep};
