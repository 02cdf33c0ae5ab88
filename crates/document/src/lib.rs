//! Attribute-keyed node trees with an auditable edit trail
//!
//! Foundation crate for the stagehand tools: an arena-backed document model
//! for LSX-style content files, typed attribute access, structural edits that
//! leave inline audit comments, XML load/save, and pluggable identifier
//! allocation and localization lookup.

pub mod attr;
pub mod document;
pub mod error;
pub mod ids;
pub mod lookup;
pub mod node;
pub mod xml;

pub use attr::{AttrValue, Attribute, FLOAT, IDENTIFIER, TRANSLATED_STRING};
pub use document::{DocVersion, Document, TIME_ATTR};
pub use error::DocumentError;
pub use ids::{IdAllocator, SequenceAllocator, UuidAllocator};
pub use lookup::{Localization, LocalizationTable};
pub use node::{ChildEntry, CommentHandle, NodeData, NodeEntry, NodeHandle, NodeSpec, SpecAttr};
