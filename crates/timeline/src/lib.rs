//! Timed-event timelines over attribute-tree documents
//!
//! Parses timeline and scene documents into structural views (speaker
//! rosters, phase partitions, duration windows, staging records), edits them
//! in place with audit trails, and splices phases across documents: events
//! are deep-copied, shifted to the destination clock, rebound to the
//! destination's actors and appended together with their staging
//! dependencies.

pub mod actor_map;
pub mod audio;
pub mod duration;
pub mod edits;
pub mod error;
pub mod event;
pub mod inspect;
pub mod phase;
pub mod scene;
pub mod splice;
pub mod timeline;

pub use actor_map::ActorMap;
pub use audio::{AudioIndex, LineAudio};
pub use duration::DurationGroup;
pub use edits::{
    run_edit_script, AttributeEdit, ChildGraft, ChildPath, PhaseEditScript, PhaseExtension,
};
pub use error::TimelineError;
pub use event::{emotion_label, EmotionKey, EventKind, EventNode, EventSpec};
pub use inspect::phase_overview;
pub use phase::EffectPhase;
pub use scene::{CameraRecord, SceneActor, SceneTree, StageRecord};
pub use splice::{copy_phase_between, CopyPhaseOptions, PhaseDependencies};
pub use timeline::{
    ActorRecord, PeanutSlot, PhaseMapEntry, PhaseRecord, TimelineSpeaker, TimelineTree,
};
