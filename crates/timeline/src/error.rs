//! Unified error type for timeline operations
//!
//! Splicing and resizing are all-or-nothing: a timeline that fails one of
//! these checks must not be persisted, so every check is a hard error.

use thiserror::Error;

use stagehand_document::DocumentError;

/// Unified error type for timeline operations
#[derive(Debug, Error)]
pub enum TimelineError {
    /// A phase index does not address an existing phase
    #[error("Phase index {index} out of range ({phases} phases)")]
    PhaseOutOfRange { index: usize, phases: usize },

    /// A phase carries no events at all
    #[error("Phase {0} has no events")]
    EmptyPhase(usize),

    /// The parallel phase-record list and the event partition disagree
    #[error("Phase record count {records} does not line up with event phase count {phases}")]
    PhaseCountMismatch { records: usize, phases: usize },

    /// Appending requires at least one existing phase to append after
    #[error("Timeline has no phases to append after")]
    NoPhases,

    /// Event phase indexes must cover 0..n without gaps
    #[error("Non-contiguous phase indexes: expected {expected}, found {found}")]
    NonContiguousPhases { expected: usize, found: i64 },

    /// The speaker roster is too small to be a usable timeline
    #[error("Timeline needs at least two speakers, found {0}")]
    NotEnoughSpeakers(usize),

    /// The resize path requires exactly one voice event in the copied phase
    #[error("Expected exactly one voice event in the copied phase, found {0}")]
    VoiceEventCount(usize),

    /// No sub-duration window ends at the current phase end
    #[error("No sub-duration window ends at the phase end")]
    NoTrailingSubDuration,

    /// Copied phases this short are almost certainly a source-selection bug
    #[error("Phase duration {0}s is suspiciously short")]
    DurationTooShort(f64),

    /// A resize would move a window's end before its start
    #[error("Resized window would end at {end} before its start at {start}")]
    WindowInverted { start: f64, end: f64 },

    /// A relative-time key would land past the window it is placed in
    #[error("Relative key at {at} exceeds the window end {end}")]
    KeyPastWindowEnd { at: f64, end: f64 },

    /// Event lookup by identifier failed
    #[error("Event '{0}' not found in phase")]
    EventNotFound(String),

    /// Two events in one phase share an identifier
    #[error("Duplicate event id: {0}")]
    DuplicateEvent(String),

    /// The event found under an identifier is not of the expected kind
    #[error("Event '{uuid}' is a {found}, expected {expected}")]
    EventKindMismatch {
        uuid: String,
        expected: String,
        found: String,
    },

    /// An event carries more than one actor reference
    #[error("Event '{0}' has more than one actor reference")]
    AmbiguousActor(String),

    /// Wholesale id replacement needs one id per copied event
    #[error("{provided} replacement ids provided but the copied phase has {events} events")]
    NotEnoughReplacementIds { provided: usize, events: usize },

    /// Two phase-map entries share a dialog-node key
    #[error("Duplicate phase-map key: {0}")]
    DuplicatePhaseKey(String),

    /// Phase extension must grow the phase
    #[error("Extension amount must be positive, got {0}")]
    NonPositiveExtension(f64),

    /// A camera record's map key must equal the camera's own identifier
    #[error("Camera record key {map_key} does not match camera identifier {identifier}")]
    CameraKeyMismatch { map_key: String, identifier: String },

    /// An edit-script child path does not resolve under the addressed event
    #[error("Child path step {id}[{index}] not found under event {event}")]
    PathNotFound {
        event: String,
        id: String,
        index: usize,
    },

    /// Underlying document failure
    #[error(transparent)]
    Document(#[from] DocumentError),
}
