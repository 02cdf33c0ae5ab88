//! Timed events and event construction
//!
//! An event is an `EffectComponent` node: a typed, time-bounded unit of
//! timeline behavior (voice line, camera shot, emotion change, ...). The
//! wrapper caches the identity and window attributes; all mutation goes back
//! through the owning [`Document`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use stagehand_document::{Attribute, Document, NodeHandle, NodeSpec};

use crate::error::TimelineError;

pub(crate) const TYPE_ATTR: &str = "Type";
pub(crate) const ID_ATTR: &str = "ID";
pub(crate) const START_ATTR: &str = "StartTime";
pub(crate) const END_ATTR: &str = "EndTime";
pub(crate) const PHASE_INDEX_ATTR: &str = "PhaseIndex";

/// Kind of a timed event, from the known event vocabulary
///
/// Unknown tags are tolerated and carried verbatim so documents authored by
/// newer tooling survive a round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Voice,
    Attitude,
    Shot,
    SwitchStage,
    Sound,
    ShowVisual,
    LookAt,
    Emotion,
    Transform,
    CameraFov,
    ShowWeapon,
    ShowPeanuts,
    ShowArmor,
    Physics,
    Animation,
    HandsIk,
    PlayEffect,
    Material,
    SwitchLocation,
    CameraDof,
    ShapeShift,
    ActorProperties,
    Splatter,
    EffectPhase,
    Springs,
    Unrecognized(String),
}

impl EventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "TLVoice" => Self::Voice,
            "TLAttitudeEvent" => Self::Attitude,
            "TLShot" => Self::Shot,
            "TLSwitchStageEvent" => Self::SwitchStage,
            "TLSoundEvent" => Self::Sound,
            "TLShowVisual" => Self::ShowVisual,
            "TLLookAtEvent" => Self::LookAt,
            "TLEmotionEvent" => Self::Emotion,
            "TLTransform" => Self::Transform,
            "TLCameraFoV" => Self::CameraFov,
            "TLShowWeapon" => Self::ShowWeapon,
            "TLShowPeanuts" => Self::ShowPeanuts,
            "TLShowArmor" => Self::ShowArmor,
            "TLPhysics" => Self::Physics,
            "TLAnimation" => Self::Animation,
            "TLHandsIK" => Self::HandsIk,
            "TLPlayEffectEvent" => Self::PlayEffect,
            "TLMaterial" => Self::Material,
            "TLSwitchLocationEvent" => Self::SwitchLocation,
            "TLCameraDoF" => Self::CameraDof,
            "TLShapeShift" => Self::ShapeShift,
            "TimelineActorPropertiesReflection" => Self::ActorProperties,
            "TLSplatter" => Self::Splatter,
            "TLEffectPhaseEvent" => Self::EffectPhase,
            "TLSprings" => Self::Springs,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Voice => "TLVoice",
            Self::Attitude => "TLAttitudeEvent",
            Self::Shot => "TLShot",
            Self::SwitchStage => "TLSwitchStageEvent",
            Self::Sound => "TLSoundEvent",
            Self::ShowVisual => "TLShowVisual",
            Self::LookAt => "TLLookAtEvent",
            Self::Emotion => "TLEmotionEvent",
            Self::Transform => "TLTransform",
            Self::CameraFov => "TLCameraFoV",
            Self::ShowWeapon => "TLShowWeapon",
            Self::ShowPeanuts => "TLShowPeanuts",
            Self::ShowArmor => "TLShowArmor",
            Self::Physics => "TLPhysics",
            Self::Animation => "TLAnimation",
            Self::HandsIk => "TLHandsIK",
            Self::PlayEffect => "TLPlayEffectEvent",
            Self::Material => "TLMaterial",
            Self::SwitchLocation => "TLSwitchLocationEvent",
            Self::CameraDof => "TLCameraDoF",
            Self::ShapeShift => "TLShapeShift",
            Self::ActorProperties => "TimelineActorPropertiesReflection",
            Self::Splatter => "TLSplatter",
            Self::EffectPhase => "TLEffectPhaseEvent",
            Self::Springs => "TLSprings",
            Self::Unrecognized(tag) => tag,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

/// One emotion key: emotion id plus variation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmotionKey {
    pub emotion: i32,
    pub variation: i32,
}

impl EmotionKey {
    pub fn new(emotion: i32, variation: i32) -> Self {
        Self { emotion, variation }
    }
}

/// Readable label for a known emotion id
pub fn emotion_label(emotion: i32) -> Option<&'static str> {
    Some(match emotion {
        1 => "neutral",
        2 => "happy",
        4 => "thinking",
        8 => "angry",
        16 => "fear",
        32 => "sad",
        64 => "surprised",
        128 => "disgust",
        256 => "sleeping",
        512 => "dead",
        1024 => "confusion",
        2048 => "pain",
        _ => return None,
    })
}

/// Wrapper over one `EffectComponent` node with cached window attributes
#[derive(Debug, Clone, PartialEq)]
pub struct EventNode {
    pub handle: NodeHandle,
    pub uuid: String,
    pub kind: EventKind,
    pub start: f64,
    pub end: f64,
    pub phase_index: i64,
}

impl EventNode {
    /// Read the event attributes off an `EffectComponent` node
    ///
    /// `StartTime` defaults to 0 and `PhaseIndex` to phase 0 when absent,
    /// matching how the format omits them for the first window.
    pub fn parse(doc: &Document, handle: NodeHandle) -> Result<Self, TimelineError> {
        let kind = EventKind::from_tag(doc.attr_value(handle, TYPE_ATTR)?);
        let uuid = doc.attr_value(handle, ID_ATTR)?.to_string();
        let end = doc.attr_f64(handle, END_ATTR)?;
        let start = match doc.attr_opt(handle, START_ATTR) {
            Some(attr) => attr.as_f64()?,
            None => 0.0,
        };
        if start > end {
            return Err(TimelineError::WindowInverted { start, end });
        }
        let phase_index = match doc.attr_opt(handle, PHASE_INDEX_ATTR) {
            Some(attr) => attr.as_i64()?,
            None => 0,
        };
        Ok(Self {
            handle,
            uuid,
            kind,
            start,
            end,
            phase_index,
        })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// The referenced actor id, if the event carries an `Actor` child
    pub fn actor_id(&self, doc: &Document) -> Result<Option<String>, TimelineError> {
        let actors = doc.children_with_id(self.handle, "Actor");
        match actors.len() {
            0 => Ok(None),
            1 => Ok(doc.attr_value_opt(actors[0], "UUID").map(str::to_string)),
            _ => Err(TimelineError::AmbiguousActor(self.uuid.clone())),
        }
    }

    /// Move the whole event window by `delta`, nested relative keys included
    pub fn shift(&mut self, doc: &mut Document, delta: f64) -> Result<(), TimelineError> {
        self.start += delta;
        self.end += delta;
        doc.upsert_attr(self.handle, Attribute::float(START_ATTR, self.start), None)?;
        doc.set_attr(self.handle, END_ATTR, self.end.to_string(), None)?;
        doc.shift_time_attributes(self.handle, delta)?;
        Ok(())
    }

    /// Rewrite the event's end timestamp only
    pub fn set_end(&mut self, doc: &mut Document, end: f64) -> Result<(), TimelineError> {
        doc.set_attr(self.handle, END_ATTR, end.to_string(), None)?;
        self.end = end;
        Ok(())
    }

    pub fn set_phase_index(
        &mut self,
        doc: &mut Document,
        phase_index: i64,
    ) -> Result<(), TimelineError> {
        doc.upsert_attr(
            self.handle,
            Attribute::new(PHASE_INDEX_ATTR, "int64", phase_index.to_string()),
            None,
        )?;
        self.phase_index = phase_index;
        Ok(())
    }

    /// Every identifier-typed attribute value in the event subtree
    pub fn referenced_ids(&self, doc: &Document) -> Vec<String> {
        let mut out = Vec::new();
        doc.collect_identifier_values(self.handle, &mut out);
        out
    }

    /// Rewrite identifier attributes through `map`, identity elsewhere
    pub fn remap_identifiers(&self, doc: &mut Document, map: &HashMap<String, String>) -> usize {
        doc.remap_identifiers(self.handle, map)
    }

    /// Rewrite emotion keys through `map`; non-emotion events are untouched
    ///
    /// A key with no `Emotion` attribute counts as neutral (1), no
    /// `Variation` as 0.
    pub fn map_emotions(
        &self,
        doc: &mut Document,
        map: &HashMap<EmotionKey, EmotionKey>,
    ) -> Result<(), TimelineError> {
        if self.kind != EventKind::Emotion {
            return Ok(());
        }
        if doc.children_with_id(self.handle, "Keys").is_empty() {
            return Ok(());
        }
        let keys = doc.child_with_id(self.handle, "Keys")?;
        for key in doc.children_with_id(keys, "Key") {
            let emotion = match doc.attr_opt(key, "Emotion") {
                Some(attr) => attr.as_i64()? as i32,
                None => 1,
            };
            let variation = match doc.attr_opt(key, "Variation") {
                Some(attr) => attr.as_i64()? as i32,
                None => 0,
            };
            if let Some(mapped) = map.get(&EmotionKey::new(emotion, variation)) {
                doc.upsert_attr(
                    key,
                    Attribute::new("Emotion", "int32", mapped.emotion.to_string()),
                    Some("Mapping emotion"),
                )?;
                doc.upsert_attr(
                    key,
                    Attribute::new("Variation", "int32", mapped.variation.to_string()),
                    Some("Mapping emotion"),
                )?;
            }
        }
        Ok(())
    }
}

/// Declarative description of a new event to materialize into a window
///
/// The window attributes (`PhaseIndex`, `StartTime`, `EndTime`) are stamped
/// at materialization time; relative-time attributes inside the subtree are
/// offset by the window start.
#[derive(Debug, Clone)]
pub struct EventSpec {
    pub spec: NodeSpec,
    pub note: Option<String>,
}

impl EventSpec {
    pub fn new(kind: &EventKind, uuid: impl Into<String>) -> Self {
        Self {
            spec: NodeSpec::new("EffectComponent")
                .with_attr(Attribute::identifier(ID_ATTR, uuid))
                .with_attr(Attribute::new(TYPE_ATTR, "LSString", kind.tag())),
            note: None,
        }
    }

    pub fn with_attr(mut self, attr: Attribute) -> Self {
        self.spec = self.spec.with_attr(attr);
        self
    }

    pub fn with_actor(mut self, actor_uuid: impl Into<String>) -> Self {
        self.spec = self.spec.with_child(
            NodeSpec::new("Actor").with_attr(Attribute::identifier("UUID", actor_uuid)),
        );
        self
    }

    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.spec = self.spec.with_child(child);
        self
    }

    /// Attribute whose float value is relative to the window start
    pub fn with_relative_time_attr(mut self, attr: Attribute) -> Self {
        self.spec = self.spec.with_relative_time_attr(attr);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Materialize into `doc` as a detached subtree placed in the window
    pub fn materialize(
        &self,
        doc: &mut Document,
        phase_index: i64,
        start: f64,
        end: f64,
    ) -> Result<EventNode, TimelineError> {
        let mut spec = self.spec.clone();
        offset_relative_times(&mut spec, start, Some(end))?;
        spec = spec
            .with_attr(Attribute::new(
                PHASE_INDEX_ATTR,
                "int64",
                phase_index.to_string(),
            ))
            .with_attr(Attribute::float(START_ATTR, start))
            .with_attr(Attribute::float(END_ATTR, end));
        let handle = doc.create_node(&spec);
        EventNode::parse(doc, handle)
    }
}

/// Materialize a plain subtree spec relative to an event window
///
/// Used for grafting structured children (keys, channels) into an existing
/// event: relative times are offset, but no window attributes are stamped.
pub(crate) fn materialize_relative(
    doc: &mut Document,
    spec: &NodeSpec,
    start: f64,
    end: f64,
) -> Result<NodeHandle, TimelineError> {
    let mut spec = spec.clone();
    offset_relative_times(&mut spec, start, Some(end))?;
    Ok(doc.create_node(&spec))
}

fn offset_relative_times(
    spec: &mut NodeSpec,
    start: f64,
    end: Option<f64>,
) -> Result<(), TimelineError> {
    for spec_attr in &mut spec.attrs {
        if spec_attr.relative_time {
            let shifted = spec_attr.attr.as_f64()? + start;
            if let Some(end) = end {
                if shifted > end {
                    return Err(TimelineError::KeyPastWindowEnd { at: shifted, end });
                }
            }
            spec_attr.attr.set_value(shifted.to_string());
        }
    }
    for child in &mut spec.children {
        offset_relative_times(child, start, end)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_document::NodeSpec;

    fn doc() -> Document {
        Document::new("TimelineContent", NodeSpec::new("TimelineContent"))
    }

    fn voice_spec(uuid: &str) -> NodeSpec {
        NodeSpec::new("EffectComponent")
            .with_attr(Attribute::identifier(ID_ATTR, uuid))
            .with_attr(Attribute::new(TYPE_ATTR, "LSString", "TLVoice"))
            .with_attr(Attribute::float(END_ATTR, 5.0))
    }

    #[test]
    fn test_parse_defaults_start_and_phase() {
        let mut doc = doc();
        let handle = doc.create_node(&voice_spec("v1"));
        let event = EventNode::parse(&doc, handle).unwrap();
        assert_eq!(event.kind, EventKind::Voice);
        assert_eq!(event.start, 0.0);
        assert_eq!(event.end, 5.0);
        assert_eq!(event.phase_index, 0);
        assert_eq!(event.duration(), 5.0);
    }

    #[test]
    fn test_unknown_tag_is_carried_verbatim() {
        let kind = EventKind::from_tag("TLFutureThing");
        assert_eq!(kind, EventKind::Unrecognized("TLFutureThing".to_string()));
        assert_eq!(kind.tag(), "TLFutureThing");
        assert!(!kind.is_recognized());
    }

    #[test]
    fn test_shift_moves_window_and_nested_keys() {
        let mut doc = doc();
        let handle = doc.create_node(
            &voice_spec("v1").with_child(
                NodeSpec::new("Keys")
                    .with_child(NodeSpec::new("Key").with_attr(Attribute::float("Time", 1.0))),
            ),
        );
        let mut event = EventNode::parse(&doc, handle).unwrap();
        event.shift(&mut doc, 2.5).unwrap();
        assert_eq!(event.start, 2.5);
        assert_eq!(event.end, 7.5);
        assert_eq!(doc.attr_value(handle, START_ATTR).unwrap(), "2.5");
        assert_eq!(doc.attr_value(handle, END_ATTR).unwrap(), "7.5");
        let keys = doc.child_with_id(handle, "Keys").unwrap();
        let key = doc.children(keys).next().expect("key");
        assert_eq!(doc.attr_value(key, "Time").unwrap(), "3.5");
    }

    #[test]
    fn test_actor_lookup() {
        let mut doc = doc();
        let handle = doc.create_node(
            &voice_spec("v1").with_child(
                NodeSpec::new("Actor").with_attr(Attribute::identifier("UUID", "actor-1")),
            ),
        );
        let event = EventNode::parse(&doc, handle).unwrap();
        assert_eq!(event.actor_id(&doc).unwrap(), Some("actor-1".to_string()));
    }

    #[test]
    fn test_map_emotions_defaults_to_neutral_key() {
        let mut doc = doc();
        let handle = doc.create_node(
            &NodeSpec::new("EffectComponent")
                .with_attr(Attribute::identifier(ID_ATTR, "e1"))
                .with_attr(Attribute::new(TYPE_ATTR, "LSString", "TLEmotionEvent"))
                .with_attr(Attribute::float(END_ATTR, 2.0))
                .with_child(NodeSpec::new("Keys").with_child(
                    NodeSpec::new("Key").with_attr(Attribute::float("Time", 0.0)),
                )),
        );
        let event = EventNode::parse(&doc, handle).unwrap();
        let map: HashMap<EmotionKey, EmotionKey> =
            [(EmotionKey::new(1, 0), EmotionKey::new(2, 1))]
                .into_iter()
                .collect();
        event.map_emotions(&mut doc, &map).unwrap();
        let keys = doc.child_with_id(handle, "Keys").unwrap();
        let key = doc.children(keys).next().expect("key");
        assert_eq!(doc.attr_value(key, "Emotion").unwrap(), "2");
        assert_eq!(doc.attr_value(key, "Variation").unwrap(), "1");
    }

    #[test]
    fn test_spec_materializes_window_and_offsets_relative_keys() {
        let mut doc = doc();
        let spec = EventSpec::new(&EventKind::Splatter, "s1")
            .with_actor("actor-1")
            .with_child(NodeSpec::new("Keys").with_child(
                NodeSpec::new("Key").with_relative_time_attr(Attribute::float("Time", 0.5)),
            ));
        let event = spec.materialize(&mut doc, 3, 10.0, 12.0).unwrap();
        assert_eq!(event.kind, EventKind::Splatter);
        assert_eq!(event.phase_index, 3);
        assert_eq!(event.start, 10.0);
        assert_eq!(event.end, 12.0);
        let keys = doc.child_with_id(event.handle, "Keys").unwrap();
        let key = doc.children(keys).next().expect("key");
        assert_eq!(doc.attr_value(key, "Time").unwrap(), "10.5");
    }

    #[test]
    fn test_spec_rejects_relative_key_past_window_end() {
        let mut doc = doc();
        let spec = EventSpec::new(&EventKind::Splatter, "s1")
            .with_relative_time_attr(Attribute::float("Time", 5.0));
        let err = spec.materialize(&mut doc, 0, 10.0, 12.0).unwrap_err();
        assert!(matches!(err, TimelineError::KeyPastWindowEnd { .. }));
    }
}
