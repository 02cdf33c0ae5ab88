//! The timed-event timeline document
//!
//! A timeline is parsed once into a [`TimelineTree`]: the speaker roster, the
//! effect with its phase records and event partition, the dialog-to-phase map,
//! actor data records and the peanut slot roster. All mutation goes through
//! the tree so the cached views and the underlying document stay in step.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use stagehand_document::{Attribute, Document, NodeHandle, NodeSpec};

use crate::error::TimelineError;
use crate::event::{EmotionKey, EventKind, EventNode, EventSpec};
use crate::phase::EffectPhase;

pub(crate) const MAP_KEY_ATTR: &str = "MapKey";
pub(crate) const MAP_VALUE_ATTR: &str = "MapValue";
const DURATION_ATTR: &str = "Duration";

/// One entry of the speaker roster: ordinal slot and actor identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineSpeaker {
    pub index: i64,
    pub id: String,
}

/// One entry of the peanut slot map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeanutSlot {
    pub slot: i64,
    pub id: String,
}

/// Per-phase bookkeeping record under `Effect/Phases`
#[derive(Debug, Clone)]
pub struct PhaseRecord {
    pub(crate) handle: NodeHandle,
    pub duration: f64,
    pub dialog_node_id: String,
}

/// One dialog-node-to-phase-index mapping under `TimelinePhases`
#[derive(Debug, Clone)]
pub struct PhaseMapEntry {
    pub dialog_uuid: String,
    pub phase_index: usize,
}

/// One actor data record under `TimelineActorData`
#[derive(Debug, Clone)]
pub struct ActorRecord {
    pub(crate) handle: NodeHandle,
    pub uuid: String,
}

/// A parsed timeline document with cached structural views
#[derive(Debug, Clone)]
pub struct TimelineTree {
    pub doc: Document,
    pub(crate) effect: NodeHandle,
    pub(crate) components: NodeHandle,
    phases_container: NodeHandle,
    pub(crate) phase_records: Vec<PhaseRecord>,
    pub(crate) event_phases: Vec<EffectPhase>,
    speakers: Vec<TimelineSpeaker>,
    phase_map_container: NodeHandle,
    pub(crate) phase_map: Vec<PhaseMapEntry>,
    phase_map_index: Option<HashMap<String, usize>>,
    pub(crate) actor_container: NodeHandle,
    pub(crate) actor_records: Vec<ActorRecord>,
    peanut_slots: Vec<PeanutSlot>,
    total_duration: f64,
}

impl TimelineTree {
    pub fn from_document(doc: Document) -> Result<Self, TimelineError> {
        let root = doc.root();
        doc.expect_id(root, "TimelineContent")?;

        let speakers = parse_speakers(&doc, root)?;
        if speakers.len() < 2 {
            return Err(TimelineError::NotEnoughSpeakers(speakers.len()));
        }

        let effect = doc.child_with_id(root, "Effect")?;
        let total_duration = doc.attr_f64(effect, DURATION_ATTR)?;

        let phases_container = doc.child_with_id(effect, "Phases")?;
        let mut phase_records = Vec::new();
        for handle in doc.children_with_id(phases_container, "Phase") {
            phase_records.push(PhaseRecord {
                handle,
                duration: doc.attr_f64(handle, DURATION_ATTR)?,
                dialog_node_id: doc.attr_value(handle, "DialogNodeId")?.to_string(),
            });
        }

        let components = doc.child_with_id(effect, "EffectComponents")?;
        let event_phases = parse_event_phases(&doc, components)?;

        let tl_phases = doc.child_with_id(root, "TimelinePhases")?;
        let phase_map_container = doc.child_with_id(tl_phases, "Object")?;
        let mut phase_map = Vec::new();
        for handle in doc.children_with_id(phase_map_container, "Object") {
            phase_map.push(PhaseMapEntry {
                dialog_uuid: doc.attr_value(handle, MAP_KEY_ATTR)?.to_string(),
                phase_index: doc.attr_i64(handle, MAP_VALUE_ATTR)? as usize,
            });
        }

        let actor_outer = doc.child_with_id(root, "TimelineActorData")?;
        let actor_container = doc.child_with_id(actor_outer, "TimelineActorData")?;
        let mut actor_records = Vec::new();
        for handle in doc.children_with_id(actor_container, "Object") {
            actor_records.push(ActorRecord {
                handle,
                uuid: doc.attr_value(handle, MAP_KEY_ATTR)?.to_string(),
            });
        }

        let peanut_outer = doc.child_with_id(root, "PeanutSlotIdMap")?;
        let peanut_container = doc.child_with_id(peanut_outer, "Object")?;
        let mut peanut_slots = Vec::new();
        for handle in doc.children_with_id(peanut_container, "Object") {
            peanut_slots.push(PeanutSlot {
                slot: doc.attr_i64(handle, MAP_VALUE_ATTR)?,
                id: doc.attr_value(handle, MAP_KEY_ATTR)?.to_string(),
            });
        }

        Ok(Self {
            doc,
            effect,
            components,
            phases_container,
            phase_records,
            event_phases,
            speakers,
            phase_map_container,
            phase_map,
            phase_map_index: None,
            actor_container,
            actor_records,
            peanut_slots,
            total_duration,
        })
    }

    pub fn speakers(&self) -> &[TimelineSpeaker] {
        &self.speakers
    }

    pub fn peanut_slots(&self) -> &[PeanutSlot] {
        &self.peanut_slots
    }

    pub fn phase_records(&self) -> &[PhaseRecord] {
        &self.phase_records
    }

    pub fn phase_map(&self) -> &[PhaseMapEntry] {
        &self.phase_map
    }

    pub fn actor_records(&self) -> &[ActorRecord] {
        &self.actor_records
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn phase_count(&self) -> usize {
        self.event_phases.len()
    }

    pub fn phases(&self) -> &[EffectPhase] {
        &self.event_phases
    }

    pub fn phase(&self, index: usize) -> Result<&EffectPhase, TimelineError> {
        self.event_phases
            .get(index)
            .ok_or(TimelineError::PhaseOutOfRange {
                index,
                phases: self.event_phases.len(),
            })
    }

    pub fn phase_mut(&mut self, index: usize) -> Result<&mut EffectPhase, TimelineError> {
        let phases = self.event_phases.len();
        self.event_phases
            .get_mut(index)
            .ok_or(TimelineError::PhaseOutOfRange {
                index,
                phases,
            })
    }

    /// The phase a dialog node plays in, via the lazily built phase map index
    pub fn phase_index_for_dialog(&mut self, dialog_uuid: &str) -> Result<usize, TimelineError> {
        self.phase_index_for_dialog_opt(dialog_uuid)?
            .ok_or_else(|| TimelineError::EventNotFound(dialog_uuid.to_string()))
    }

    pub fn phase_index_for_dialog_opt(
        &mut self,
        dialog_uuid: &str,
    ) -> Result<Option<usize>, TimelineError> {
        if self.phase_map_index.is_none() {
            let mut index = HashMap::new();
            for entry in &self.phase_map {
                if index
                    .insert(entry.dialog_uuid.clone(), entry.phase_index)
                    .is_some()
                {
                    return Err(TimelineError::DuplicatePhaseKey(entry.dialog_uuid.clone()));
                }
            }
            self.phase_map_index = Some(index);
        }
        Ok(self
            .phase_map_index
            .as_ref()
            .and_then(|index| index.get(dialog_uuid).copied()))
    }

    /// Record a new dialog-node-to-phase mapping
    pub(crate) fn append_phase_map_entry(
        &mut self,
        dialog_uuid: &str,
        phase_index: usize,
    ) -> Result<(), TimelineError> {
        let spec = NodeSpec::new("Object")
            .with_key(MAP_KEY_ATTR)
            .with_attr(Attribute::identifier(MAP_KEY_ATTR, dialog_uuid))
            .with_attr(Attribute::new(
                MAP_VALUE_ATTR,
                "uint64",
                &phase_index.to_string(),
            ));
        let handle = self.doc.create_node(&spec);
        self.doc.append_child(self.phase_map_container, handle, None)?;
        self.phase_map.push(PhaseMapEntry {
            dialog_uuid: dialog_uuid.to_string(),
            phase_index,
        });
        if let Some(index) = self.phase_map_index.as_mut() {
            index.insert(dialog_uuid.to_string(), phase_index);
        }
        Ok(())
    }

    /// Append a bookkeeping record for a freshly spliced phase
    pub(crate) fn append_phase_record(
        &mut self,
        duration: f64,
        dialog_node_id: &str,
    ) -> Result<(), TimelineError> {
        let spec = NodeSpec::new("Phase")
            .with_attr(Attribute::float(DURATION_ATTR, duration))
            .with_attr(Attribute::new("PlayCount", "int32", "1"))
            .with_attr(Attribute::identifier("DialogNodeId", dialog_node_id))
            .with_child(NodeSpec::new("QuestionHoldAutomation"));
        let handle = self.doc.create_node(&spec);
        self.doc.append_child(self.phases_container, handle, None)?;
        self.phase_records.push(PhaseRecord {
            handle,
            duration,
            dialog_node_id: dialog_node_id.to_string(),
        });
        Ok(())
    }

    /// Grow one phase's record and the overall effect duration by `delta`
    pub(crate) fn adjust_duration(
        &mut self,
        phase_index: usize,
        delta: f64,
    ) -> Result<(), TimelineError> {
        let phases = self.phase_records.len();
        let record = self
            .phase_records
            .get_mut(phase_index)
            .ok_or(TimelineError::PhaseOutOfRange {
                index: phase_index,
                phases,
            })?;
        record.duration += delta;
        let duration = record.duration;
        self.doc
            .upsert_attr(record.handle, Attribute::float(DURATION_ATTR, duration), None)?;
        self.bump_total_duration(delta)?;
        Ok(())
    }

    pub(crate) fn bump_total_duration(&mut self, delta: f64) -> Result<(), TimelineError> {
        self.total_duration += delta;
        self.doc.upsert_attr(
            self.effect,
            Attribute::float(DURATION_ATTR, self.total_duration),
            None,
        )?;
        Ok(())
    }

    /// Extend one phase's end by `amount`, materializing `new_events` into
    /// the opened window, moving trailing events of the listed kinds to the
    /// new end and shifting every later phase out of the way
    pub fn extend_phase_duration(
        &mut self,
        phase_index: usize,
        amount: f64,
        new_events: &[EventSpec],
        extend_kinds: &[EventKind],
    ) -> Result<(), TimelineError> {
        if amount <= 0.0 {
            return Err(TimelineError::NonPositiveExtension(amount));
        }
        {
            let phase = self.event_phases.get_mut(phase_index).ok_or(
                TimelineError::PhaseOutOfRange {
                    index: phase_index,
                    phases: self.phase_records.len(),
                },
            )?;
            phase.extend_end(&mut self.doc, amount, new_events, extend_kinds)?;
        }
        self.adjust_duration(phase_index, amount)?;
        for phase in self.event_phases.iter_mut().skip(phase_index + 1) {
            phase.shift(&mut self.doc, amount)?;
        }
        tracing::info!(phase = phase_index, amount, "extended phase duration");
        Ok(())
    }

    /// Retarget the window holding `uuid` in one phase to a new duration
    pub fn resize_window_of(
        &mut self,
        phase_index: usize,
        uuid: &str,
        new_duration: f64,
    ) -> Result<(), TimelineError> {
        let phases = self.event_phases.len();
        let phase = self
            .event_phases
            .get_mut(phase_index)
            .ok_or(TimelineError::PhaseOutOfRange {
                index: phase_index,
                phases,
            })?;
        phase.resize_window_of(&mut self.doc, uuid, new_duration)
    }

    /// Materialize a new event spanning one phase's whole window
    pub fn append_full_duration_event(
        &mut self,
        phase_index: usize,
        spec: &EventSpec,
    ) -> Result<EventNode, TimelineError> {
        let phases = self.event_phases.len();
        let phase = self
            .event_phases
            .get_mut(phase_index)
            .ok_or(TimelineError::PhaseOutOfRange {
                index: phase_index,
                phases,
            })?;
        phase.append_full_duration_event(&mut self.doc, spec)
    }

    /// Rewrite an actor's emotion keys in one phase
    pub fn map_phase_emotions(
        &mut self,
        phase_index: usize,
        actor_uuid: &str,
        mapping: &HashMap<EmotionKey, EmotionKey>,
    ) -> Result<(), TimelineError> {
        let phase = self
            .event_phases
            .get(phase_index)
            .ok_or(TimelineError::PhaseOutOfRange {
                index: phase_index,
                phases: self.event_phases.len(),
            })?;
        phase.map_emotions(&mut self.doc, actor_uuid, mapping)
    }

    /// Rewrite an actor's emotion keys across every phase
    pub fn map_emotions(
        &mut self,
        actor_uuid: &str,
        mapping: &HashMap<EmotionKey, EmotionKey>,
    ) -> Result<(), TimelineError> {
        for phase in &self.event_phases {
            phase.map_emotions(&mut self.doc, actor_uuid, mapping)?;
        }
        Ok(())
    }

    /// Copy one actor data record from `source`, rewriting the identifiers in
    /// its value rows through `guid_map`. Records already present under the
    /// same key are left alone.
    pub fn add_actor_record(
        &mut self,
        source: &TimelineTree,
        record: NodeHandle,
        guid_map: &HashMap<String, String>,
    ) -> Result<(), TimelineError> {
        let uuid = source.doc.attr_value(record, MAP_KEY_ATTR)?.to_string();
        if self.actor_records.iter().any(|r| r.uuid == uuid) {
            tracing::debug!(uuid = %uuid, "actor record already present, skipping");
            return Ok(());
        }
        let copied = self.doc.copy_subtree_from(&source.doc, record);
        for value in self.doc.children_with_id(copied, "Value") {
            self.doc.remap_identifiers(value, guid_map);
        }
        self.doc.append_child(self.actor_container, copied, None)?;
        self.actor_records.push(ActorRecord {
            handle: copied,
            uuid,
        });
        Ok(())
    }
}

fn parse_speakers(
    doc: &Document,
    root: NodeHandle,
) -> Result<Vec<TimelineSpeaker>, TimelineError> {
    let speakers_node = doc.child_with_id(root, "TimelineSpeakers")?;
    // Some documents nest the roster one level deeper
    let roster = if doc.children_with_id(speakers_node, "TimelineSpeaker").is_empty() {
        speakers_node
    } else {
        doc.child_with_id(speakers_node, "TimelineSpeaker")?
    };
    let mut speakers = Vec::new();
    for handle in doc.children_with_id(roster, "Object") {
        speakers.push(TimelineSpeaker {
            index: doc.attr_i64(handle, MAP_KEY_ATTR)?,
            id: doc.attr_value(handle, MAP_VALUE_ATTR)?.to_string(),
        });
    }
    Ok(speakers)
}

fn parse_event_phases(
    doc: &Document,
    components: NodeHandle,
) -> Result<Vec<EffectPhase>, TimelineError> {
    let mut by_phase: BTreeMap<i64, Vec<EventNode>> = BTreeMap::new();
    for handle in doc.children_with_id(components, "EffectComponent") {
        let event = EventNode::parse(doc, handle)?;
        by_phase.entry(event.phase_index).or_default().push(event);
    }
    let mut phases = Vec::new();
    for (index, events) in by_phase {
        if index != phases.len() as i64 {
            return Err(TimelineError::NonContiguousPhases {
                expected: phases.len(),
                found: index,
            });
        }
        phases.push(EffectPhase::from_events(
            components,
            index as usize,
            events,
            true,
        )?);
    }
    Ok(phases)
}
