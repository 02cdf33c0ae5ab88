//! Cross-document phase splicing
//!
//! Copying a phase between timelines is a deep copy: the source document is
//! never mutated. The copied events are shifted to start where the
//! destination currently ends, rebound to the destination's actors through an
//! [`ActorMap`], and appended together with the parallel bookkeeping records
//! (phase record, phase-map entry, total duration).

use std::collections::{BTreeSet, HashMap};

use stagehand_document::{IdAllocator, NodeHandle};

use crate::actor_map::ActorMap;
use crate::error::TimelineError;
use crate::event::{EmotionKey, EventKind, EventNode};
use crate::phase::EffectPhase;
use crate::scene::SceneTree;
use crate::timeline::TimelineTree;

const DIALOG_NODE_ID_ATTR: &str = "DialogNodeId";
const REFERENCE_ID_ATTR: &str = "ReferenceId";

/// Phases shorter than this are almost certainly a source-selection mistake
const MIN_PHASE_DURATION: f64 = 1.0;

/// Everything a copied phase depends on outside its own events
#[derive(Debug, Default)]
pub struct PhaseDependencies {
    pub actor_records: Vec<NodeHandle>,
    pub stages: Vec<NodeHandle>,
    pub cameras: Vec<NodeHandle>,
    pub scene_actors: Vec<NodeHandle>,
    pub switch_stage_ids: Vec<String>,
}

/// Knobs for [`copy_phase_between`]
#[derive(Debug, Default)]
pub struct CopyPhaseOptions {
    /// Allocate fresh event ids for the copy; required when source and
    /// destination are the same document
    pub replace_event_ids: bool,
    /// Swap speaker ordinals 0 and 1 when deriving the actor map
    pub reverse_actor_map: bool,
    /// Per-actor emotion-key rewrites applied to the new phase
    pub emotion_maps: HashMap<String, HashMap<EmotionKey, EmotionKey>>,
    /// Scene-actor template replacements pulled along with the copy
    pub template_map: HashMap<String, String>,
}

impl TimelineTree {
    /// Append a copy of `source_phase` after the destination's last phase
    ///
    /// Events bound to actors the map marks as removed are dropped. Returns
    /// the new phase index.
    pub fn append_phase_copy(
        &mut self,
        source: &TimelineTree,
        source_phase: usize,
        actor_map: &ActorMap,
        dialog_node_id: &str,
        reference_id: Option<&str>,
        replacement_ids: Option<&[String]>,
    ) -> Result<usize, TimelineError> {
        let mut phase = self.import_phase_events(source, source_phase, actor_map)?;
        if let Some(ids) = replacement_ids {
            phase.replace_event_ids(&mut self.doc, ids)?;
        }
        self.splice_phase(phase, actor_map, dialog_node_id, reference_id, dialog_node_id)
    }

    /// Copy `source_phase` and retarget it to a new spoken-line duration
    ///
    /// The copied phase must carry exactly one voice event. Its identifiers
    /// are rebound to `dialog_node_id`/`reference_id`, and when the new
    /// duration differs from the old by more than 0.1s the voice window is
    /// resized before splicing. The phase-map entry is keyed by the reference
    /// id when one is given.
    pub fn create_phase_from(
        &mut self,
        source: &TimelineTree,
        source_phase: usize,
        actor_map: &ActorMap,
        dialog_node_id: &str,
        reference_id: Option<&str>,
        new_voice_duration: f64,
        replacement_ids: Option<&[String]>,
        drop_trailing_subduration: bool,
    ) -> Result<usize, TimelineError> {
        let mut phase = self.import_phase_events(source, source_phase, actor_map)?;
        if drop_trailing_subduration {
            phase.remove_last_subduration(&mut self.doc)?;
        }
        if let Some(ids) = replacement_ids {
            phase.replace_event_ids(&mut self.doc, ids)?;
        }

        let voices: Vec<String> = phase
            .events()
            .filter(|e| e.kind == EventKind::Voice)
            .map(|e| e.uuid.clone())
            .collect();
        let [voice_uuid] = voices.as_slice() else {
            return Err(TimelineError::VoiceEventCount(voices.len()));
        };
        let voice = phase.event_by_uuid(voice_uuid, &EventKind::Voice)?;
        self.doc
            .set_attr(voice.handle, DIALOG_NODE_ID_ATTR, dialog_node_id, None)?;
        self.doc.set_attr(
            voice.handle,
            REFERENCE_ID_ATTR,
            reference_id.unwrap_or(dialog_node_id),
            None,
        )?;
        phase.resize_window_of(&mut self.doc, voice_uuid, new_voice_duration)?;

        let map_key = reference_id.unwrap_or(dialog_node_id).to_string();
        self.splice_phase(phase, actor_map, dialog_node_id, reference_id, &map_key)
    }

    /// The records, stages, cameras and scene actors a phase references
    ///
    /// Scene actors whose template appears in `template_map` are retargeted
    /// in place and reported so they travel with the copy.
    pub fn phase_dependencies(
        &self,
        phase_index: usize,
        scene: &mut SceneTree,
        template_map: &HashMap<String, String>,
    ) -> Result<PhaseDependencies, TimelineError> {
        let phase = self.phase(phase_index)?;
        let mut referenced: BTreeSet<String> =
            phase.referenced_ids(&self.doc).into_iter().collect();

        let mut actor_records = Vec::new();
        for record in self.actor_records() {
            if !referenced.contains(&record.uuid) {
                continue;
            }
            actor_records.push(record.handle);
            // an actor record can point at a camera the phase never names
            for value in self.doc.children_with_id(record.handle, "Value") {
                if let Some(camera) = self.doc.attr_value_opt(value, "Camera") {
                    referenced.insert(camera.to_string());
                }
            }
        }

        let mut stages = Vec::new();
        let mut switch_stage_ids = Vec::new();
        let mut cameras = Vec::new();
        for guid in &referenced {
            if let Some(stage) = scene.stage(guid) {
                stages.push(stage.handle);
                switch_stage_ids.push(stage.identifier.clone());
            }
            if let Some(camera) = scene.camera(guid) {
                cameras.push(camera.handle);
            }
        }

        let scene_actors = scene.retarget_actor_templates(template_map)?;
        Ok(PhaseDependencies {
            actor_records,
            stages,
            cameras,
            scene_actors,
            switch_stage_ids,
        })
    }

    /// Deep-copy a source phase's events into this document, dropping events
    /// bound to removed actors, as a detached working phase
    fn import_phase_events(
        &mut self,
        source: &TimelineTree,
        source_phase: usize,
        actor_map: &ActorMap,
    ) -> Result<EffectPhase, TimelineError> {
        let phase = source.phase(source_phase)?;
        let mut imported = Vec::new();
        for event in phase.events() {
            if actor_map.has_removals() {
                if let Some(actor) = event.actor_id(&source.doc)? {
                    if actor_map.should_remove(&actor) {
                        tracing::debug!(
                            uuid = %event.uuid,
                            actor = %actor,
                            "dropping event bound to a removed actor"
                        );
                        continue;
                    }
                }
            }
            let handle = self.doc.copy_subtree_from(&source.doc, event.handle);
            imported.push(EventNode::parse(&self.doc, handle)?);
        }
        if imported.is_empty() {
            return Err(TimelineError::EmptyPhase(source_phase));
        }
        EffectPhase::from_events(self.components, source_phase, imported, false)
    }

    /// Attach a detached working phase after the current last phase, keeping
    /// every piece of bookkeeping in step
    fn splice_phase(
        &mut self,
        mut phase: EffectPhase,
        actor_map: &ActorMap,
        dialog_node_id: &str,
        reference_id: Option<&str>,
        map_key: &str,
    ) -> Result<usize, TimelineError> {
        let new_index = self.phase_records.len();
        if self.event_phases.len() != new_index {
            return Err(TimelineError::PhaseCountMismatch {
                records: new_index,
                phases: self.event_phases.len(),
            });
        }
        let last = self.event_phases.last().ok_or(TimelineError::NoPhases)?;
        let new_start = last.full().end;

        let duration = phase.full().duration();
        if duration < MIN_PHASE_DURATION {
            return Err(TimelineError::DurationTooShort(duration));
        }
        let shift = new_start - phase.full().start;
        phase.shift(&mut self.doc, shift)?;

        for group in phase.groups_mut() {
            for event in group.events_mut() {
                event.set_phase_index(&mut self.doc, new_index as i64)?;
                if self.doc.attr_opt(event.handle, DIALOG_NODE_ID_ATTR).is_some() {
                    self.doc
                        .set_attr(event.handle, DIALOG_NODE_ID_ATTR, dialog_node_id, None)?;
                }
                if self.doc.attr_opt(event.handle, REFERENCE_ID_ATTR).is_some() {
                    self.doc.set_attr(
                        event.handle,
                        REFERENCE_ID_ATTR,
                        reference_id.unwrap_or(dialog_node_id),
                        None,
                    )?;
                }
                let rewrite = actor_map.map_for(Some(&event.kind));
                event.remap_identifiers(&mut self.doc, &rewrite);
                self.doc.append_child(self.components, event.handle, None)?;
            }
        }
        phase.attached = true;
        phase.phase_index = new_index;

        tracing::info!(
            phase = new_index,
            duration,
            start = new_start,
            "spliced copied phase"
        );
        self.event_phases.push(phase);
        self.append_phase_record(duration, dialog_node_id)?;
        self.bump_total_duration(duration)?;
        self.append_phase_map_entry(map_key, new_index)?;
        Ok(new_index)
    }
}

/// Copy one phase between two timeline/scene pairs
///
/// Derives the actor map, splices the phase, then pulls the phase's staging
/// dependencies across: scene-camera actor records, stages, cameras and
/// scene actors, each skipping records already present. `allocator` supplies
/// fresh event ids when `options.replace_event_ids` is set.
pub fn copy_phase_between(
    source: &TimelineTree,
    source_scene: &mut SceneTree,
    dest: &mut TimelineTree,
    dest_scene: &mut SceneTree,
    source_phase: usize,
    dialog_node_id: &str,
    allocator: &dyn IdAllocator,
    options: &CopyPhaseOptions,
) -> Result<usize, TimelineError> {
    let actor_map = ActorMap::derive(dest, source, options.reverse_actor_map);
    let dependencies =
        source.phase_dependencies(source_phase, source_scene, &options.template_map)?;

    let replacement_ids = if options.replace_event_ids {
        Some(allocator.allocate_n(source.phase(source_phase)?.event_count()))
    } else {
        None
    };
    let new_index = dest.append_phase_copy(
        source,
        source_phase,
        &actor_map,
        dialog_node_id,
        None,
        replacement_ids.as_deref(),
    )?;

    for (actor, emotion_map) in &options.emotion_maps {
        dest.map_phase_emotions(new_index, actor, emotion_map)?;
    }

    // scene-camera actor records travel with the phase
    let guid_map = actor_map.map_for(None);
    for record in &dependencies.actor_records {
        let actor_type = source
            .doc
            .children_with_id(*record, "Value")
            .first()
            .and_then(|v| source.doc.attr_value_opt(*v, "ActorTypeId"));
        if actor_type == Some("scenecam") {
            dest.add_actor_record(source, *record, &guid_map)?;
        }
    }
    for stage in &dependencies.stages {
        dest_scene.add_stage(source_scene, *stage)?;
    }
    for camera in &dependencies.cameras {
        dest_scene.add_camera(source_scene, *camera)?;
    }
    for actor in &dependencies.scene_actors {
        dest_scene.add_actor(source_scene, *actor)?;
    }
    tracing::info!(phase = new_index, "copied phase across documents");
    Ok(new_index)
}
