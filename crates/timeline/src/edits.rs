//! Batch edit scripts
//!
//! A script collects the edits one authoring pass wants to make against a
//! timeline: phase extensions, new full-duration events, attribute upserts
//! and structured child grafts addressed by event and child path. Edits are
//! declarative values so callers can build, serialize and review a pass
//! before running it.

use stagehand_document::{Attribute, NodeHandle, NodeSpec};

use crate::error::TimelineError;
use crate::event::{self, EventKind, EventSpec};
use crate::timeline::TimelineTree;

/// One step of a path below an event: the nth child with a given id
#[derive(Debug, Clone)]
pub struct ChildPath {
    pub id: String,
    pub index: usize,
}

impl ChildPath {
    pub fn new(id: impl Into<String>, index: usize) -> Self {
        Self {
            id: id.into(),
            index,
        }
    }
}

/// Upsert one attribute on a node below an event
#[derive(Debug, Clone)]
pub struct AttributeEdit {
    pub event_uuid: String,
    pub kind: EventKind,
    pub path: Vec<ChildPath>,
    pub attribute: Attribute,
}

/// Graft a subtree under a node below an event
///
/// Relative-time attributes in the spec are offset by the event's window
/// start before insertion.
#[derive(Debug, Clone)]
pub struct ChildGraft {
    pub event_uuid: String,
    pub kind: EventKind,
    pub path: Vec<ChildPath>,
    pub index: isize,
    pub spec: NodeSpec,
    pub note: Option<String>,
}

/// Extend a phase's end, optionally materializing events into the new window
#[derive(Debug, Clone, Default)]
pub struct PhaseExtension {
    pub amount: f64,
    pub new_events: Vec<EventSpec>,
    pub extend_kinds: Vec<EventKind>,
}

/// Every edit aimed at one phase
#[derive(Debug, Clone, Default)]
pub struct PhaseEditScript {
    pub phase_index: usize,
    pub extensions: Vec<PhaseExtension>,
    pub new_full_duration_events: Vec<EventSpec>,
    pub attribute_edits: Vec<AttributeEdit>,
    pub child_grafts: Vec<ChildGraft>,
}

impl PhaseEditScript {
    pub fn new(phase_index: usize) -> Self {
        Self {
            phase_index,
            ..Self::default()
        }
    }
}

/// Run each script against `tree`, one phase at a time
///
/// Within a phase, extensions run first so later edits see the final
/// windows, then new full-duration events, attribute upserts, and child
/// grafts.
pub fn run_edit_script(
    tree: &mut TimelineTree,
    scripts: &[PhaseEditScript],
) -> Result<(), TimelineError> {
    for script in scripts {
        tracing::debug!(
            phase = script.phase_index,
            extensions = script.extensions.len(),
            new_events = script.new_full_duration_events.len(),
            attribute_edits = script.attribute_edits.len(),
            child_grafts = script.child_grafts.len(),
            "running phase edit script"
        );
        for extension in &script.extensions {
            tree.extend_phase_duration(
                script.phase_index,
                extension.amount,
                &extension.new_events,
                &extension.extend_kinds,
            )?;
        }
        for spec in &script.new_full_duration_events {
            tree.append_full_duration_event(script.phase_index, spec)?;
        }
        for edit in &script.attribute_edits {
            let event = tree
                .phase_mut(script.phase_index)?
                .event_by_uuid(&edit.event_uuid, &edit.kind)?;
            let target = resolve_path(tree, event.handle, &edit.event_uuid, &edit.path)?;
            tree.doc.upsert_attr(target, edit.attribute.clone(), None)?;
        }
        for graft in &script.child_grafts {
            let event = tree
                .phase_mut(script.phase_index)?
                .event_by_uuid(&graft.event_uuid, &graft.kind)?;
            let target = resolve_path(tree, event.handle, &graft.event_uuid, &graft.path)?;
            let node = event::materialize_relative(&mut tree.doc, &graft.spec, event.start, event.end)?;
            tree.doc
                .insert_child(target, node, graft.index, graft.note.as_deref())?;
        }
    }
    Ok(())
}

fn resolve_path(
    tree: &TimelineTree,
    event_handle: NodeHandle,
    event_uuid: &str,
    path: &[ChildPath],
) -> Result<NodeHandle, TimelineError> {
    let mut current = event_handle;
    for step in path {
        current = tree
            .doc
            .children_with_id(current, &step.id)
            .get(step.index)
            .copied()
            .ok_or_else(|| TimelineError::PathNotFound {
                event: event_uuid.to_string(),
                id: step.id.clone(),
                index: step.index,
            })?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::tests::sample_timeline;

    #[test]
    fn test_attribute_edit_walks_child_path() {
        let mut tree = sample_timeline();
        // give the reaction shot a nested container to address
        let shot = tree.phase_mut(0).unwrap().event_by_uuid("r0", &EventKind::Shot).unwrap();
        let child = tree.doc.create_node(&NodeSpec::new("CameraSettings"));
        tree.doc.append_child(shot.handle, child, None).unwrap();

        let script = PhaseEditScript {
            phase_index: 0,
            attribute_edits: vec![AttributeEdit {
                event_uuid: "r0".to_string(),
                kind: EventKind::Shot,
                path: vec![ChildPath::new("CameraSettings", 0)],
                attribute: Attribute::float("FoV", 45.0),
            }],
            ..PhaseEditScript::new(0)
        };
        run_edit_script(&mut tree, &[script]).unwrap();
        let settings = tree.doc.child_with_id(shot.handle, "CameraSettings").unwrap();
        assert_eq!(tree.doc.attr_f64(settings, "FoV").unwrap(), 45.0);
    }

    #[test]
    fn test_attribute_edit_rejects_missing_path() {
        let mut tree = sample_timeline();
        let script = PhaseEditScript {
            attribute_edits: vec![AttributeEdit {
                event_uuid: "r0".to_string(),
                kind: EventKind::Shot,
                path: vec![ChildPath::new("Missing", 0)],
                attribute: Attribute::float("FoV", 45.0),
            }],
            ..PhaseEditScript::new(0)
        };
        assert!(matches!(
            run_edit_script(&mut tree, &[script]),
            Err(TimelineError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_graft_offsets_relative_times_by_event_window() {
        let mut tree = sample_timeline();
        let spec = {
            let mut keys = NodeSpec::new("Keys").with_empty_children();
            keys = keys.with_child(
                NodeSpec::new("Key").with_relative_time_attr(Attribute::float("Time", 0.5)),
            );
            keys
        };
        let script = PhaseEditScript {
            child_grafts: vec![ChildGraft {
                event_uuid: "r0".to_string(),
                kind: EventKind::Shot,
                path: Vec::new(),
                index: -1,
                spec,
                note: Some("Adding reaction keys".to_string()),
            }],
            ..PhaseEditScript::new(0)
        };
        run_edit_script(&mut tree, &[script]).unwrap();
        let shot = tree.phase_mut(0).unwrap().event_by_uuid("r0", &EventKind::Shot).unwrap();
        let keys = tree.doc.child_with_id(shot.handle, "Keys").unwrap();
        let key = tree.doc.child_with_id(keys, "Key").unwrap();
        // reaction shot spans [4, 5]; the relative key lands at 4.5
        assert_eq!(tree.doc.attr_f64(key, "Time").unwrap(), 4.5);
    }

    #[test]
    fn test_script_extends_then_adds_full_duration_event() {
        let mut tree = sample_timeline();
        let script = PhaseEditScript {
            phase_index: 0,
            extensions: vec![PhaseExtension {
                amount: 2.0,
                ..PhaseExtension::default()
            }],
            new_full_duration_events: vec![EventSpec::new(&EventKind::Material, "glow")],
            ..PhaseEditScript::new(0)
        };
        run_edit_script(&mut tree, &[script]).unwrap();
        assert_eq!(tree.total_duration(), 7.0);
        let phase = tree.phase(0).unwrap();
        // the new event sees the extended window
        let glow = phase.events().find(|e| e.uuid == "glow").unwrap();
        assert_eq!((glow.start, glow.end), (0.0, 7.0));
    }
}
