//! Human-readable timeline summaries
//!
//! Debug-facing: the output is for reading while authoring, not for parsing.

use std::fmt::Write;

use crate::error::TimelineError;
use crate::event::{emotion_label, EventKind, EventNode};
use crate::timeline::TimelineTree;

/// Render one phase's windows and events as an indented summary
pub fn phase_overview(tree: &TimelineTree, phase_index: usize) -> Result<String, TimelineError> {
    let phase = tree.phase(phase_index)?;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Phase {phase_index}: [{}, {}] ({} events)",
        phase.full().start,
        phase.full().end,
        phase.event_count()
    );
    for (i, group) in phase.groups().enumerate() {
        let label = if i == 0 { "full" } else { "sub" };
        let _ = writeln!(
            out,
            "  {label} [{}, {}] ({} events)",
            group.start,
            group.end,
            group.event_count()
        );
        for event in group.events() {
            let _ = writeln!(out, "    {}", describe_event(tree, event)?);
        }
    }
    Ok(out)
}

fn describe_event(tree: &TimelineTree, event: &EventNode) -> Result<String, TimelineError> {
    if !event.kind.is_recognized() {
        tracing::warn!(uuid = %event.uuid, tag = event.kind.tag(), "unrecognized event kind");
    }
    let mut line = format!("{} {}", event.kind.tag(), event.uuid);
    if let Some(actor) = event.actor_id(&tree.doc)? {
        let _ = write!(line, " actor={actor}");
    }
    if event.kind == EventKind::Emotion {
        if let Some(label) = first_emotion_label(tree, event) {
            let _ = write!(line, " emotion={label}");
        }
    }
    Ok(line)
}

fn first_emotion_label(tree: &TimelineTree, event: &EventNode) -> Option<&'static str> {
    let keys = tree
        .doc
        .children_with_id(event.handle, "Keys")
        .first()
        .copied()?;
    let key = tree.doc.children_with_id(keys, "Key").first().copied()?;
    let emotion = tree
        .doc
        .attr_opt(key, "Emotion")
        .and_then(|a| a.as_i64().ok())
        .unwrap_or(1);
    emotion_label(emotion as i32)
}
