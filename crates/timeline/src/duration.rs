//! Duration windows
//!
//! A duration group is a `[start, end]` window together with every event of
//! the owning phase whose own window equals it exactly. Window edits always
//! go through the group so the members never drift from the window.

use stagehand_document::{Document, NodeHandle};

use crate::error::TimelineError;
use crate::event::{EventKind, EventNode, EventSpec};

/// A time window and the events bound to exactly that window
#[derive(Debug, Clone)]
pub struct DurationGroup {
    pub start: f64,
    pub end: f64,
    events: Vec<EventNode>,
}

impl DurationGroup {
    pub(crate) fn new(start: f64, end: f64, events: Vec<EventNode>) -> Self {
        Self { start, end, events }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn events(&self) -> &[EventNode] {
        &self.events
    }

    pub(crate) fn events_mut(&mut self) -> &mut Vec<EventNode> {
        &mut self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn events_of_kind<'a>(
        &'a self,
        kind: &'a EventKind,
    ) -> impl Iterator<Item = &'a EventNode> {
        self.events.iter().filter(move |e| &e.kind == kind)
    }

    pub fn has_kind(&self, kind: &EventKind) -> bool {
        self.events_of_kind(kind).next().is_some()
    }

    /// Rewrite the window end, updating every member's `EndTime`
    pub fn set_end(&mut self, doc: &mut Document, new_end: f64) -> Result<(), TimelineError> {
        for event in &mut self.events {
            event.set_end(doc, new_end)?;
        }
        self.end = new_end;
        Ok(())
    }

    /// Move the window and all members by `delta`
    pub fn shift(&mut self, doc: &mut Document, delta: f64) -> Result<(), TimelineError> {
        self.start += delta;
        self.end += delta;
        for event in &mut self.events {
            event.shift(doc, delta)?;
        }
        Ok(())
    }

    /// Detach the event with `uuid` from the group, if present
    pub(crate) fn remove(&mut self, uuid: &str) -> Option<EventNode> {
        let index = self.events.iter().position(|e| e.uuid == uuid)?;
        Some(self.events.remove(index))
    }

    /// Drain every member, collapsing the window
    pub(crate) fn take_all(&mut self) -> Vec<EventNode> {
        self.end = self.start;
        std::mem::take(&mut self.events)
    }

    /// Drain every member of one of the listed kinds
    pub(crate) fn take_kinds(&mut self, kinds: &[EventKind]) -> Vec<EventNode> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.events.len());
        for event in self.events.drain(..) {
            if kinds.contains(&event.kind) {
                taken.push(event);
            } else {
                kept.push(event);
            }
        }
        self.events = kept;
        taken
    }

    /// Materialize `spec` into this window and insert it into `container`
    /// right after the group's last member, so related events stay adjacent
    pub fn append_new(
        &mut self,
        doc: &mut Document,
        container: NodeHandle,
        spec: &EventSpec,
        phase_index: i64,
    ) -> Result<EventNode, TimelineError> {
        let event = spec.materialize(doc, phase_index, self.start, self.end)?;
        let index = match self.events.last() {
            Some(last) => doc
                .children(container)
                .position(|h| h == last.handle)
                .map(|i| (i + 1) as isize)
                .unwrap_or(-1),
            None => -1,
        };
        doc.insert_child(container, event.handle, index, spec.note.as_deref())?;
        self.events.push(event.clone());
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_document::{Attribute, NodeSpec};

    fn doc_with_container() -> (Document, NodeHandle) {
        let doc = Document::new(
            "TimelineContent",
            NodeSpec::new("EffectComponents").with_empty_children(),
        );
        let container = doc.root();
        (doc, container)
    }

    fn attach_event(
        doc: &mut Document,
        container: NodeHandle,
        uuid: &str,
        tag: &str,
        start: f64,
        end: f64,
    ) -> EventNode {
        let handle = doc.create_node(
            &NodeSpec::new("EffectComponent")
                .with_attr(Attribute::identifier("ID", uuid))
                .with_attr(Attribute::new("Type", "LSString", tag))
                .with_attr(Attribute::float("StartTime", start))
                .with_attr(Attribute::float("EndTime", end)),
        );
        doc.append_child(container, handle, None).unwrap();
        EventNode::parse(doc, handle).unwrap()
    }

    #[test]
    fn test_set_end_rewrites_every_member() {
        let (mut doc, container) = doc_with_container();
        let a = attach_event(&mut doc, container, "a", "TLVoice", 0.0, 5.0);
        let b = attach_event(&mut doc, container, "b", "TLShot", 0.0, 5.0);
        let mut group = DurationGroup::new(0.0, 5.0, vec![a, b]);
        group.set_end(&mut doc, 8.0).unwrap();
        assert_eq!(group.end, 8.0);
        for event in group.events() {
            assert_eq!(doc.attr_value(event.handle, "EndTime").unwrap(), "8");
            assert_eq!(event.end, 8.0);
        }
    }

    #[test]
    fn test_shift_moves_window_and_members() {
        let (mut doc, container) = doc_with_container();
        let a = attach_event(&mut doc, container, "a", "TLVoice", 1.0, 4.0);
        let mut group = DurationGroup::new(1.0, 4.0, vec![a]);
        group.shift(&mut doc, 3.0).unwrap();
        assert_eq!((group.start, group.end), (4.0, 7.0));
        assert_eq!(group.events()[0].start, 4.0);
        assert_eq!(group.events()[0].end, 7.0);
    }

    #[test]
    fn test_take_kinds_splits_members() {
        let (mut doc, container) = doc_with_container();
        let a = attach_event(&mut doc, container, "a", "TLShowPeanuts", 0.0, 5.0);
        let b = attach_event(&mut doc, container, "b", "TLShot", 0.0, 5.0);
        let mut group = DurationGroup::new(0.0, 5.0, vec![a, b]);
        let taken = group.take_kinds(&[EventKind::ShowPeanuts]);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].uuid, "a");
        assert_eq!(group.event_count(), 1);
        assert!(group.has_kind(&EventKind::Shot));
    }

    #[test]
    fn test_append_new_lands_after_last_member() {
        let (mut doc, container) = doc_with_container();
        let a = attach_event(&mut doc, container, "a", "TLVoice", 0.0, 5.0);
        // unrelated trailing event outside the group
        attach_event(&mut doc, container, "z", "TLShot", 4.0, 5.0);
        let mut group = DurationGroup::new(0.0, 5.0, vec![a]);
        let spec = EventSpec::new(&EventKind::Sound, "s1").with_note("ambience");
        group.append_new(&mut doc, container, &spec, 0).unwrap();
        let ids: Vec<&str> = doc
            .children(container)
            .filter_map(|h| doc.attr_value_opt(h, "ID"))
            .collect();
        assert_eq!(ids, vec!["a", "s1", "z"]);
        assert_eq!(group.events()[1].start, 0.0);
        assert_eq!(group.events()[1].end, 5.0);
    }
}
