//! Phase partitions
//!
//! A phase's events partition into one full-duration group spanning
//! `[min start, max end]` and zero-or-more sub-duration groups keyed by exact
//! window equality. Sub-duration windows are not required to be contiguous;
//! the partition tolerates gaps.

use std::cmp::Ordering;
use std::collections::HashMap;

use stagehand_document::{Document, NodeHandle};

use crate::duration::DurationGroup;
use crate::error::TimelineError;
use crate::event::{EmotionKey, EventKind, EventNode, EventSpec};

/// One phase's full-duration/sub-duration event partition
#[derive(Debug, Clone)]
pub struct EffectPhase {
    pub(crate) container: NodeHandle,
    /// Whether the events are physically present in `container`. Working
    /// copies built during a splice are detached until appended.
    pub(crate) attached: bool,
    pub(crate) phase_index: usize,
    full: DurationGroup,
    subs: Vec<DurationGroup>,
    uuid_index: Option<HashMap<String, (usize, usize)>>,
}

impl EffectPhase {
    /// Partition `events` into full- and sub-duration groups
    pub(crate) fn from_events(
        container: NodeHandle,
        phase_index: usize,
        events: Vec<EventNode>,
        attached: bool,
    ) -> Result<Self, TimelineError> {
        let min_start = events
            .iter()
            .map(|e| e.start)
            .fold(f64::INFINITY, f64::min);
        let max_end = events
            .iter()
            .map(|e| e.end)
            .fold(f64::NEG_INFINITY, f64::max);
        if events.is_empty() {
            return Err(TimelineError::EmptyPhase(phase_index));
        }

        let mut full_events = Vec::new();
        let mut sub_windows: Vec<((f64, f64), Vec<EventNode>)> = Vec::new();
        for event in events {
            if event.start == min_start && event.end == max_end {
                full_events.push(event);
            } else {
                let window = (event.start, event.end);
                match sub_windows.iter_mut().find(|(w, _)| *w == window) {
                    Some((_, bucket)) => bucket.push(event),
                    None => sub_windows.push((window, vec![event])),
                }
            }
        }
        sub_windows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        Ok(Self {
            container,
            attached,
            phase_index,
            full: DurationGroup::new(min_start, max_end, full_events),
            subs: sub_windows
                .into_iter()
                .map(|((start, end), events)| DurationGroup::new(start, end, events))
                .collect(),
            uuid_index: None,
        })
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn full(&self) -> &DurationGroup {
        &self.full
    }

    pub fn subs(&self) -> &[DurationGroup] {
        &self.subs
    }

    pub(crate) fn groups_mut(&mut self) -> impl Iterator<Item = &mut DurationGroup> {
        std::iter::once(&mut self.full).chain(self.subs.iter_mut())
    }

    pub fn groups(&self) -> impl Iterator<Item = &DurationGroup> {
        std::iter::once(&self.full).chain(self.subs.iter())
    }

    /// All events, full-duration group first, then sub-windows in order
    pub fn events(&self) -> impl Iterator<Item = &EventNode> {
        self.groups().flat_map(|g| g.events().iter())
    }

    pub fn event_count(&self) -> usize {
        self.groups().map(DurationGroup::event_count).sum()
    }

    fn invalidate_index(&mut self) {
        self.uuid_index = None;
    }

    fn ensure_index(&mut self) -> Result<(), TimelineError> {
        if self.uuid_index.is_some() {
            return Ok(());
        }
        let mut index = HashMap::new();
        for (group_index, group) in self.groups().enumerate() {
            for (event_index, event) in group.events().iter().enumerate() {
                if index
                    .insert(event.uuid.clone(), (group_index, event_index))
                    .is_some()
                {
                    return Err(TimelineError::DuplicateEvent(event.uuid.clone()));
                }
            }
        }
        self.uuid_index = Some(index);
        Ok(())
    }

    /// Look up an event by identifier, checking it has the expected kind
    pub fn event_by_uuid(
        &mut self,
        uuid: &str,
        expected: &EventKind,
    ) -> Result<EventNode, TimelineError> {
        self.ensure_index()?;
        let (group_index, event_index) = self
            .uuid_index
            .as_ref()
            .and_then(|index| index.get(uuid))
            .copied()
            .ok_or_else(|| TimelineError::EventNotFound(uuid.to_string()))?;
        let event = self
            .groups()
            .nth(group_index)
            .and_then(|g| g.events().get(event_index))
            .ok_or_else(|| TimelineError::EventNotFound(uuid.to_string()))?;
        if &event.kind != expected {
            return Err(TimelineError::EventKindMismatch {
                uuid: uuid.to_string(),
                expected: expected.tag().to_string(),
                found: event.kind.tag().to_string(),
            });
        }
        Ok(event.clone())
    }

    /// Every identifier-typed attribute value referenced in the phase
    pub fn referenced_ids(&self, doc: &Document) -> Vec<String> {
        let mut out = Vec::new();
        for event in self.events() {
            doc.collect_identifier_values(event.handle, &mut out);
        }
        out
    }

    /// Remove one event from whichever group holds it
    pub fn remove_event(
        &mut self,
        doc: &mut Document,
        uuid: &str,
    ) -> Result<EventNode, TimelineError> {
        let removed = self
            .groups_mut()
            .find_map(|g| g.remove(uuid))
            .ok_or_else(|| TimelineError::EventNotFound(uuid.to_string()))?;
        if self.attached {
            doc.detach_child(self.container, removed.handle)?;
        }
        self.invalidate_index();
        Ok(removed)
    }

    /// Delete the trailing sub-duration window
    ///
    /// The window removed is the one ending at the current phase end with the
    /// latest start time. The full-duration end is then pulled back to the
    /// maximum end among the remaining sub-windows.
    pub fn remove_last_subduration(&mut self, doc: &mut Document) -> Result<(), TimelineError> {
        let mut candidate: Option<usize> = None;
        for (i, sub) in self.subs.iter().enumerate() {
            if sub.end == self.full.end {
                match candidate {
                    Some(best) if self.subs[best].start >= sub.start => {}
                    _ => candidate = Some(i),
                }
            }
        }
        let index = candidate.ok_or(TimelineError::NoTrailingSubDuration)?;
        let mut trailing = self.subs.remove(index);
        tracing::debug!(
            start = trailing.start,
            end = trailing.end,
            events = trailing.event_count(),
            "removing trailing sub-duration"
        );
        for event in trailing.take_all() {
            if self.attached {
                doc.detach_child(self.container, event.handle)?;
            }
        }
        let new_end = self
            .subs
            .iter()
            .map(|s| s.end)
            .fold(f64::NEG_INFINITY, f64::max);
        if !new_end.is_finite() {
            return Err(TimelineError::NoTrailingSubDuration);
        }
        self.full.set_end(doc, new_end)?;
        self.invalidate_index();
        Ok(())
    }

    /// Grow the phase end by `amount`
    ///
    /// Sub-windows ending at the old phase end keep their events frozen at
    /// the old boundary, except events of the listed kinds, which move into a
    /// fresh window reaching the new end. Caller-supplied specs materialize
    /// into an additional `[old_end, new_end]` window.
    pub fn extend_end(
        &mut self,
        doc: &mut Document,
        amount: f64,
        new_events: &[EventSpec],
        kinds_to_extend: &[EventKind],
    ) -> Result<(), TimelineError> {
        let old_end = self.full.end;
        let new_end = old_end + amount;
        self.full.set_end(doc, new_end)?;

        if !kinds_to_extend.is_empty() {
            let mut extended = Vec::new();
            for sub in &mut self.subs {
                if (sub.end - old_end).abs() < 0.001 {
                    let mut moved = sub.take_kinds(kinds_to_extend);
                    if moved.is_empty() {
                        continue;
                    }
                    for event in &mut moved {
                        event.set_end(doc, new_end)?;
                    }
                    extended.push(DurationGroup::new(sub.start, new_end, moved));
                }
            }
            self.subs.extend(extended);
        }

        if !new_events.is_empty() {
            let children: Vec<NodeHandle> = doc.children(self.container).collect();
            let last_position = self
                .events()
                .filter_map(|e| children.iter().position(|&h| h == e.handle))
                .max();
            let mut insert_at = match last_position {
                Some(p) => (p + 1) as isize,
                None => -1,
            };
            let note = format!("Added new node for extended duration {amount}s");
            let mut window = DurationGroup::new(old_end, new_end, Vec::new());
            for spec in new_events {
                let event = spec.materialize(doc, self.phase_index as i64, old_end, new_end)?;
                doc.insert_child(self.container, event.handle, insert_at, Some(&note))?;
                if insert_at != -1 {
                    insert_at += 1;
                }
                window.events_mut().push(event);
            }
            self.subs.push(window);
        }
        self.invalidate_index();
        Ok(())
    }

    /// Retarget the window holding `uuid` to a new duration
    ///
    /// Differences of 0.1s or less are left alone. The owning window's end
    /// moves by the delta; sub-windows starting after the old end, and
    /// trailing windows anchored at it, slide along so material relative to
    /// the end of the window keeps its offset. When the resized window is a
    /// sub-duration, the full-duration end is recomputed from the remaining
    /// sub-window ends.
    pub fn resize_window_of(
        &mut self,
        doc: &mut Document,
        uuid: &str,
        new_duration: f64,
    ) -> Result<(), TimelineError> {
        self.ensure_index()?;
        let (group_index, _) = self
            .uuid_index
            .as_ref()
            .and_then(|index| index.get(uuid))
            .copied()
            .ok_or_else(|| TimelineError::EventNotFound(uuid.to_string()))?;
        let owner_is_full = group_index == 0;
        let (old_start, old_end) = {
            let owner = if owner_is_full {
                &self.full
            } else {
                &self.subs[group_index - 1]
            };
            (owner.start, owner.end)
        };
        let delta = new_duration - (old_end - old_start);
        if delta.abs() <= 0.1 {
            return Ok(());
        }
        let new_end = old_end + delta;
        if old_start >= new_end {
            return Err(TimelineError::WindowInverted {
                start: old_start,
                end: new_end,
            });
        }
        tracing::debug!(old_end, new_end, "resizing event window");
        if owner_is_full {
            self.full.set_end(doc, new_end)?;
        } else {
            self.subs[group_index - 1].set_end(doc, new_end)?;
        }
        for (i, sub) in self.subs.iter_mut().enumerate() {
            if !owner_is_full && i == group_index - 1 {
                continue;
            }
            if sub.start > old_end || (sub.end - old_end).abs() < 0.001 {
                sub.shift(doc, delta)?;
            }
        }
        if !owner_is_full {
            let phase_end = self
                .subs
                .iter()
                .map(|s| s.end)
                .fold(f64::NEG_INFINITY, f64::max);
            if phase_end.is_finite() {
                self.full.set_end(doc, phase_end)?;
            }
        }
        self.invalidate_index();
        Ok(())
    }

    /// Move every window and event in the phase by `delta`
    pub fn shift(&mut self, doc: &mut Document, delta: f64) -> Result<(), TimelineError> {
        self.full.shift(doc, delta)?;
        for sub in &mut self.subs {
            sub.shift(doc, delta)?;
        }
        Ok(())
    }

    /// Rewrite emotion keys for every emotion event bound to `actor`
    pub fn map_emotions(
        &self,
        doc: &mut Document,
        actor: &str,
        map: &HashMap<EmotionKey, EmotionKey>,
    ) -> Result<(), TimelineError> {
        let emotion_events: Vec<EventNode> = self
            .events()
            .filter(|e| e.kind == EventKind::Emotion)
            .cloned()
            .collect();
        for event in emotion_events {
            if event.actor_id(doc)?.as_deref() == Some(actor) {
                event.map_emotions(doc, map)?;
            }
        }
        Ok(())
    }

    /// Materialize a new event spanning the whole phase
    pub fn append_full_duration_event(
        &mut self,
        doc: &mut Document,
        spec: &EventSpec,
    ) -> Result<EventNode, TimelineError> {
        let phase_index = self.phase_index as i64;
        let event = self.full.append_new(doc, self.container, spec, phase_index)?;
        self.invalidate_index();
        Ok(event)
    }

    /// Rewrite every event id in order, full group first
    pub(crate) fn replace_event_ids(
        &mut self,
        doc: &mut Document,
        ids: &[String],
    ) -> Result<(), TimelineError> {
        let events = self.event_count();
        if ids.len() < events {
            return Err(TimelineError::NotEnoughReplacementIds {
                provided: ids.len(),
                events,
            });
        }
        let mut ids = ids.iter();
        for group in self.groups_mut() {
            for event in group.events_mut() {
                if let Some(id) = ids.next() {
                    doc.set_attr(event.handle, crate::event::ID_ATTR, id.clone(), None)?;
                    event.uuid = id.clone();
                }
            }
        }
        self.invalidate_index();
        Ok(())
    }
}
