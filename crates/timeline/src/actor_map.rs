//! Actor correspondence between two timelines
//!
//! Speakers and peanut slots are paired by ordinal index, not by identifier:
//! the two documents are presumed to have structurally analogous rosters even
//! though the underlying ids differ. Source ids with no destination
//! counterpart are recorded as removed so dependent events can be dropped
//! instead of left dangling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::EventKind;
use crate::timeline::{PeanutSlot, TimelineSpeaker, TimelineTree};

/// Identifier rewrite maps for one copy operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorMap {
    pub speaker_map: HashMap<String, String>,
    pub peanut_map: HashMap<String, String>,
    pub removed_speakers: Vec<String>,
    pub removed_peanuts: Vec<String>,
    /// Non-reversed speaker pairing, kept alongside a reversed map because
    /// spatial-transform data is authored against the non-reversed roster
    pub transform_speaker_map: Option<HashMap<String, String>>,
}

impl ActorMap {
    /// Derive the source-to-destination correspondence for a copy into `dest`
    pub fn derive(dest: &TimelineTree, source: &TimelineTree, reverse: bool) -> Self {
        let dest_speakers: Vec<(i64, String)> = roster(dest.speakers());
        let source_speakers: Vec<(i64, String)> = roster(source.speakers());
        let dest_peanuts: Vec<(i64, String)> = slots(dest.peanut_slots());
        let source_peanuts: Vec<(i64, String)> = slots(source.peanut_slots());
        Self::from_rosters(
            &dest_speakers,
            &source_speakers,
            &dest_peanuts,
            &source_peanuts,
            reverse,
        )
    }

    pub(crate) fn from_rosters(
        dest_speakers: &[(i64, String)],
        source_speakers: &[(i64, String)],
        dest_peanuts: &[(i64, String)],
        source_peanuts: &[(i64, String)],
        reverse: bool,
    ) -> Self {
        let speaker_map = pair_ordinals(dest_speakers, source_speakers, reverse);
        let transform_speaker_map =
            reverse.then(|| pair_ordinals(dest_speakers, source_speakers, false));
        let removed_speakers = unmatched(source_speakers, &speaker_map);

        let peanut_map = pair_ordinals(dest_peanuts, source_peanuts, false);
        let removed_peanuts = unmatched(source_peanuts, &peanut_map);

        tracing::debug!(
            speakers = speaker_map.len(),
            peanuts = peanut_map.len(),
            removed_speakers = removed_speakers.len(),
            removed_peanuts = removed_peanuts.len(),
            reverse,
            "derived actor map"
        );
        Self {
            speaker_map,
            peanut_map,
            removed_speakers,
            removed_peanuts,
            transform_speaker_map,
        }
    }

    pub fn has_removals(&self) -> bool {
        !self.removed_speakers.is_empty() || !self.removed_peanuts.is_empty()
    }

    pub fn should_remove(&self, actor_uuid: &str) -> bool {
        self.removed_speakers.iter().any(|s| s == actor_uuid)
            || self.removed_peanuts.iter().any(|s| s == actor_uuid)
    }

    /// The merged rewrite map to apply to an event of `kind`
    ///
    /// Peanut entries layer over speaker entries; spatial-transform events
    /// use the non-reversed pairing when one is carried.
    pub fn map_for(&self, kind: Option<&EventKind>) -> HashMap<String, String> {
        let base = match (kind, &self.transform_speaker_map) {
            (Some(EventKind::Transform), Some(transform_map)) => transform_map,
            _ => &self.speaker_map,
        };
        let mut merged = base.clone();
        merged.extend(
            self.peanut_map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        merged
    }
}

fn roster(speakers: &[TimelineSpeaker]) -> Vec<(i64, String)> {
    let mut out: Vec<(i64, String)> = speakers
        .iter()
        .map(|s| (s.index, s.id.clone()))
        .collect();
    out.sort();
    out
}

fn slots(peanuts: &[PeanutSlot]) -> Vec<(i64, String)> {
    let mut out: Vec<(i64, String)> = peanuts
        .iter()
        .map(|p| (p.slot, p.id.clone()))
        .collect();
    out.sort();
    out
}

/// Pair each destination ordinal with the same source ordinal
///
/// `swap01` exchanges source ordinals 0 and 1, used when the two documents
/// disagree on which participant is primary. The first destination id to
/// claim a source id wins; pairing stops once source ordinals run out.
fn pair_ordinals(
    dest: &[(i64, String)],
    source: &[(i64, String)],
    swap01: bool,
) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (index, dest_id) in dest {
        if *index < 0 {
            continue;
        }
        let ordinal = match (swap01, index) {
            (true, 0) => 1usize,
            (true, 1) => 0usize,
            _ => *index as usize,
        };
        let Some((_, source_id)) = source.get(ordinal) else {
            break;
        };
        if map.contains_key(source_id) {
            continue;
        }
        map.insert(source_id.clone(), dest_id.clone());
    }
    map
}

fn unmatched(source: &[(i64, String)], map: &HashMap<String, String>) -> Vec<String> {
    source
        .iter()
        .filter(|(_, id)| !map.contains_key(id))
        .map(|(_, id)| id.clone())
        .collect()
}
