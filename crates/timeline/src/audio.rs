//! Recorded-audio metadata
//!
//! The resize path needs to know how long a spoken line actually runs.
//! That duration lives outside the timeline document, so callers load it
//! from their audio pipeline and hand it over as an index keyed by the
//! dialog-node id the line plays under.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata for one recorded line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAudio {
    /// Playback length in seconds
    pub duration: f64,
    /// Source file the duration was measured from
    pub source_file: String,
    /// Speaker the line belongs to
    pub speaker_id: String,
}

/// Audio metadata keyed by dialog-node id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioIndex {
    entries: HashMap<String, LineAudio>,
}

impl AudioIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dialog_node_id: impl Into<String>, audio: LineAudio) {
        self.entries.insert(dialog_node_id.into(), audio);
    }

    pub fn get(&self, dialog_node_id: &str) -> Option<&LineAudio> {
        self.entries.get(dialog_node_id)
    }

    pub fn duration_for(&self, dialog_node_id: &str) -> Option<f64> {
        self.get(dialog_node_id).map(|a| a.duration)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_dialog_node() {
        let mut index = AudioIndex::new();
        index.insert(
            "dlg-1",
            LineAudio {
                duration: 3.25,
                source_file: "lines/dlg-1.wem".to_string(),
                speaker_id: "spk-a".to_string(),
            },
        );
        assert_eq!(index.duration_for("dlg-1"), Some(3.25));
        assert_eq!(index.get("dlg-1").unwrap().speaker_id, "spk-a");
        assert_eq!(index.duration_for("dlg-2"), None);
        assert_eq!(index.len(), 1);
    }
}
