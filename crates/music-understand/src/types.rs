use std::collections::BTreeMap;

use midi_analysis::{OrnamentGroup, RhythmStats, SeparatedVoice, TrackContext};
use serde::{Deserialize, Serialize};

use crate::key::{KeyGroup, KeyPrediction};
use crate::spelling::ScaleSpelling;

/// Complete harmonic understanding of one track.
///
/// Composes ornament tagging, voice separation, the four chord strategies,
/// key prediction and spelling into a single result. Derived and ephemeral:
/// recomputed per call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicUnderstanding {
    /// Algorithm version, bumped when any stage changes its output
    pub version: u32,
    pub context: TrackContext,
    pub total_notes: usize,
    pub ornaments: Vec<OrnamentGroup>,
    pub voices: Vec<SeparatedVoice>,
    pub chords: ChordProgressions,
    /// Note count per pitch class, C = 0
    pub pitch_class_histogram: [u32; 12],
    pub key_groups: Vec<KeyGroup>,
    /// Winner of the top key group, if any notes were present
    pub key: Option<KeyPrediction>,
    pub spelling: Option<ScaleSpelling>,
    pub rhythm: RhythmStats,
    /// Melodic step (semitones) → occurrences, within each voice
    pub voice_intervals: BTreeMap<i32, usize>,
}

/// One scored reading of a simultaneous pitch set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordMatch {
    /// Display name: "C Maj", "A m7/C"
    pub name: String,
    pub root_pitch_class: u8,
    pub root: String,
    /// Shape name from the catalogue: "Maj", "m7", "sus4", ...
    pub quality: String,
    /// Lowest sounding pitch class when it differs from the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bass_pitch_class: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bass: Option<String>,
    pub score: i32,
    pub missing_pitch_classes: Vec<u8>,
    pub missing_notes: Vec<String>,
}

impl ChordMatch {
    pub fn is_inversion(&self) -> bool {
        self.bass_pitch_class.is_some()
    }
}

/// Best reading plus up to five runners-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordIdentification {
    pub best: ChordMatch,
    pub alternatives: Vec<ChordMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordEvent {
    pub onset_tick: u64,
    /// Onset in quarter notes
    pub beat_position: f64,
    /// 1-based measure number
    pub measure: u32,
    /// "Meas 3 | Beat 2.50"
    pub formatted_time: String,
    pub chord: ChordMatch,
    pub constituent_note_names: Vec<String>,
    pub alternatives: Vec<ChordMatch>,
}

impl ChordEvent {
    pub fn name(&self) -> &str {
        &self.chord.name
    }
}

/// The four chord segmentations of one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChordProgressions {
    pub sustain: Vec<ChordEvent>,
    pub attack: Vec<ChordEvent>,
    pub bucketed: Vec<ChordEvent>,
    pub hybrid: Vec<ChordEvent>,
}
