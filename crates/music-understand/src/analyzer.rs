use std::collections::{BTreeMap, HashMap};

use midi_analysis::{Note, SeparatedVoice, SeparationParams, TrackContext};

use crate::chords::{detect_all, ChordDetectionParams};
use crate::key::{predict_key, KeyGroup};
use crate::types::ChordProgressions;

/// Trait for music analysis backends.
///
/// `HeuristicAnalyzer` is the rule-based default. Another backend only has to
/// produce the same shapes of output for the engine to use it.
pub trait MusicAnalyzer: Send + Sync {
    fn separate_voices(
        &self,
        notes: &[Note],
        context: &TrackContext,
        params: &SeparationParams,
    ) -> Vec<SeparatedVoice>;

    fn detect_chords(
        &self,
        notes: &[Note],
        context: &TrackContext,
        params: &ChordDetectionParams,
    ) -> ChordProgressions;

    fn predict_key(&self, histogram: &[u32; 12], total_notes: usize, include_exotic: bool) -> Vec<KeyGroup>;
}

/// Density-based voice separation, shape-catalogue chord matching and
/// weighted scale-fit key prediction.
pub struct HeuristicAnalyzer;

impl MusicAnalyzer for HeuristicAnalyzer {
    fn separate_voices(
        &self,
        notes: &[Note],
        context: &TrackContext,
        params: &SeparationParams,
    ) -> Vec<SeparatedVoice> {
        midi_analysis::separate_voices(notes, context, params)
    }

    fn detect_chords(
        &self,
        notes: &[Note],
        context: &TrackContext,
        params: &ChordDetectionParams,
    ) -> ChordProgressions {
        detect_all(notes, context, params)
    }

    fn predict_key(&self, histogram: &[u32; 12], total_notes: usize, include_exotic: bool) -> Vec<KeyGroup> {
        predict_key(histogram, total_notes, include_exotic)
    }
}

/// Histogram of melodic steps in semitones, taken within each voice.
///
/// Notes without a voice count as voice 0.
pub fn voice_leading_intervals(notes: &[Note]) -> BTreeMap<i32, usize> {
    let mut voices: HashMap<usize, Vec<&Note>> = HashMap::new();
    for note in notes {
        voices.entry(note.voice_index.unwrap_or(0)).or_default().push(note);
    }

    let mut intervals = BTreeMap::new();
    for mut voice in voices.into_values() {
        voice.sort_by_key(|n| n.onset_tick);
        for pair in voice.windows(2) {
            let step = pair[1].pitch as i32 - pair[0].pitch as i32;
            *intervals.entry(step).or_insert(0) += 1;
        }
    }
    intervals
}
