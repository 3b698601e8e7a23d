use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical chromatic names used for display (`C C# D Eb E F F# G Ab A Bb B`).
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// A single note with absolute tick timing and analysis tags.
///
/// Every stage takes notes by value or slice and returns a fresh `Vec<Note>`;
/// the derived fields (`voice_index`, `is_ornament`, principal link) are set
/// on the returned copies, never on a record another stage still holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub onset_tick: u64,
    pub duration_ticks: u64,
    /// Normalized velocity, 0.0–1.0
    pub velocity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_index: Option<usize>,
    #[serde(default)]
    pub is_ornament: bool,
    /// Pitch of the principal note this ornament decorates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_pitch: Option<u8>,
    /// Onset of the principal note this ornament decorates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_onset_tick: Option<u64>,
}

impl Note {
    pub fn new(pitch: u8, onset_tick: u64, duration_ticks: u64, velocity: f32) -> Self {
        Self {
            pitch: pitch.min(127),
            onset_tick,
            duration_ticks,
            velocity: velocity.clamp(0.0, 1.0),
            voice_index: None,
            is_ornament: false,
            principal_pitch: None,
            principal_onset_tick: None,
        }
    }

    pub fn offset_tick(&self) -> u64 {
        self.onset_tick + self.duration_ticks
    }

    pub fn pitch_class(&self) -> u8 {
        self.pitch % 12
    }

    /// Scientific pitch name, e.g. 60 → "C4".
    pub fn name(&self) -> String {
        pitch_name(self.pitch)
    }

    /// Onset used for harmonic grouping: ornaments sound at their principal.
    pub fn harmonic_onset_tick(&self) -> u64 {
        match (self.is_ornament, self.principal_onset_tick) {
            (true, Some(tick)) => tick,
            _ => self.onset_tick,
        }
    }

    /// True when the two notes sound at the same time for at least one tick.
    pub fn overlaps(&self, other: &Note) -> bool {
        self.onset_tick < other.offset_tick() && other.onset_tick < self.offset_tick()
    }
}

/// Scientific pitch name for a MIDI pitch.
pub fn pitch_name(pitch: u8) -> String {
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

/// Sort notes by onset, keeping input order for equal onsets.
pub fn sort_by_onset(notes: &mut [Note]) {
    notes.sort_by_key(|n| n.onset_tick);
}

/// Raise every zero duration to `min_ticks` (at least one tick).
pub fn coerce_min_duration(mut notes: Vec<Note>, min_ticks: u64) -> Vec<Note> {
    let floor = min_ticks.max(1);
    for note in &mut notes {
        if note.duration_ticks == 0 {
            note.duration_ticks = floor;
        }
    }
    notes
}

/// Re-point principal links after a stage that turned `before[i]` into `after[i]`.
///
/// A link names its principal by pitch and onset, so whenever a stage moves or
/// repitches notes the link must follow the principal's new position. Links
/// to a principal not present in `before` are left unchanged.
pub fn follow_principals(before: &[Note], mut after: Vec<Note>) -> Vec<Note> {
    let mut moved: HashMap<(u8, u64), (u8, u64)> = HashMap::new();
    for (old, new) in before.iter().zip(&after) {
        moved
            .entry((old.pitch, old.onset_tick))
            .or_insert((new.pitch, new.onset_tick));
    }

    for note in &mut after {
        let (Some(pitch), Some(onset)) = (note.principal_pitch, note.principal_onset_tick) else {
            continue;
        };
        if let Some(&(new_pitch, new_onset)) = moved.get(&(pitch, onset)) {
            note.principal_pitch = Some(new_pitch);
            note.principal_onset_tick = Some(new_onset);
        }
    }
    after
}

/// Statistics about a separated voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceStats {
    pub note_count: usize,
    pub pitch_min: u8,
    pub pitch_max: u8,
    pub mean_pitch: f64,
    /// Fraction of the voice's time span covered by notes (0.0–1.0)
    pub coverage: f64,
}

impl VoiceStats {
    pub fn from_notes(notes: &[Note]) -> Self {
        if notes.is_empty() {
            return Self {
                note_count: 0,
                pitch_min: 0,
                pitch_max: 0,
                mean_pitch: 0.0,
                coverage: 0.0,
            };
        }

        let pitch_min = notes.iter().map(|n| n.pitch).min().unwrap_or(0);
        let pitch_max = notes.iter().map(|n| n.pitch).max().unwrap_or(0);
        let mean_pitch =
            notes.iter().map(|n| n.pitch as f64).sum::<f64>() / notes.len() as f64;

        let first_onset = notes.iter().map(|n| n.onset_tick).min().unwrap_or(0);
        let last_offset = notes.iter().map(|n| n.offset_tick()).max().unwrap_or(0);
        let span = last_offset.saturating_sub(first_onset);

        let sounding_ticks: u64 = notes.iter().map(|n| n.duration_ticks).sum();
        let coverage = if span > 0 {
            (sounding_ticks as f64 / span as f64).min(1.0)
        } else {
            0.0
        };

        Self {
            note_count: notes.len(),
            pitch_min,
            pitch_max,
            mean_pitch,
            coverage,
        }
    }
}

/// A separated voice: a monophonic-ish stream tagged with its index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparatedVoice {
    pub voice_index: usize,
    pub label: String,
    pub notes: Vec<Note>,
    pub stats: VoiceStats,
}
