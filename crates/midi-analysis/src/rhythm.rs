use crate::context::TimeSignature;
use crate::note::Note;
use serde::{Deserialize, Serialize};

/// Standard note values as multiples of a quarter note.
const STANDARD_DURATIONS: [(&str, f64); 17] = [
    ("Whole Note", 4.0),
    ("Dotted Half", 3.0),
    ("Half Note", 2.0),
    ("Dotted Quarter", 1.5),
    ("Half Triplet", 1.3333),
    ("Quarter Note", 1.0),
    ("Quarter Quintuplet", 0.8),
    ("Dotted Eighth", 0.75),
    ("Quarter Triplet", 0.6666),
    ("Eighth Note", 0.5),
    ("Eighth Quintuplet", 0.4),
    ("Dotted 16th", 0.375),
    ("Eighth Triplet", 0.3333),
    ("16th Note", 0.25),
    ("16th Quintuplet", 0.2),
    ("16th Triplet", 0.1666),
    ("32nd Note", 0.125),
];

/// How many notes were closest to one standard note value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteValueStat {
    pub name: String,
    pub count: usize,
    pub percentage: f64,
    pub standard_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhythmStats {
    pub total_notes: usize,
    /// Most common note values first.
    pub top_note_values: Vec<NoteValueStat>,
    /// Mean closeness of durations to their nearest standard value (0.0–1.0).
    pub duration_consistency_score: f64,
    pub detected_grid_type: String,
    pub grid_ticks: f64,
    /// Mean closeness of onsets to the detected grid (0.0–1.0).
    pub grid_alignment_score: f64,
    pub average_offset_ticks: f64,
}

impl RhythmStats {
    fn empty() -> Self {
        Self {
            total_notes: 0,
            top_note_values: Vec::new(),
            duration_consistency_score: 0.0,
            detected_grid_type: "None".to_string(),
            grid_ticks: 0.0,
            grid_alignment_score: 0.0,
            average_offset_ticks: 0.0,
        }
    }
}

/// Classify durations against standard note values and measure how well
/// onsets sit on the grid those durations imply.
pub fn analyze_rhythm(notes: &[Note], ppq: u16, time_signature: TimeSignature) -> RhythmStats {
    if notes.is_empty() || ppq == 0 {
        return RhythmStats::empty();
    }
    let quarter = ppq as f64;

    let mut values: Vec<NoteValueStat> = Vec::new();
    let mut consistency = 0.0;
    for note in notes {
        let ratio = note.duration_ticks as f64 / quarter;
        let mut best = STANDARD_DURATIONS[0];
        let mut best_distance = (ratio - best.1).abs();
        for candidate in &STANDARD_DURATIONS[1..] {
            let distance = (ratio - candidate.1).abs();
            if distance < best_distance {
                best = *candidate;
                best_distance = distance;
            }
        }
        consistency += 1.0 - (best_distance / best.1).min(1.0);

        match values.iter_mut().find(|s| s.name == best.0) {
            Some(stat) => stat.count += 1,
            None => values.push(NoteValueStat {
                name: best.0.to_string(),
                count: 1,
                percentage: 0.0,
                standard_multiplier: best.1,
            }),
        }
    }

    let total = notes.len();
    for stat in &mut values {
        stat.percentage = stat.count as f64 / total as f64 * 100.0;
    }
    values.sort_by(|a, b| b.count.cmp(&a.count));

    let (mut grid, mut label) = if time_signature.denominator == 8 {
        (quarter / 2.0, "1/8 Compound")
    } else {
        (quarter / 4.0, "1/16 Standard")
    };
    if let Some(top) = values.first() {
        if top.name.contains("Triplet") {
            if top.standard_multiplier < 0.2 {
                (grid, label) = (quarter / 6.0, "1/16 Triplet");
            } else {
                (grid, label) = (quarter / 3.0, "1/8 Triplet");
            }
        } else if top.name.contains("Quintuplet") {
            (grid, label) = (quarter / 5.0, "1/16 Quintuplet");
        }
    }

    let mut alignment = 0.0;
    let mut offset_total = 0.0;
    for note in notes {
        let off = note.onset_tick as f64 % grid;
        let distance = off.min(grid - off);
        offset_total += distance;
        alignment += 1.0 - distance / (grid / 2.0);
    }

    RhythmStats {
        total_notes: total,
        top_note_values: values,
        duration_consistency_score: consistency / total as f64,
        detected_grid_type: label.to_string(),
        grid_ticks: grid,
        grid_alignment_score: alignment / total as f64,
        average_offset_ticks: offset_total / total as f64,
    }
}
