use std::collections::HashMap;

use midi_analysis::{Note, NOTE_NAMES};
use serde::{Deserialize, Serialize};

use crate::modes::{Mode, EXOTIC_MODES, STANDARD_MODES};

const DIATONIC_WEIGHT: f64 = 0.5;
const TRIAD_WEIGHT: f64 = 0.3;
const TONIC_WEIGHT: f64 = 0.2;

/// One (root, mode) reading of a pitch-class histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPrediction {
    /// Pitch class 0–11 (C = 0)
    pub root: u8,
    pub mode: String,
    /// Weighted composite of the three fits
    pub score: f64,
    /// Fraction of notes inside the scale
    pub diatonic_fit: f64,
    /// Fraction of notes on the tonic triad
    pub triad_fit: f64,
    /// Fraction of notes on the root
    pub tonic_fit: f64,
}

impl KeyPrediction {
    pub fn root_name(&self) -> &'static str {
        NOTE_NAMES[(self.root % 12) as usize]
    }

    /// "Eb Dorian"
    pub fn label(&self) -> String {
        format!("{} {}", self.root_name(), self.mode)
    }
}

/// Readings sharing one absolute pitch-class set (relative modes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGroup {
    pub winner: KeyPrediction,
    pub relatives: Vec<KeyPrediction>,
}

/// Count notes per pitch class.
pub fn pitch_class_histogram(notes: &[Note]) -> [u32; 12] {
    let mut histogram = [0u32; 12];
    for note in notes {
        histogram[note.pitch_class() as usize] += 1;
    }
    histogram
}

fn score_mode(histogram: &[u32; 12], total_notes: usize, root: u8, mode: &Mode) -> KeyPrediction {
    let scale = mode.pitch_classes(root);
    let triad: Vec<u8> = mode
        .triad_intervals()
        .iter()
        .map(|i| (root + i) % 12)
        .collect();

    let mut diatonic = 0u32;
    let mut on_triad = 0u32;
    for (pc, &count) in (0u8..12).zip(histogram) {
        if scale.contains(&pc) {
            diatonic += count;
        }
        if triad.contains(&pc) {
            on_triad += count;
        }
    }

    let total = total_notes as f64;
    let diatonic_fit = diatonic as f64 / total;
    let triad_fit = on_triad as f64 / total;
    let tonic_fit = histogram[root as usize] as f64 / total;

    KeyPrediction {
        root,
        mode: mode.name.to_string(),
        score: diatonic_fit * DIATONIC_WEIGHT + triad_fit * TRIAD_WEIGHT + tonic_fit * TONIC_WEIGHT,
        diatonic_fit,
        triad_fit,
        tonic_fit,
    }
}

/// Rank every (root, mode) pair against a pitch-class histogram.
///
/// Readings with the same pitch-class set are grouped; the best of each group
/// is its winner and groups are ordered by winner score. Ties keep root then
/// catalogue order. Zero notes gives no prediction.
pub fn predict_key(histogram: &[u32; 12], total_notes: usize, include_exotic: bool) -> Vec<KeyGroup> {
    if total_notes == 0 {
        return Vec::new();
    }

    let modes: Vec<&Mode> = if include_exotic {
        STANDARD_MODES.iter().chain(EXOTIC_MODES).collect()
    } else {
        STANDARD_MODES.iter().collect()
    };

    let mut slots: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut grouped: Vec<Vec<KeyPrediction>> = Vec::new();
    for root in 0..12u8 {
        for mode in &modes {
            let prediction = score_mode(histogram, total_notes, root, mode);
            let slot = *slots.entry(mode.pitch_classes(root)).or_insert_with(|| {
                grouped.push(Vec::new());
                grouped.len() - 1
            });
            grouped[slot].push(prediction);
        }
    }

    let mut groups: Vec<KeyGroup> = grouped
        .into_iter()
        .filter_map(|mut members| {
            members.sort_by(|a, b| b.score.total_cmp(&a.score));
            let mut members = members.into_iter();
            let winner = members.next()?;
            Some(KeyGroup {
                winner,
                relatives: members.collect(),
            })
        })
        .collect();
    groups.sort_by(|a, b| b.winner.score.total_cmp(&a.winner.score));
    groups
}
