//! Per-stage note transforms: transposition, filtering, overlap pruning,
//! time scaling, retrograde, melodic inversion, modal remapping and cropping.
//!
//! Every function takes a note slice and returns a fresh list. A zero or
//! otherwise degenerate parameter (disabled range, zero-length window) makes
//! the stage a pass-through rather than an error.

use crate::context::TimeSignature;
use crate::note::{follow_principals, pitch_name, sort_by_onset, Note};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Musical-time thresholds as fractions of a quarter note, selected by index:
/// off, 1/128, 1/64t, 1/64, 1/32t, 1/32, 1/16t, 1/16, 1/8t, 1/8, 1/4.
pub const MUSICAL_TIME_FRACTIONS: [f64; 11] = [
    0.0, 0.03125, 0.0416, 0.0625, 0.0833, 0.125, 0.1666, 0.25, 0.3333, 0.5, 1.0,
];

/// Ticks for a musical-time threshold index. Out-of-range indices use the largest entry.
pub fn musical_time_ticks(index: usize, ppq: u16) -> u64 {
    let fraction = MUSICAL_TIME_FRACTIONS[index.min(MUSICAL_TIME_FRACTIONS.len() - 1)];
    (ppq as f64 * fraction).round() as u64
}

/// Tolerance used when deciding whether a later same-pitch note is swallowed
/// by an earlier one.
pub fn prune_threshold_ticks(index: usize, ppq: u16) -> u64 {
    musical_time_ticks(index, ppq)
}

fn clamp_pitch(pitch: i32) -> u8 {
    pitch.clamp(0, 127) as u8
}

fn scale_ticks(ticks: u64, factor: f64) -> u64 {
    (ticks as f64 * factor).round().max(0.0) as u64
}

/// Transpose by `semitones` (clamped to the MIDI range) and rescale timing
/// from `source_ppq` to `target_ppq`.
pub fn normalize_and_transpose(
    notes: &[Note],
    semitones: i32,
    source_ppq: u16,
    target_ppq: u16,
) -> Vec<Note> {
    let ratio = if source_ppq == 0 || target_ppq == 0 {
        1.0
    } else {
        target_ppq as f64 / source_ppq as f64
    };

    notes
        .iter()
        .map(|n| Note {
            pitch: clamp_pitch(n.pitch as i32 + semitones),
            onset_tick: scale_ticks(n.onset_tick, ratio),
            duration_ticks: scale_ticks(n.duration_ticks, ratio),
            principal_onset_tick: n.principal_onset_tick.map(|t| scale_ticks(t, ratio)),
            principal_pitch: n
                .principal_pitch
                .map(|p| clamp_pitch(p as i32 + semitones)),
            ..n.clone()
        })
        .collect()
}

/// Drop notes shorter than `min_ticks`. Zero keeps everything.
pub fn filter_short_notes(notes: &[Note], min_ticks: u64) -> Vec<Note> {
    if min_ticks == 0 {
        return notes.to_vec();
    }
    notes
        .iter()
        .filter(|n| n.duration_ticks >= min_ticks)
        .cloned()
        .collect()
}

/// Move everything earlier so the first onset lands on its measure's downbeat.
pub fn shift_to_measure(notes: &[Note], ppq: u16, time_signature: TimeSignature) -> Vec<Note> {
    let mut sorted = notes.to_vec();
    sort_by_onset(&mut sorted);

    let measure = time_signature.ticks_per_measure(ppq);
    let Some(first) = sorted.first().map(|n| n.onset_tick) else {
        return sorted;
    };
    if measure <= 0.0 {
        return sorted;
    }

    let shift = first as f64 % measure;
    if shift == 0.0 {
        return sorted;
    }
    for note in &mut sorted {
        note.onset_tick = (note.onset_tick as f64 - shift).round().max(0.0) as u64;
        if let Some(principal) = note.principal_onset_tick.as_mut() {
            *principal = (*principal as f64 - shift).round().max(0.0) as u64;
        }
    }
    sorted
}

/// Resolve overlapping notes of the same pitch.
///
/// Identical-onset duplicates keep the longest. A later note that ends no more
/// than `threshold_ticks` before the earlier one is absorbed; any other overlap
/// truncates the earlier note at the later onset. Returns the surviving notes
/// in onset order plus the number truncated.
pub fn prune_overlaps_counted(notes: &[Note], threshold_ticks: u64) -> (Vec<Note>, usize) {
    let mut sorted = notes.to_vec();
    sorted.sort_by(|a, b| {
        a.pitch
            .cmp(&b.pitch)
            .then(a.onset_tick.cmp(&b.onset_tick))
            .then(b.duration_ticks.cmp(&a.duration_ticks))
    });

    let mut pruned = Vec::with_capacity(sorted.len());
    let mut truncated = 0;
    let mut i = 0;
    while i < sorted.len() {
        let mut current = sorted[i].clone();
        let mut j = i + 1;

        while j < sorted.len() && sorted[j].pitch == current.pitch {
            let next = &sorted[j];
            let current_end = current.offset_tick();
            if current_end <= next.onset_tick {
                break;
            }
            if next.onset_tick == current.onset_tick {
                j += 1;
                continue;
            }
            let next_end = next.offset_tick();
            if current_end > next_end && current_end - next_end <= threshold_ticks {
                j += 1;
                continue;
            }
            current.duration_ticks = next.onset_tick - current.onset_tick;
            truncated += 1;
            break;
        }

        if current.duration_ticks > 0 {
            pruned.push(current);
        }
        i = j;
    }

    sort_by_onset(&mut pruned);
    (pruned, truncated)
}

pub fn prune_overlaps(notes: &[Note], threshold_ticks: u64) -> Vec<Note> {
    prune_overlaps_counted(notes, threshold_ticks).0
}

/// Stretch or compress timing by `factor`. Non-positive or non-finite factors are ignored.
pub fn time_scale(notes: &[Note], factor: f64) -> Vec<Note> {
    if factor == 1.0 || !factor.is_finite() || factor <= 0.0 {
        return notes.to_vec();
    }
    notes
        .iter()
        .map(|n| Note {
            onset_tick: scale_ticks(n.onset_tick, factor),
            duration_ticks: scale_ticks(n.duration_ticks, factor),
            principal_onset_tick: n.principal_onset_tick.map(|t| scale_ticks(t, factor)),
            ..n.clone()
        })
        .collect()
}

/// Retrograde scope: whole track or fixed-size windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversionMode {
    #[default]
    Off,
    Global,
    #[serde(rename = "1beat")]
    OneBeat,
    #[serde(rename = "2beats")]
    TwoBeats,
    Measure,
    #[serde(rename = "2measures")]
    TwoMeasures,
    #[serde(rename = "4measures")]
    FourMeasures,
    #[serde(rename = "8measures")]
    EightMeasures,
}

impl InversionMode {
    /// Window length in ticks for the segmented modes.
    fn window_ticks(&self, ppq: u16, time_signature: TimeSignature) -> Option<f64> {
        let measure = ppq as f64 * 4.0 * time_signature.numerator as f64
            / time_signature.denominator.max(1) as f64;
        match self {
            InversionMode::Off | InversionMode::Global => None,
            InversionMode::OneBeat => Some(ppq as f64),
            InversionMode::TwoBeats => Some(ppq as f64 * 2.0),
            InversionMode::Measure => Some(measure),
            InversionMode::TwoMeasures => Some(measure * 2.0),
            InversionMode::FourMeasures => Some(measure * 4.0),
            InversionMode::EightMeasures => Some(measure * 8.0),
        }
    }
}

/// Play the notes backwards, either across the whole track or within each window.
///
/// A note's end becomes its start: globally `onset' = total_end - end`, in a
/// window `onset' = window_start + (window_end - end)`, clamped at zero.
pub fn retrograde(
    notes: &[Note],
    mode: InversionMode,
    ppq: u16,
    time_signature: TimeSignature,
) -> Vec<Note> {
    let reversed = match mode {
        InversionMode::Off => return notes.to_vec(),
        InversionMode::Global => {
            let total_end = notes.iter().map(Note::offset_tick).max().unwrap_or(0);
            notes
                .iter()
                .map(|n| Note {
                    onset_tick: total_end - n.offset_tick(),
                    ..n.clone()
                })
                .collect()
        }
        segmented => {
            let window = match segmented.window_ticks(ppq, time_signature) {
                Some(w) if w > 0.0 => w,
                _ => return notes.to_vec(),
            };
            notes
                .iter()
                .map(|n| {
                    let start = (n.onset_tick as f64 / window).floor() * window;
                    let end = start + window;
                    let flipped = start + (end - n.offset_tick() as f64);
                    Note {
                        onset_tick: flipped.round().max(0.0) as u64,
                        ..n.clone()
                    }
                })
                .collect()
        }
    };
    follow_principals(notes, reversed)
}

/// A 1-based inclusive measure range with an on/off switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MelodicInversion {
    pub enabled: bool,
    pub start_measure: u32,
    pub end_measure: u32,
}

impl Default for MelodicInversion {
    fn default() -> Self {
        Self {
            enabled: false,
            start_measure: 1,
            end_measure: 4,
        }
    }
}

impl MelodicInversion {
    pub fn validate(&self) -> Result<()> {
        validate_measures(self.start_measure, self.end_measure)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRange {
    pub enabled: bool,
    pub start_measure: u32,
    pub end_measure: u32,
}

impl Default for ExportRange {
    fn default() -> Self {
        Self {
            enabled: false,
            start_measure: 1,
            end_measure: 8,
        }
    }
}

impl ExportRange {
    pub fn validate(&self) -> Result<()> {
        validate_measures(self.start_measure, self.end_measure)
    }
}

fn validate_measures(start: u32, end: u32) -> Result<()> {
    if start == 0 || end < start {
        return Err(Error::InvalidRange { start, end });
    }
    Ok(())
}

/// Summary of what a melodic inversion over a range would touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InversionStats {
    pub total_notes: usize,
    pub anchor_note_name: String,
    pub has_polyphony: bool,
    pub range_start_tick: u64,
    pub range_end_tick: u64,
}

fn notes_in_range(notes: &[Note], start: u64, end: u64) -> Vec<&Note> {
    notes
        .iter()
        .filter(|n| n.onset_tick >= start && n.onset_tick < end)
        .collect()
}

/// First note by onset, lowest pitch on ties.
fn anchor<'a>(in_range: &[&'a Note]) -> Option<&'a Note> {
    in_range
        .iter()
        .copied()
        .min_by(|a, b| a.onset_tick.cmp(&b.onset_tick).then(a.pitch.cmp(&b.pitch)))
}

/// Describe the notes a melodic inversion over `range` would affect.
///
/// None for an empty track.
pub fn inversion_stats(
    notes: &[Note],
    range: &MelodicInversion,
    ppq: u16,
    time_signature: TimeSignature,
) -> Option<InversionStats> {
    if notes.is_empty() {
        return None;
    }
    let (start, end) =
        time_signature.measure_range_ticks(ppq, range.start_measure, range.end_measure);
    let mut in_range = notes_in_range(notes, start, end);
    in_range.sort_by(|a, b| a.onset_tick.cmp(&b.onset_tick).then(a.pitch.cmp(&b.pitch)));

    let has_polyphony = in_range
        .windows(2)
        .any(|w| w[0].offset_tick() > w[1].onset_tick);

    Some(InversionStats {
        total_notes: in_range.len(),
        anchor_note_name: in_range
            .first()
            .map(|n| pitch_name(n.pitch))
            .unwrap_or_else(|| "None".to_string()),
        has_polyphony,
        range_start_tick: start,
        range_end_tick: end,
    })
}

/// Mirror pitches around the first note of the range: `pitch' = 2·anchor − pitch`.
pub fn melodic_inversion(
    notes: &[Note],
    range: &MelodicInversion,
    ppq: u16,
    time_signature: TimeSignature,
) -> Vec<Note> {
    if !range.enabled {
        return notes.to_vec();
    }
    let (start, end) =
        time_signature.measure_range_ticks(ppq, range.start_measure, range.end_measure);
    let Some(axis) = anchor(&notes_in_range(notes, start, end)).map(|n| n.pitch as i32) else {
        return notes.to_vec();
    };

    let inverted = notes
        .iter()
        .map(|n| {
            if n.onset_tick >= start && n.onset_tick < end {
                Note {
                    pitch: clamp_pitch(2 * axis - n.pitch as i32),
                    ..n.clone()
                }
            } else {
                n.clone()
            }
        })
        .collect();
    follow_principals(notes, inverted)
}

/// Pitch remap relative to a root: `mappings[i]` is the target interval for
/// source interval `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalConversion {
    pub enabled: bool,
    pub root: u8,
    pub mode_name: String,
    pub mappings: [u8; 12],
}

impl Default for ModalConversion {
    fn default() -> Self {
        Self {
            enabled: false,
            root: 0,
            mode_name: "Major".to_string(),
            mappings: std::array::from_fn(|i| i as u8),
        }
    }
}

impl ModalConversion {
    pub fn validate(&self) -> Result<()> {
        if self.root > 11 {
            return Err(Error::InvalidParameter {
                field: "root",
                reason: format!("pitch class {} out of range 0..=11", self.root),
            });
        }
        if let Some(bad) = self.mappings.iter().find(|&&m| m > 11) {
            return Err(Error::InvalidParameter {
                field: "mappings",
                reason: format!("interval {} out of range 0..=11", bad),
            });
        }
        Ok(())
    }
}

/// Move each note from its source interval to the mapped target interval,
/// staying in the same octave band relative to the root.
pub fn modal_remap(notes: &[Note], conversion: &ModalConversion) -> Vec<Note> {
    if !conversion.enabled {
        return notes.to_vec();
    }
    let root = (conversion.root % 12) as i32;
    let remapped = notes
        .iter()
        .map(|n| {
            let source = (n.pitch_class() as i32 - root).rem_euclid(12);
            let target = conversion.mappings[source as usize] as i32;
            Note {
                pitch: clamp_pitch(n.pitch as i32 - source + target),
                ..n.clone()
            }
        })
        .collect();
    follow_principals(notes, remapped)
}

/// Keep notes sounding inside the measure range and re-base so the range starts at tick 0.
///
/// Notes that begin before the range are clipped to start at 0.
pub fn crop_to_range(
    notes: &[Note],
    range: &ExportRange,
    ppq: u16,
    time_signature: TimeSignature,
) -> Vec<Note> {
    if !range.enabled {
        return notes.to_vec();
    }
    let (start, end) =
        time_signature.measure_range_ticks(ppq, range.start_measure, range.end_measure);

    notes
        .iter()
        .filter(|n| n.offset_tick() > start && n.onset_tick < end)
        .map(|n| {
            let clipped = start.saturating_sub(n.onset_tick);
            Note {
                onset_tick: n.onset_tick.saturating_sub(start),
                duration_ticks: n.duration_ticks - clipped,
                principal_onset_tick: n.principal_onset_tick.map(|t| t.saturating_sub(start)),
                ..n.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PPQ: u16 = 480;

    fn make_note(pitch: u8, onset: u64, duration: u64) -> Note {
        Note::new(pitch, onset, duration, 0.8)
    }

    fn four_four() -> TimeSignature {
        TimeSignature::new(4, 4)
    }

    fn onsets(notes: &[Note]) -> Vec<u64> {
        notes.iter().map(|n| n.onset_tick).collect()
    }

    fn pitches(notes: &[Note]) -> Vec<u8> {
        notes.iter().map(|n| n.pitch).collect()
    }

    #[test]
    fn transpose_clamps_and_rescales() {
        let notes = vec![make_note(120, 96, 48), make_note(3, 0, 96)];
        let out = normalize_and_transpose(&notes, 12, 96, 480);
        assert_eq!(pitches(&out), vec![127, 15]);
        assert_eq!(out[0].onset_tick, 480);
        assert_eq!(out[0].duration_ticks, 240);

        let down = normalize_and_transpose(&notes, -12, 480, 480);
        assert_eq!(pitches(&down), vec![108, 0]);
    }

    #[test]
    fn short_notes_filtered() {
        let notes = vec![make_note(60, 0, 10), make_note(62, 10, 120)];
        assert_eq!(filter_short_notes(&notes, 30).len(), 1);
        assert_eq!(filter_short_notes(&notes, 0).len(), 2);
    }

    #[test]
    fn threshold_table() {
        assert_eq!(musical_time_ticks(0, PPQ), 0);
        assert_eq!(musical_time_ticks(3, PPQ), 30);
        assert_eq!(musical_time_ticks(7, PPQ), 120);
        assert_eq!(musical_time_ticks(99, PPQ), 480);
    }

    #[test]
    fn shift_moves_first_note_to_downbeat() {
        let notes = vec![make_note(60, 2100, 100), make_note(62, 2400, 100)];
        let out = shift_to_measure(&notes, PPQ, four_four());
        assert_eq!(onsets(&out), vec![1920, 2220]);
    }

    #[test]
    fn prune_truncates_and_absorbs() {
        let notes = vec![
            // truncated at 240
            make_note(60, 0, 480),
            make_note(60, 240, 480),
            // duplicate onset: shorter one dropped
            make_note(64, 0, 480),
            make_note(64, 0, 240),
            // swallowed: ends 20 ticks before the long note
            make_note(67, 0, 960),
            make_note(67, 480, 460),
        ];
        let (out, truncated) = prune_overlaps_counted(&notes, 30);
        assert_eq!(truncated, 1);
        let mut summary: Vec<(u8, u64, u64)> = out
            .iter()
            .map(|n| (n.pitch, n.onset_tick, n.duration_ticks))
            .collect();
        summary.sort();
        assert_eq!(
            summary,
            vec![(60, 0, 240), (60, 240, 480), (64, 0, 480), (67, 0, 960)]
        );
    }

    #[test]
    fn time_scale_doubles() {
        let notes = vec![make_note(60, 240, 120)];
        let out = time_scale(&notes, 2.0);
        assert_eq!(out[0].onset_tick, 480);
        assert_eq!(out[0].duration_ticks, 240);
        assert_eq!(time_scale(&notes, 0.0), notes);
    }

    #[test]
    fn global_retrograde() {
        let notes = vec![make_note(60, 0, 480), make_note(62, 480, 960)];
        let out = retrograde(&notes, InversionMode::Global, PPQ, four_four());
        assert_eq!(onsets(&out), vec![960, 0]);
    }

    #[test]
    fn windowed_retrograde() {
        let notes = vec![
            make_note(60, 0, 240),
            make_note(62, 240, 240),
            make_note(64, 480, 120),
        ];
        let out = retrograde(&notes, InversionMode::OneBeat, PPQ, four_four());
        assert_eq!(onsets(&out), vec![240, 0, 840]);
    }

    #[test]
    fn retrograde_serde_names() {
        let mode: InversionMode = serde_json::from_str("\"2measures\"").unwrap();
        assert_eq!(mode, InversionMode::TwoMeasures);
        assert_eq!(serde_json::to_string(&InversionMode::OneBeat).unwrap(), "\"1beat\"");
    }

    #[test]
    fn melodic_inversion_mirrors_range() {
        let notes = vec![
            make_note(64, 0, 480),
            make_note(60, 0, 480),
            make_note(67, 480, 480),
            make_note(72, 1920, 480),
        ];
        let range = MelodicInversion {
            enabled: true,
            start_measure: 1,
            end_measure: 1,
        };
        let out = melodic_inversion(&notes, &range, PPQ, four_four());
        // anchor is C4 (lowest at the first onset)
        assert_eq!(pitches(&out), vec![56, 60, 53, 72]);

        let stats = inversion_stats(&notes, &range, PPQ, four_four()).unwrap();
        assert_eq!(stats.total_notes, 3);
        assert_eq!(stats.anchor_note_name, "C4");
        assert!(stats.has_polyphony);
        assert_eq!((stats.range_start_tick, stats.range_end_tick), (0, 1920));
    }

    #[test]
    fn modal_remap_major_to_minor_third() {
        let mut conversion = ModalConversion {
            enabled: true,
            root: 2,
            ..ModalConversion::default()
        };
        conversion.mappings[4] = 3;
        // F#4 is the major third above D
        let out = modal_remap(&[make_note(66, 0, 1), make_note(62, 0, 1)], &conversion);
        assert_eq!(pitches(&out), vec![65, 62]);
    }

    #[test]
    fn crop_rebases_and_clips() {
        let notes = vec![
            make_note(60, 1800, 240),
            make_note(62, 1920, 480),
            make_note(64, 4000, 480),
            make_note(65, 100, 100),
        ];
        let range = ExportRange {
            enabled: true,
            start_measure: 2,
            end_measure: 2,
        };
        let out = crop_to_range(&notes, &range, PPQ, four_four());
        let summary: Vec<(u8, u64, u64)> = out
            .iter()
            .map(|n| (n.pitch, n.onset_tick, n.duration_ticks))
            .collect();
        assert_eq!(summary, vec![(60, 0, 120), (62, 0, 480)]);
    }

    #[test]
    fn range_validation() {
        assert!(ExportRange::default().validate().is_ok());
        let bad = MelodicInversion {
            enabled: true,
            start_measure: 5,
            end_measure: 2,
        };
        assert!(matches!(
            bad.validate(),
            Err(Error::InvalidRange { start: 5, end: 2 })
        ));
    }
}
