use crate::context::TrackContext;
use crate::note::{sort_by_onset, Note, SeparatedVoice, VoiceStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Pitch used to score a voice that has no notes near the candidate yet.
const MIDDLE_C: u8 = 60;

/// Parameters controlling voice separation behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparationParams {
    /// Never let a voice sound two notes at once. Notes that fit no voice are dropped.
    #[serde(default)]
    pub strict_monophony: bool,
    /// Upper bound on the voice count. None lets texture density decide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_voices: Option<usize>,
}

/// Choral-style name for voice `index` out of `total`.
pub fn voice_label(index: usize, total: usize) -> String {
    let named: &[&str] = match total {
        1 => &["Melody"],
        2 => &["Soprano", "Bass"],
        3 => &["Soprano", "Tenor", "Bass"],
        4 => &["Soprano", "Alto", "Tenor", "Bass"],
        _ => &[],
    };
    match named.get(index) {
        Some(name) => name.to_string(),
        None => format!("Voice {}", index + 1),
    }
}

/// Interval between two adjacent breakpoints and the notes sounding at its midpoint.
struct Slice {
    start: u64,
    end: u64,
    active: Vec<usize>,
}

/// A run of slices at or above some density.
struct DensityArea {
    start: u64,
    end: u64,
    slices: Vec<usize>,
}

/// Split a polyphonic stream into voices justified by sustained texture density.
///
/// The voice count is the highest simultaneous-note density that persists for
/// at least a measure (or a fifth of the piece). Notes inside those dense
/// regions are dealt top-down, highest pitch to voice 0; every other note
/// joins the voice whose neighbouring pitches are closest.
///
/// Each returned voice is onset-ordered and its notes carry `voice_index`.
pub fn separate_voices(
    notes: &[Note],
    context: &TrackContext,
    params: &SeparationParams,
) -> Vec<SeparatedVoice> {
    if notes.is_empty() {
        return Vec::new();
    }

    let mut sorted = notes.to_vec();
    sort_by_onset(&mut sorted);

    let slices = build_slices(&sorted);
    let max_density = slices.iter().map(|s| s.active.len()).max().unwrap_or(0);
    if max_density == 0 {
        return vec![finish_voice(0, 1, sorted)];
    }

    let ppq = context.effective_ppq();
    let measure_ticks = context.ticks_per_measure();
    let eighth_gap = ppq as u64 / 2;
    let first = slices.first().map(|s| s.start).unwrap_or(0);
    let last = slices.last().map(|s| s.end).unwrap_or(0);
    let total_ticks = last.saturating_sub(first) as f64;

    let is_sustained = |area: &DensityArea| {
        let len = (area.end - area.start) as f64;
        len >= measure_ticks || len >= total_ticks / 5.0
    };

    let mut polyphony = 0;
    let mut sustained = Vec::new();
    for density in (1..=max_density).rev() {
        let areas: Vec<DensityArea> = find_areas(&slices, density, eighth_gap)
            .into_iter()
            .filter(|a| is_sustained(a))
            .collect();
        if !areas.is_empty() {
            polyphony = density;
            sustained = areas;
            break;
        }
    }
    if polyphony == 0 {
        polyphony = max_density.saturating_sub(1).max(1);
    }
    if let Some(cap) = params.max_voices.filter(|&cap| cap > 0) {
        polyphony = polyphony.min(cap);
    }

    debug!(
        notes = sorted.len(),
        max_density,
        voices = polyphony,
        sustained_areas = sustained.len(),
        "voice polyphony decided"
    );

    let mut voices: Vec<Vec<usize>> = vec![Vec::new(); polyphony];
    let mut assigned = vec![false; sorted.len()];

    // pass 1: deal dense slices top-down
    for area in &sustained {
        for &slice_idx in &area.slices {
            let mut unassigned: Vec<usize> = slices[slice_idx]
                .active
                .iter()
                .copied()
                .filter(|&i| !assigned[i])
                .collect();
            unassigned.sort_by(|&a, &b| sorted[b].pitch.cmp(&sorted[a].pitch));

            for (voice, note_idx) in voices.iter_mut().zip(unassigned) {
                voice.push(note_idx);
                assigned[note_idx] = true;
            }
        }
    }

    // pass 2: attach the rest by pitch proximity
    let mut dropped = 0usize;
    for idx in 0..sorted.len() {
        if assigned[idx] {
            continue;
        }
        match best_voice(&sorted, &voices, idx, params.strict_monophony) {
            Some(v) => {
                voices[v].push(idx);
                assigned[idx] = true;
            }
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!(dropped, "notes dropped under strict monophony");
    }

    let total = voices.len();
    voices
        .into_iter()
        .enumerate()
        .map(|(v, indices)| {
            let mut voice_notes: Vec<Note> = indices.into_iter().map(|i| sorted[i].clone()).collect();
            sort_by_onset(&mut voice_notes);
            finish_voice(v, total, voice_notes)
        })
        .collect()
}

/// Separate and flatten back into one onset-ordered list with `voice_index` set.
pub fn tag_voices(notes: &[Note], context: &TrackContext, params: &SeparationParams) -> Vec<Note> {
    let mut tagged: Vec<Note> = separate_voices(notes, context, params)
        .into_iter()
        .flat_map(|v| v.notes)
        .collect();
    sort_by_onset(&mut tagged);
    tagged
}

fn finish_voice(voice_index: usize, total: usize, mut notes: Vec<Note>) -> SeparatedVoice {
    for note in &mut notes {
        note.voice_index = Some(voice_index);
    }
    let stats = VoiceStats::from_notes(&notes);
    SeparatedVoice {
        voice_index,
        label: voice_label(voice_index, total),
        notes,
        stats,
    }
}

/// Cut the timeline at every onset and offset. `sorted` must be in onset order.
///
/// Single sweep: notes join the sounding set as the cursor passes their onset
/// and leave once they end, so `active` stays in ascending index order.
fn build_slices(sorted: &[Note]) -> Vec<Slice> {
    let breakpoints: Vec<u64> = sorted
        .iter()
        .flat_map(|n| [n.onset_tick, n.offset_tick()])
        .collect::<BTreeSet<u64>>()
        .into_iter()
        .collect();

    let mut slices = Vec::with_capacity(breakpoints.len().saturating_sub(1));
    let mut cursor = 0;
    let mut sounding: Vec<usize> = Vec::new();
    for w in breakpoints.windows(2) {
        let (start, end) = (w[0], w[1]);
        while cursor < sorted.len() && sorted[cursor].onset_tick <= start {
            sounding.push(cursor);
            cursor += 1;
        }
        // no breakpoint lies inside (start, end): a note either covers the slice or is over
        sounding.retain(|&i| sorted[i].offset_tick() >= end);
        slices.push(Slice {
            start,
            end,
            active: sounding.clone(),
        });
    }
    slices
}

fn find_areas(slices: &[Slice], density: usize, max_gap: u64) -> Vec<DensityArea> {
    let mut areas = Vec::new();
    let mut current: Option<DensityArea> = None;

    for (idx, slice) in slices.iter().enumerate() {
        if slice.active.len() < density {
            continue;
        }
        if let Some(area) = current.as_mut() {
            if slice.start.saturating_sub(area.end) <= max_gap {
                area.end = slice.end;
                area.slices.push(idx);
                continue;
            }
        }
        if let Some(done) = current.take() {
            areas.push(done);
        }
        current = Some(DensityArea {
            start: slice.start,
            end: slice.end,
            slices: vec![idx],
        });
    }
    if let Some(done) = current {
        areas.push(done);
    }
    areas
}

/// Lowest-cost voice for `sorted[idx]`, or None when strict monophony rules
/// out every voice.
fn best_voice(sorted: &[Note], voices: &[Vec<usize>], idx: usize, strict: bool) -> Option<usize> {
    let note = &sorted[idx];
    let mut best: Option<(usize, u32)> = None;

    for (v, members) in voices.iter().enumerate() {
        if strict && members.iter().any(|&m| sorted[m].overlaps(note)) {
            continue;
        }

        let mut prev: Option<&Note> = None;
        let mut next: Option<&Note> = None;
        for &m in members {
            let other = &sorted[m];
            if other.onset_tick < note.onset_tick {
                if prev.map_or(true, |p| other.onset_tick > p.onset_tick) {
                    prev = Some(other);
                }
            } else if other.onset_tick > note.onset_tick
                && next.map_or(true, |n| other.onset_tick < n.onset_tick)
            {
                next = Some(other);
            }
        }

        let distance = |other: &Note| other.pitch.abs_diff(note.pitch) as u32;
        let cost = match (prev, next) {
            (None, None) => MIDDLE_C.abs_diff(note.pitch) as u32,
            _ => prev.map_or(0, distance) + next.map_or(0, distance),
        };

        if best.map_or(true, |(_, lowest)| cost < lowest) {
            best = Some((v, cost));
        }
    }

    match best {
        Some((v, _)) => Some(v),
        None if strict => None,
        None => Some(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TimeSignature;
    use pretty_assertions::assert_eq;

    fn make_note(pitch: u8, onset: u64, duration: u64) -> Note {
        Note::new(pitch, onset, duration, 0.8)
    }

    fn ctx() -> TrackContext {
        TrackContext::new(480, 120.0, TimeSignature::new(4, 4))
    }

    #[test]
    fn empty_input() {
        let voices = separate_voices(&[], &ctx(), &SeparationParams::default());
        assert!(voices.is_empty());
    }

    #[test]
    fn monophonic_stays_one_voice() {
        let notes: Vec<Note> = (0..8)
            .map(|i| make_note(60 + (i % 5) as u8, i * 480, 480))
            .collect();
        let voices = separate_voices(&notes, &ctx(), &SeparationParams::default());

        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].label, "Melody");
        let stripped: Vec<Note> = voices[0]
            .notes
            .iter()
            .map(|n| Note {
                voice_index: None,
                ..n.clone()
            })
            .collect();
        assert_eq!(stripped, notes);
        assert!(voices[0].notes.iter().all(|n| n.voice_index == Some(0)));
    }

    #[test]
    fn sustained_two_part_texture() {
        let mut notes: Vec<Note> = (0..8)
            .map(|i| make_note(72 + (i % 3) as u8, i * 480, 480))
            .collect();
        notes.push(make_note(48, 0, 1920));
        notes.push(make_note(43, 1920, 1920));

        let voices = separate_voices(&notes, &ctx(), &SeparationParams::default());
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].label, "Soprano");
        assert_eq!(voices[1].label, "Bass");
        assert_eq!(voices[0].notes.len(), 8);
        assert!(voices[0].notes.iter().all(|n| n.pitch >= 72));
        let bass: Vec<u8> = voices[1].notes.iter().map(|n| n.pitch).collect();
        assert_eq!(bass, vec![48, 43]);
    }

    #[test]
    fn brief_chord_does_not_add_voices() {
        let mut notes: Vec<Note> = (0..16).map(|i| make_note(72, i * 480, 480)).collect();
        notes.push(make_note(64, 0, 120));
        notes.push(make_note(60, 0, 120));

        let voices = separate_voices(&notes, &ctx(), &SeparationParams::default());
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].notes.len(), 18);
    }

    #[test]
    fn strict_monophony_drops_chord_tones() {
        let mut notes: Vec<Note> = (0..16).map(|i| make_note(72, i * 480, 480)).collect();
        notes.push(make_note(64, 0, 120));
        notes.push(make_note(60, 0, 120));

        let params = SeparationParams {
            strict_monophony: true,
            max_voices: None,
        };
        let voices = separate_voices(&notes, &ctx(), &params);
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].notes.len(), 16);
        assert!(voices[0].notes.iter().all(|n| n.pitch == 72));
    }

    #[test]
    fn four_part_chorale_capped() {
        let mut notes = Vec::new();
        for bar in 0..2u64 {
            for (i, pitch) in [76u8, 67, 60, 48].iter().enumerate() {
                notes.push(make_note(pitch - bar as u8 * (i as u8 % 2), bar * 1920, 1920));
            }
        }

        let voices = separate_voices(&notes, &ctx(), &SeparationParams::default());
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[1].label, "Alto");
        assert_eq!(voices[3].notes[0].pitch, 48);

        let capped = SeparationParams {
            strict_monophony: false,
            max_voices: Some(2),
        };
        let voices = separate_voices(&notes, &ctx(), &capped);
        assert_eq!(voices.len(), 2);
        let total: usize = voices.iter().map(|v| v.notes.len()).sum();
        assert_eq!(total, notes.len());
    }

    #[test]
    fn zero_length_notes_form_one_voice() {
        let notes = vec![make_note(60, 0, 0), make_note(64, 0, 0)];
        let voices = separate_voices(&notes, &ctx(), &SeparationParams::default());
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].notes.len(), 2);
    }

    #[test]
    fn tagged_voices_flatten_in_onset_order() {
        let mut notes: Vec<Note> = (0..4).map(|i| make_note(72, i * 480, 480)).collect();
        notes.push(make_note(48, 0, 1920));
        let tagged = tag_voices(&notes, &ctx(), &SeparationParams::default());
        assert_eq!(tagged.len(), 5);
        assert!(tagged.windows(2).all(|w| w[0].onset_tick <= w[1].onset_tick));
        assert!(tagged.iter().all(|n| n.voice_index.is_some()));
    }

    #[test]
    fn sweep_matches_midpoint_scan() {
        let mut sorted = vec![
            make_note(60, 0, 960),
            make_note(64, 0, 0),
            make_note(67, 240, 240),
            make_note(72, 480, 960),
            make_note(48, 480, 0),
            make_note(55, 1440, 10),
            make_note(62, 2000, 100),
        ];
        sort_by_onset(&mut sorted);

        let slices = build_slices(&sorted);
        assert!(slices.iter().any(|s| s.active.is_empty()));
        for slice in &slices {
            let mid2 = slice.start + slice.end;
            let expected: Vec<usize> = sorted
                .iter()
                .enumerate()
                .filter(|(_, n)| 2 * n.onset_tick <= mid2 && 2 * n.offset_tick() > mid2)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(slice.active, expected, "slice {}..{}", slice.start, slice.end);
        }
    }

    #[test]
    fn labels() {
        assert_eq!(voice_label(0, 1), "Melody");
        assert_eq!(voice_label(1, 2), "Bass");
        assert_eq!(voice_label(1, 3), "Tenor");
        assert_eq!(voice_label(2, 4), "Tenor");
        assert_eq!(voice_label(4, 6), "Voice 5");
    }
}
