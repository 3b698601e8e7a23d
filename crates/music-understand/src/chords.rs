//! Chord segmentation: four ways of slicing a note list into simultaneous
//! pitch sets, each identified against the shape catalogue.
//!
//! Every strategy first moves ornament notes onto their principal's onset so
//! decoration doesn't fragment the harmony.

use std::collections::BTreeMap;

use midi_analysis::{Note, TrackContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chord_templates::identify_chord;
use crate::types::{ChordEvent, ChordIdentification, ChordProgressions};

/// Beats per bucket for harmonic rhythm normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketSize {
    #[default]
    OneBeat,
    TwoBeats,
    FourBeats,
}

impl BucketSize {
    pub fn beats(self) -> u32 {
        match self {
            BucketSize::OneBeat => 1,
            BucketSize::TwoBeats => 2,
            BucketSize::FourBeats => 4,
        }
    }
}

/// How one separated voice contributes to hybrid detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceChordMode {
    /// Notes sound for their full length
    #[default]
    Sustain,
    /// Notes are cut to a short stab at their onset
    Attack,
    /// Broken-chord tones are held to the end of their arpeggio window
    Arpeggio,
    Ignore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArpeggioWindow {
    #[default]
    OneBeat,
    TwoBeats,
}

impl ArpeggioWindow {
    fn beats(self) -> u32 {
        match self {
            ArpeggioWindow::OneBeat => 1,
            ArpeggioWindow::TwoBeats => 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridParams {
    /// Mode per voice index; voices past the end (and untagged notes) use Sustain
    pub voice_modes: Vec<VoiceChordMode>,
    pub arpeggio_window: ArpeggioWindow,
    pub min_duration_ticks: u64,
}

impl HybridParams {
    fn mode_for(&self, voice: Option<usize>) -> VoiceChordMode {
        voice
            .and_then(|v| self.voice_modes.get(v).copied())
            .unwrap_or_default()
    }
}

/// Settings for all four strategies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordDetectionParams {
    /// Notes shorter than this are ignored by the sustain and attack strategies
    pub min_duration_ticks: u64,
    /// Attack grouping window; 0 uses a third of a quarter note
    pub attack_tolerance_ticks: u64,
    pub bucket: BucketSize,
    pub hybrid: HybridParams,
}

fn prepare(notes: &[Note]) -> Vec<Note> {
    notes
        .iter()
        .map(|n| Note {
            onset_tick: n.harmonic_onset_tick(),
            ..n.clone()
        })
        .collect()
}

fn unique_names<'a>(notes: impl IntoIterator<Item = &'a Note>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for note in notes {
        let name = note.name();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn make_event(
    context: &TrackContext,
    tick: u64,
    constituent_note_names: Vec<String>,
    identification: ChordIdentification,
) -> ChordEvent {
    let ppq = context.effective_ppq();
    ChordEvent {
        onset_tick: tick,
        beat_position: tick as f64 / ppq as f64,
        measure: context.time_signature.measure_at(tick, ppq),
        formatted_time: context.format_time(tick),
        chord: identification.best,
        constituent_note_names,
        alternatives: identification.alternatives,
    }
}

/// Append unless it repeats the previous chord within the same measure.
fn push_deduped(events: &mut Vec<ChordEvent>, event: ChordEvent) {
    let repeated = events
        .last()
        .is_some_and(|last| last.chord.name == event.chord.name && last.measure == event.measure);
    if !repeated {
        events.push(event);
    }
}

/// Identify whatever is sounding at every onset and release.
///
/// Notes shorter than `min_duration_ticks` are ignored. A chord needs at
/// least two sounding notes.
pub fn detect_chords_sustain(notes: &[Note], context: &TrackContext, min_duration_ticks: u64) -> Vec<ChordEvent> {
    let valid: Vec<Note> = prepare(notes)
        .into_iter()
        .filter(|n| n.duration_ticks >= min_duration_ticks)
        .collect();

    let mut points: Vec<u64> = valid
        .iter()
        .flat_map(|n| [n.onset_tick, n.offset_tick()])
        .collect();
    points.sort_unstable();
    points.dedup();

    let mut by_onset: Vec<usize> = (0..valid.len()).collect();
    by_onset.sort_by_key(|&i| valid[i].onset_tick);
    let mut next = 0;
    let mut sounding: Vec<usize> = Vec::new();

    let mut events = Vec::new();
    // the last breakpoint is always a release with nothing after it
    for &t in points.iter().take(points.len().saturating_sub(1)) {
        while next < by_onset.len() && valid[by_onset[next]].onset_tick <= t {
            sounding.push(by_onset[next]);
            next += 1;
        }
        sounding.retain(|&i| valid[i].offset_tick() > t);
        if sounding.len() < 2 {
            continue;
        }

        // input order, independent of how the sweep found them
        let mut active = sounding.clone();
        active.sort_unstable();
        let pitches: Vec<u8> = active.iter().map(|&i| valid[i].pitch).collect();
        let Some(identification) = identify_chord(&pitches) else {
            continue;
        };
        let names = unique_names(active.iter().map(|&i| &valid[i]));
        push_deduped(&mut events, make_event(context, t, names, identification));
    }
    events
}

/// Group notes struck together: a group takes every note whose onset falls
/// within the tolerance window of the group's first onset.
pub fn detect_chords_attack(
    notes: &[Note],
    context: &TrackContext,
    tolerance_ticks: u64,
    min_duration_ticks: u64,
) -> Vec<ChordEvent> {
    let mut sorted: Vec<Note> = prepare(notes)
        .into_iter()
        .filter(|n| n.duration_ticks >= min_duration_ticks)
        .collect();
    sorted.sort_by_key(|n| n.onset_tick);

    let ppq = context.effective_ppq() as u64;
    let window = (if tolerance_ticks > 0 { tolerance_ticks } else { ppq / 3 }).max(1);

    let mut events = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let start = sorted[i].onset_tick;
        let end = sorted[i..]
            .iter()
            .position(|n| n.onset_tick - start >= window)
            .map_or(sorted.len(), |offset| i + offset);

        let mut group: Vec<&Note> = Vec::new();
        for note in &sorted[i..end] {
            if !group.iter().any(|g| g.pitch == note.pitch) {
                group.push(note);
            }
        }
        i = end;

        if group.len() < 2 {
            continue;
        }
        let pitches: Vec<u8> = group.iter().map(|n| n.pitch).collect();
        if let Some(identification) = identify_chord(&pitches) {
            let names = unique_names(group.iter().copied());
            push_deduped(&mut events, make_event(context, start, names, identification));
        }
    }
    events
}

/// One chord per fixed-size bucket of beats, from the union of onsets in it.
///
/// Smooths over fast decorative motion; consecutive repeats are kept.
pub fn detect_chords_bucketed(notes: &[Note], context: &TrackContext, bucket: BucketSize) -> Vec<ChordEvent> {
    let ppq = context.effective_ppq();
    let bucket_ticks = context.time_signature.ticks_per_beat(ppq) * bucket.beats() as f64;
    if bucket_ticks <= 0.0 {
        return Vec::new();
    }

    let mut buckets: BTreeMap<u64, Vec<Note>> = BTreeMap::new();
    for note in prepare(notes) {
        let index = (note.onset_tick as f64 / bucket_ticks).floor() as u64;
        buckets.entry(index).or_default().push(note);
    }

    let mut events = Vec::new();
    for (index, members) in &buckets {
        let mut unique: Vec<&Note> = Vec::new();
        for note in members {
            if !unique.iter().any(|u| u.pitch == note.pitch) {
                unique.push(note);
            }
        }
        if unique.len() < 2 {
            continue;
        }
        let pitches: Vec<u8> = unique.iter().map(|n| n.pitch).collect();
        if let Some(identification) = identify_chord(&pitches) {
            let start = (*index as f64 * bucket_ticks).round() as u64;
            let names = unique_names(unique.iter().copied());
            events.push(make_event(context, start, names, identification));
        }
    }
    events
}

/// Reshape each voice by its mode, merge the survivors and run the sustain strategy.
///
/// Notes need a `voice_index` from voice separation; untagged notes are
/// treated as one extra sustain voice.
pub fn detect_chords_hybrid(notes: &[Note], context: &TrackContext, params: &HybridParams) -> Vec<ChordEvent> {
    let ppq = context.effective_ppq();
    let stab = (ppq as u64 / 8).max(1);
    let arpeggio_ticks = context.time_signature.ticks_per_beat(ppq) * params.arpeggio_window.beats() as f64;

    let mut voices: BTreeMap<Option<usize>, Vec<Note>> = BTreeMap::new();
    for note in prepare(notes) {
        voices.entry(note.voice_index).or_default().push(note);
    }

    let mut merged = Vec::new();
    for (voice, mut members) in voices {
        let mode = params.mode_for(voice);
        if mode == VoiceChordMode::Ignore {
            continue;
        }
        members.sort_by_key(|n| n.onset_tick);
        for mut note in members {
            if note.duration_ticks < params.min_duration_ticks {
                continue;
            }
            match mode {
                VoiceChordMode::Attack => note.duration_ticks = note.duration_ticks.min(stab),
                VoiceChordMode::Arpeggio if arpeggio_ticks > 0.0 => {
                    let window = (note.onset_tick as f64 / arpeggio_ticks).floor() + 1.0;
                    let window_end = (window * arpeggio_ticks).round() as u64;
                    note.duration_ticks = note
                        .duration_ticks
                        .max(window_end.saturating_sub(note.onset_tick));
                }
                _ => {}
            }
            merged.push(note);
        }
    }

    debug!(notes = merged.len(), "hybrid chord detection");
    detect_chords_sustain(&merged, context, 0)
}

/// Run all four strategies over the same notes.
pub fn detect_all(notes: &[Note], context: &TrackContext, params: &ChordDetectionParams) -> ChordProgressions {
    ChordProgressions {
        sustain: detect_chords_sustain(notes, context, params.min_duration_ticks),
        attack: detect_chords_attack(
            notes,
            context,
            params.attack_tolerance_ticks,
            params.min_duration_ticks,
        ),
        bucketed: detect_chords_bucketed(notes, context, params.bucket),
        hybrid: detect_chords_hybrid(notes, context, &params.hybrid),
    }
}
