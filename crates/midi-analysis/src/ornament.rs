//! Ornament detection: trills, turns, mordents and grace notes.
//!
//! A chain of rapid notes (each shorter than an eighth-note triplet) that
//! runs straight into a longer note is checked against the known ornament
//! contours. Matching chains are tagged and linked to that
//! longer "principal" note so harmonic analysis can treat them as part of it.

use crate::note::{sort_by_onset, Note};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Largest interval, in semitones, between an ornament note and its principal.
const NEIGHBOR_SEMITONES: i16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrnamentKind {
    Trill,
    Turn,
    Mordent,
    GraceNote,
}

impl OrnamentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrnamentKind::Trill => "trill",
            OrnamentKind::Turn => "turn",
            OrnamentKind::Mordent => "mordent",
            OrnamentKind::GraceNote => "grace_note",
        }
    }
}

/// A recognised ornament and the note it decorates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrnamentGroup {
    pub kind: OrnamentKind,
    pub principal_pitch: u8,
    pub principal_onset_tick: u64,
    pub chain_onset_tick: u64,
    pub chain_len: usize,
}

struct ChainMatch {
    kind: OrnamentKind,
    chain: Range<usize>,
    principal: usize,
}

/// Copies of `notes` with every ornament flag and principal link removed.
pub fn clear_ornament_tags(notes: &[Note]) -> Vec<Note> {
    notes
        .iter()
        .map(|n| Note {
            is_ornament: false,
            principal_pitch: None,
            principal_onset_tick: None,
            ..n.clone()
        })
        .collect()
}

/// Tag ornament chains and their principals.
///
/// Returns a new onset-sorted list with the same notes as the input. Tags
/// already on the input are discarded first. Chain notes get `is_ornament`
/// plus the principal link; the principal itself is flagged `is_ornament` but
/// keeps no link.
pub fn tag_ornaments(notes: &[Note], ppq: u16) -> Vec<Note> {
    let mut sorted = clear_ornament_tags(notes);
    sort_by_onset(&mut sorted);

    for found in scan(&sorted, ppq) {
        let principal_pitch = sorted[found.principal].pitch;
        let principal_onset = sorted[found.principal].onset_tick;
        for note in &mut sorted[found.chain] {
            note.is_ornament = true;
            note.principal_pitch = Some(principal_pitch);
            note.principal_onset_tick = Some(principal_onset);
        }
        sorted[found.principal].is_ornament = true;
    }

    // chain and principal are contiguous in onset order, so the scan order is
    // already the output order
    sorted
}

/// Describe every ornament found without modifying the notes.
pub fn find_ornaments(notes: &[Note], ppq: u16) -> Vec<OrnamentGroup> {
    let mut sorted = notes.to_vec();
    sort_by_onset(&mut sorted);

    scan(&sorted, ppq)
        .into_iter()
        .map(|found| {
            let principal = &sorted[found.principal];
            OrnamentGroup {
                kind: found.kind,
                principal_pitch: principal.pitch,
                principal_onset_tick: principal.onset_tick,
                chain_onset_tick: sorted[found.chain.start].onset_tick,
                chain_len: found.chain.len(),
            }
        })
        .collect()
}

/// Number of notes `tag_ornaments` would flag: every chain note plus its principal.
pub fn ornament_count(notes: &[Note], ppq: u16) -> usize {
    find_ornaments(notes, ppq).iter().map(|g| g.chain_len + 1).sum()
}

fn scan(sorted: &[Note], ppq: u16) -> Vec<ChainMatch> {
    let max_chain_duration = ppq as f64 / 3.0;
    let max_gap = ppq as f64 / 16.0;

    let gap = |prev: &Note, next: &Note| next.onset_tick as f64 - prev.offset_tick() as f64;

    let mut found = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j < sorted.len() && (sorted[j].duration_ticks as f64) < max_chain_duration {
            if j > i && gap(&sorted[j - 1], &sorted[j]) > max_gap {
                break;
            }
            j += 1;
        }

        if j > i && j < sorted.len() && gap(&sorted[j - 1], &sorted[j]) <= max_gap {
            if let Some(kind) = classify(&sorted[i..j], &sorted[j]) {
                found.push(ChainMatch {
                    kind,
                    chain: i..j,
                    principal: j,
                });
                i = j + 1;
                continue;
            }
        }

        i += 1;
    }
    found
}

/// Match a chain against the ornament contours, in priority order.
fn classify(chain: &[Note], principal: &Note) -> Option<OrnamentKind> {
    let p = principal.pitch as i16;
    let pitch = |n: &Note| n.pitch as i16;
    let near = |n: &Note| (pitch(n) - p).abs() <= NEIGHBOR_SEMITONES;

    if chain.len() >= 3 {
        let neighbor = pitch(&chain[0]);
        if neighbor != p && (neighbor - p).abs() <= NEIGHBOR_SEMITONES {
            let alternates = chain.iter().enumerate().all(|(k, n)| {
                let expected = if k % 2 == 0 { neighbor } else { p };
                pitch(n) == expected
            });
            if alternates {
                return Some(OrnamentKind::Trill);
            }
        }
    }

    if let [first, middle, last] = chain {
        let upper_turn = pitch(first) > p && pitch(middle) == p && pitch(last) < p;
        let lower_turn = pitch(first) < p && pitch(middle) == p && pitch(last) > p;
        if (upper_turn || lower_turn) && near(first) && near(last) {
            return Some(OrnamentKind::Turn);
        }
    }

    if let [first, second] = chain {
        if pitch(first) == p && pitch(second) != p && near(second) {
            return Some(OrnamentKind::Mordent);
        }
    }

    if let [grace] = chain {
        if near(grace) && grace.duration_ticks as f64 <= principal.duration_ticks as f64 / 4.0 {
            return Some(OrnamentKind::GraceNote);
        }
    }

    None
}
