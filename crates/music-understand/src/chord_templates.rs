use midi_analysis::NOTE_NAMES;

use crate::types::{ChordIdentification, ChordMatch};

/// Interval of the perfect fifth above the root.
const FIFTH: u8 = 7;

/// Runners-up kept next to the best reading.
const MAX_ALTERNATIVES: usize = 5;

/// A chord shape: intervals from the root, in the order missing tones are reported,
/// plus the same set as a bitmask over 12 pitch classes.
pub struct ChordShape {
    pub name: &'static str,
    pub intervals: &'static [u8],
    pub mask: u16, // bit i set means interval i is in the shape
    pub allow_omitted_fifth: bool,
}

impl ChordShape {
    const fn new(name: &'static str, intervals: &'static [u8], allow_omitted_fifth: bool) -> Self {
        let mut mask = 0u16;
        let mut i = 0;
        while i < intervals.len() {
            mask |= 1 << intervals[i];
            i += 1;
        }
        Self {
            name,
            intervals,
            mask,
            allow_omitted_fifth,
        }
    }

    fn contains(&self, interval: u8) -> bool {
        self.mask & (1 << interval) != 0
    }
}

/// Recognized shapes, extended chords first. Ties between equal scores keep this order.
pub static CHORD_SHAPES: &[ChordShape] = &[
    ChordShape::new("13", &[0, 4, 7, 10, 2, 5, 9], true),
    ChordShape::new("11", &[0, 4, 7, 10, 2, 5], true),
    ChordShape::new("Maj9", &[0, 4, 7, 11, 2], true),
    ChordShape::new("m9", &[0, 3, 7, 10, 2], true),
    ChordShape::new("9", &[0, 4, 7, 10, 2], true),
    ChordShape::new("add9", &[0, 4, 7, 2], true),
    ChordShape::new("Maj7", &[0, 4, 7, 11], true),
    ChordShape::new("m7", &[0, 3, 7, 10], true),
    ChordShape::new("7", &[0, 4, 7, 10], true),
    ChordShape::new("6", &[0, 4, 7, 9], true),
    ChordShape::new("m6", &[0, 3, 7, 9], true),
    ChordShape::new("mM7", &[0, 3, 7, 11], true),
    ChordShape::new("m7b5", &[0, 3, 6, 10], false),
    ChordShape::new("aug7", &[0, 4, 8, 10], false),
    ChordShape::new("Dim7", &[0, 3, 6, 9], false),
    ChordShape::new("Aug", &[0, 4, 8], false),
    ChordShape::new("Dim", &[0, 3, 6], false),
    ChordShape::new("sus4", &[0, 5, 7], true),
    ChordShape::new("sus2", &[0, 2, 7], true),
    // Dyad
    ChordShape::new("5", &[0, 7], false),
    ChordShape::new("Maj", &[0, 4, 7], true),
    ChordShape::new("Min", &[0, 3, 7], true),
];

/// Interval bitmask of `pitch_classes` relative to `root`.
fn to_interval_mask(pitch_classes: &[u8], root: u8) -> u16 {
    let mut mask = 0u16;
    for &pc in pitch_classes {
        let interval = (pc + 12 - root) % 12;
        mask |= 1 << interval;
    }
    mask
}

/// Score one shape on one candidate root.
///
/// The shape matches when every interval is present, or when only the fifth
/// is absent and the shape tolerates that.
fn score_shape(shape: &ChordShape, root: u8, bass: u8, present: u16) -> Option<ChordMatch> {
    let missing: Vec<u8> = shape
        .intervals
        .iter()
        .copied()
        .filter(|&i| present & (1 << i) == 0)
        .collect();
    let omitted_fifth = missing.len() == 1 && missing[0] == FIFTH && shape.allow_omitted_fifth;
    if !missing.is_empty() && !omitted_fifth {
        return None;
    }

    let extra = (0..12u8)
        .filter(|&i| present & (1 << i) != 0 && !shape.contains(i))
        .count() as i32;
    let matched = (shape.intervals.len() - missing.len()) as i32;
    let mut score = matched * 10 - extra * 20 - missing.len() as i32 * 5;

    let root_name = NOTE_NAMES[root as usize];
    let (name, bass_pitch_class) = if root == bass {
        // root-position bonus
        score += 1;
        (format!("{} {}", root_name, shape.name), None)
    } else {
        (
            format!("{} {}/{}", root_name, shape.name, NOTE_NAMES[bass as usize]),
            Some(bass),
        )
    };

    let missing_pitch_classes: Vec<u8> = missing.iter().map(|&i| (root + i) % 12).collect();
    Some(ChordMatch {
        name,
        root_pitch_class: root,
        root: root_name.to_string(),
        quality: shape.name.to_string(),
        bass_pitch_class,
        bass: bass_pitch_class.map(|b| NOTE_NAMES[b as usize].to_string()),
        score,
        missing_notes: missing_pitch_classes
            .iter()
            .map(|&pc| NOTE_NAMES[pc as usize].to_string())
            .collect(),
        missing_pitch_classes,
    })
}

/// Identify the chord formed by simultaneous MIDI pitches.
///
/// Every distinct pitch class is tried as a root against every shape. Returns
/// `None` for fewer than two pitches or when no shape matches any root.
pub fn identify_chord(pitches: &[u8]) -> Option<ChordIdentification> {
    if pitches.len() < 2 {
        return None;
    }
    let bass = pitches.iter().copied().min()? % 12;

    let mut roots: Vec<u8> = pitches.iter().map(|p| p % 12).collect();
    roots.sort_unstable();
    roots.dedup();

    let mut candidates: Vec<ChordMatch> = Vec::new();
    for &root in &roots {
        let present = to_interval_mask(&roots, root);
        candidates.extend(
            CHORD_SHAPES
                .iter()
                .filter_map(|shape| score_shape(shape, root, bass, present)),
        );
    }

    // stable: equal scores keep root then catalogue order
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    let mut ranked = candidates.into_iter();
    let best = ranked.next()?;
    Some(ChordIdentification {
        best,
        alternatives: ranked.take(MAX_ALTERNATIVES).collect(),
    })
}
