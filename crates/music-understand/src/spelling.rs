//! Enharmonic spelling of a key: which staff letter and accidental each
//! scale tone gets, and how a MIDI pitch renders as an ABC token.

use std::collections::BTreeMap;

use midi_analysis::NOTE_NAMES;
use serde::{Deserialize, Serialize};

use crate::modes::{find_mode, Mode, CHROMATIC, STANDARD_MODES};

const FALLBACK_SHARP: [&str; 12] = [
    "C", "^C", "D", "^D", "E", "F", "^F", "G", "^G", "A", "^A", "B",
];
const FALLBACK_FLAT: [&str; 12] = [
    "C", "_D", "D", "_E", "E", "F", "_G", "G", "_A", "A", "_B", "B",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellingPreference {
    /// Follow the canonical chromatic name of the root
    #[default]
    Auto,
    Sharp,
    Flat,
}

impl std::str::FromStr for SpellingPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sharp" | "sharps" => Ok(Self::Sharp),
            "flat" | "flats" => Ok(Self::Flat),
            other => Err(format!("unknown spelling preference: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    const ALL: [Letter; 7] = [
        Letter::C,
        Letter::D,
        Letter::E,
        Letter::F,
        Letter::G,
        Letter::A,
        Letter::B,
    ];

    fn from_index(index: usize) -> Self {
        Self::ALL[index % 7]
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Pitch class of the unaltered letter.
    pub fn natural_pitch_class(self) -> u8 {
        [0, 2, 4, 5, 7, 9, 11][self.index()]
    }

    pub fn as_char(self) -> char {
        ['C', 'D', 'E', 'F', 'G', 'A', 'B'][self.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accidental {
    DoubleFlat,
    Flat,
    Natural,
    Sharp,
    DoubleSharp,
}

impl Accidental {
    /// Accidental for a signed distance from the natural letter; anything
    /// beyond a double alteration is left natural.
    fn from_semitones(diff: i32) -> Self {
        match diff {
            -2 => Accidental::DoubleFlat,
            -1 => Accidental::Flat,
            1 => Accidental::Sharp,
            2 => Accidental::DoubleSharp,
            _ => Accidental::Natural,
        }
    }

    /// Display form: "bb", "b", "", "#", "##"
    pub fn symbol(self) -> &'static str {
        match self {
            Accidental::DoubleFlat => "bb",
            Accidental::Flat => "b",
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::DoubleSharp => "##",
        }
    }

    /// ABC form: "__", "_", "", "^", "^^"
    pub fn abc(self) -> &'static str {
        match self {
            Accidental::DoubleFlat => "__",
            Accidental::Flat => "_",
            Accidental::Natural => "",
            Accidental::Sharp => "^",
            Accidental::DoubleSharp => "^^",
        }
    }
}

/// Signed pitch-class distance folded into -6..=6.
fn signed_distance(pc: u8, natural: u8) -> i32 {
    let mut diff = pc as i32 - natural as i32;
    if diff > 6 {
        diff -= 12;
    }
    if diff < -6 {
        diff += 12;
    }
    diff
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleDegreeSpelling {
    pub letter: Letter,
    pub accidental: Accidental,
    /// Octave correction when the spelled letter crosses a C boundary (B#, Cb)
    pub octave_offset: i8,
}

impl ScaleDegreeSpelling {
    pub fn name(&self) -> String {
        format!("{}{}", self.letter.as_char(), self.accidental.symbol())
    }
}

/// Spelling of one key: a pitch-class map for in-scale tones plus the key label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleSpelling {
    pub root: u8,
    pub mode: String,
    pub prefer_flats: bool,
    /// "F#Maj", "Ebm"
    pub key_label: String,
    pub degrees: BTreeMap<u8, ScaleDegreeSpelling>,
}

impl ScaleSpelling {
    /// Spelled name of a pitch class, falling back to the chromatic table.
    pub fn spell(&self, pitch_class: u8) -> String {
        let pc = pitch_class % 12;
        match self.degrees.get(&pc) {
            Some(degree) => degree.name(),
            None => {
                let token = self.fallback(pc);
                let letter = &token[token.len() - 1..];
                match token.chars().next() {
                    Some('^') => format!("{letter}#"),
                    Some('_') => format!("{letter}b"),
                    _ => letter.to_string(),
                }
            }
        }
    }

    fn fallback(&self, pc: u8) -> &'static str {
        if self.prefer_flats {
            FALLBACK_FLAT[pc as usize]
        } else {
            FALLBACK_SHARP[pc as usize]
        }
    }

    /// ABC pitch token for a MIDI note.
    ///
    /// In-scale tones print the bare letter and rely on the key field; other
    /// tones carry an explicit `^`, `_` or `=`. Octave 5 and up is lowercase
    /// with one `'` per extra octave, below octave 4 one `,` per octave.
    pub fn abc_pitch(&self, midi: u8) -> String {
        let pc = midi % 12;
        let base_octave = (midi / 12) as i32 - 1;

        let (prefix, letter, offset) = match self.degrees.get(&pc) {
            Some(degree) => ("", degree.letter.as_char(), degree.octave_offset as i32),
            None => {
                let token = self.fallback(pc);
                let letter = token.chars().last().unwrap_or('C');
                let prefix = match token.chars().next() {
                    Some('^') => "^",
                    Some('_') => "_",
                    _ => "=",
                };
                (prefix, letter, 0)
            }
        };

        let octave = base_octave + offset;
        let mut out = String::from(prefix);
        if octave >= 5 {
            out.push(letter.to_ascii_lowercase());
            out.push_str(&"'".repeat((octave - 5) as usize));
        } else {
            out.push(letter);
            if octave < 4 {
                out.push_str(&",".repeat((4 - octave) as usize));
            }
        }
        out
    }

    /// ABC key field, e.g. `K:Ebm`.
    pub fn key_field(&self) -> String {
        format!("K:{}", self.key_label)
    }
}

/// Whether to spell with flats. Auto follows the canonical chromatic name of
/// the root; among natural roots only F leans flat.
fn prefers_flats(root: u8, preference: SpellingPreference) -> bool {
    match preference {
        SpellingPreference::Flat => true,
        SpellingPreference::Sharp => false,
        SpellingPreference::Auto => {
            let name = NOTE_NAMES[root as usize];
            if name.contains('b') {
                true
            } else if name.contains('#') {
                false
            } else {
                root == 5
            }
        }
    }
}

/// Staff letter the root is spelled on.
fn root_letter(root: u8, prefer_flats: bool) -> Letter {
    let index = match (root, prefer_flats) {
        (1, true) => 1,   // Db
        (6, true) => 4,   // Gb
        (11, true) => 0,  // Cb
        (1, false) => 0,  // C#
        (3, false) => 1,  // D#
        (6, false) => 3,  // F#
        (8, false) => 4,  // G#
        (10, false) => 5, // A#
        _ => [0, 0, 1, 2, 2, 3, 3, 4, 5, 5, 6, 6][root as usize],
    };
    Letter::from_index(index)
}

fn octave_offset(letter: Letter, pc: u8) -> i8 {
    match (letter, pc) {
        (Letter::B, 0) | (Letter::B, 1) => -1,
        (Letter::C, 11) | (Letter::C, 10) => 1,
        _ => 0,
    }
}

/// Spell a key by walking the staff letters from the root, one per scale degree.
///
/// Unknown mode names spell as Major. The chromatic mode has no letter per
/// degree, so every tone uses the fallback table.
pub fn spell_scale(root: u8, mode_name: &str, preference: SpellingPreference) -> ScaleSpelling {
    let root = root % 12;
    let mode: &Mode = find_mode(mode_name)
        .filter(|m| STANDARD_MODES.contains(m) || **m == CHROMATIC)
        .unwrap_or(&STANDARD_MODES[0]);
    let prefer_flats = prefers_flats(root, preference);
    let start = root_letter(root, prefer_flats);

    let mut degrees = BTreeMap::new();
    if *mode != CHROMATIC {
        for (step, interval) in mode.intervals.iter().enumerate() {
            let pc = (root + interval) % 12;
            let letter = Letter::from_index(start.index() + step);
            degrees.insert(
                pc,
                ScaleDegreeSpelling {
                    letter,
                    accidental: Accidental::from_semitones(signed_distance(
                        pc,
                        letter.natural_pitch_class(),
                    )),
                    octave_offset: octave_offset(letter, pc),
                },
            );
        }
    }

    let root_accidental = match signed_distance(root, start.natural_pitch_class()) {
        1 => "#",
        -1 => "b",
        _ => "",
    };
    let quality = if mode.is_minor() { "m" } else { "Maj" };

    ScaleSpelling {
        root,
        mode: mode.name.to_string(),
        prefer_flats,
        key_label: format!("{}{}{}", start.as_char(), root_accidental, quality),
        degrees,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(spelling: &ScaleSpelling, root: u8, mode: &str) -> Vec<String> {
        find_mode(mode)
            .unwrap()
            .intervals
            .iter()
            .map(|i| spelling.spell(root + i))
            .collect()
    }

    #[test]
    fn f_sharp_auto_spells_with_sharps() {
        let spelling = spell_scale(6, "Major", SpellingPreference::Auto);
        assert!(!spelling.prefer_flats);
        assert_eq!(
            names(&spelling, 6, "Major"),
            vec!["F#", "G#", "A#", "B", "C#", "D#", "E#"]
        );
        assert_eq!(spelling.key_field(), "K:F#Maj");
    }

    #[test]
    fn e_flat_auto_spells_with_flats() {
        let spelling = spell_scale(3, "Natural Minor", SpellingPreference::Auto);
        assert!(spelling.prefer_flats);
        assert_eq!(
            names(&spelling, 3, "Natural Minor"),
            vec!["Eb", "F", "Gb", "Ab", "Bb", "Cb", "Db"]
        );
        assert_eq!(spelling.key_label, "Ebm");
    }

    #[test]
    fn natural_roots() {
        assert!(spell_scale(5, "Major", SpellingPreference::Auto).prefer_flats);
        assert!(!spell_scale(7, "Major", SpellingPreference::Auto).prefer_flats);
        assert_eq!(
            spell_scale(2, "Dorian", SpellingPreference::Auto).key_label,
            "Dm"
        );
    }

    #[test]
    fn forced_preference_overrides_auto() {
        let spelling = spell_scale(6, "Major", SpellingPreference::Flat);
        assert_eq!(spelling.key_label, "GbMaj");
        assert_eq!(spelling.spell(11), "Cb");
        assert_eq!(spelling.degrees[&11].octave_offset, 1);
    }

    #[test]
    fn b_sharp_renders_an_octave_down() {
        // C# major: B# is pitch class 0
        let spelling = spell_scale(1, "Major", SpellingPreference::Sharp);
        assert_eq!(spelling.spell(0), "B#");
        assert_eq!(spelling.abc_pitch(72), "B");
        assert_eq!(spelling.abc_pitch(61), "C");
    }

    #[test]
    fn abc_octaves_and_fallback() {
        let spelling = spell_scale(0, "Major", SpellingPreference::Auto);
        assert_eq!(spelling.abc_pitch(60), "C");
        assert_eq!(spelling.abc_pitch(72), "c");
        assert_eq!(spelling.abc_pitch(84), "c'");
        assert_eq!(spelling.abc_pitch(48), "C,");
        assert_eq!(spelling.abc_pitch(36), "C,,");
        assert_eq!(spelling.abc_pitch(61), "^C");
        assert_eq!(spelling.abc_pitch(70), "^A");

        let flat = spell_scale(5, "Major", SpellingPreference::Auto);
        assert_eq!(flat.abc_pitch(70), "B");
        assert_eq!(flat.abc_pitch(61), "_D");
        assert_eq!(flat.abc_pitch(71), "=B");
    }

    #[test]
    fn chromatic_and_unknown_modes() {
        let chromatic = spell_scale(0, "Chromatic", SpellingPreference::Auto);
        assert!(chromatic.degrees.is_empty());
        assert_eq!(chromatic.abc_pitch(60), "=C");

        let unknown = spell_scale(0, "Bebop", SpellingPreference::Auto);
        assert_eq!(unknown.mode, "Major");
        assert_eq!(unknown.degrees.len(), 7);
    }
}
