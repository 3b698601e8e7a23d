//! Static scale catalogues shared by key prediction and spelling.

/// A named scale as semitone intervals from its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub name: &'static str,
    pub intervals: &'static [u8],
}

impl Mode {
    const fn new(name: &'static str, intervals: &'static [u8]) -> Self {
        Self { name, intervals }
    }

    /// Absolute pitch classes of this mode on `root`, ascending.
    pub fn pitch_classes(&self, root: u8) -> Vec<u8> {
        let mut pcs: Vec<u8> = self.intervals.iter().map(|i| (root + i) % 12).collect();
        pcs.sort_unstable();
        pcs
    }

    /// Root, characteristic third and fifth.
    ///
    /// The major third wins over the minor one; the perfect fifth over the
    /// diminished, then augmented.
    pub fn triad_intervals(&self) -> Vec<u8> {
        let has = |i: u8| self.intervals.contains(&i);
        let mut triad = vec![0];
        if let Some(third) = [4, 3].into_iter().find(|&i| has(i)) {
            triad.push(third);
        }
        if let Some(fifth) = [7, 6, 8].into_iter().find(|&i| has(i)) {
            triad.push(fifth);
        }
        triad
    }

    /// Whether the tonic triad is conventionally labelled minor.
    pub fn is_minor(&self) -> bool {
        self.name.contains("Minor") || matches!(self.name, "Dorian" | "Phrygian" | "Locrian")
    }
}

pub static STANDARD_MODES: &[Mode] = &[
    Mode::new("Major", &[0, 2, 4, 5, 7, 9, 11]),
    Mode::new("Natural Minor", &[0, 2, 3, 5, 7, 8, 10]),
    Mode::new("Harmonic Minor", &[0, 2, 3, 5, 7, 8, 11]),
    Mode::new("Dorian", &[0, 2, 3, 5, 7, 9, 10]),
    Mode::new("Phrygian", &[0, 1, 3, 5, 7, 8, 10]),
    Mode::new("Lydian", &[0, 2, 4, 6, 7, 9, 11]),
    Mode::new("Mixolydian", &[0, 2, 4, 5, 7, 9, 10]),
    Mode::new("Locrian", &[0, 1, 3, 5, 6, 8, 10]),
];

/// Non-diatonic scales, only considered on request.
pub static EXOTIC_MODES: &[Mode] = &[
    Mode::new("Major Pentatonic", &[0, 2, 4, 7, 9]),
    Mode::new("Minor Pentatonic", &[0, 3, 5, 7, 10]),
    Mode::new("Blues", &[0, 3, 5, 6, 7, 10]),
    Mode::new("Whole Tone", &[0, 2, 4, 6, 8, 10]),
    Mode::new("Octatonic (W-H)", &[0, 2, 3, 5, 6, 8, 9, 11]),
    Mode::new("Octatonic (H-W)", &[0, 1, 3, 4, 6, 7, 9, 10]),
    Mode::new("Harmonic Major", &[0, 2, 4, 5, 7, 8, 11]),
    Mode::new("Double Harmonic", &[0, 1, 4, 5, 7, 8, 11]),
    Mode::new("Hungarian Minor", &[0, 2, 3, 6, 7, 8, 11]),
    Mode::new("Neapolitan Minor", &[0, 1, 3, 5, 7, 8, 11]),
    Mode::new("Enigmatic", &[0, 1, 4, 6, 8, 10, 11]),
];

pub static CHROMATIC: Mode = Mode::new("Chromatic", &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);

/// Look a mode up by name across every catalogue, including chromatic.
pub fn find_mode(name: &str) -> Option<&'static Mode> {
    STANDARD_MODES
        .iter()
        .chain(EXOTIC_MODES)
        .chain(std::iter::once(&CHROMATIC))
        .find(|m| m.name == name)
}
