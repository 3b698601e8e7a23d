//! Shadow-grid quantization.
//!
//! Each note onset is measured against a primary grid and, optionally, a
//! competing secondary grid (say straight sixteenths against eighth
//! triplets). The closest grid point wins; how clearly it won is kept as a
//! [`GridConfidence`] for display.

use crate::note::{follow_principals, Note};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Absolute floor for the "certain" tolerance, in ticks.
const MIN_TOLERANCE_TICKS: f64 = 5.0;
/// Fraction of the finer grid quantum accepted as a clean hit.
const TOLERANCE_FRACTION: f64 = 0.15;
/// Best error at or below this share of the runner-up counts as a clear pick.
const CLARITY_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmFamily {
    Simple,
    Triple,
    Quintuplet,
}

impl RhythmFamily {
    /// Family implied by a note-value string's suffix (`t` triplet, `q` quintuplet).
    pub fn of_note_value(value: &str) -> Self {
        if value.ends_with('t') {
            RhythmFamily::Triple
        } else if value.ends_with('q') {
            RhythmFamily::Quintuplet
        } else {
            RhythmFamily::Simple
        }
    }
}

/// The smallest subdivision a grid may address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RhythmRule {
    pub enabled: bool,
    pub family: RhythmFamily,
    pub min_note_value: String,
}

impl RhythmRule {
    pub fn new(family: RhythmFamily, min_note_value: impl Into<String>) -> Self {
        Self {
            enabled: true,
            family,
            min_note_value: min_note_value.into(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            family: RhythmFamily::Simple,
            min_note_value: "off".to_string(),
        }
    }

    /// Grid quantum in ticks; zero when disabled or unknown.
    pub fn quantum(&self, ppq: u16) -> u64 {
        if !self.enabled {
            return 0;
        }
        grid_ticks(&self.min_note_value, ppq)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if grid_multiplier(&self.min_note_value).is_none() {
            return Err(Error::InvalidNoteValue(self.min_note_value.clone()));
        }
        if RhythmFamily::of_note_value(&self.min_note_value) != self.family {
            return Err(Error::InvalidParameter {
                field: "min_note_value",
                reason: format!(
                    "{:?} does not belong to the {:?} family",
                    self.min_note_value, self.family
                ),
            });
        }
        Ok(())
    }
}

impl Default for RhythmRule {
    fn default() -> Self {
        Self::new(RhythmFamily::Simple, "1/16")
    }
}

/// Quarter-note multiplier for a note-value string.
fn grid_multiplier(value: &str) -> Option<f64> {
    const TRIPLET: f64 = 2.0 / 3.0;
    let multiplier = match value {
        "1/1" => 4.0,
        "1/2" => 2.0,
        "1/4" => 1.0,
        "1/8" => 0.5,
        "1/16" => 0.25,
        "1/32" => 0.125,
        "1/64" => 0.0625,
        "1/2t" => 2.0 * TRIPLET,
        "1/4t" => TRIPLET,
        "1/8t" => 0.5 * TRIPLET,
        "1/16t" => 0.25 * TRIPLET,
        "1/32t" => 0.125 * TRIPLET,
        "1/64t" => 0.0625 * TRIPLET,
        "1/4q" => 4.0 / 5.0,
        "1/8q" => 2.0 / 5.0,
        "1/16q" => 0.2,
        "1/32q" => 0.1,
        "1/64q" => 0.05,
        _ => return None,
    };
    Some(multiplier)
}

/// Returns true for `"off"` and every note value the grid table knows.
pub fn is_known_note_value(value: &str) -> bool {
    value == "off" || grid_multiplier(value).is_some()
}

/// Ticks per grid step for a note value like `"1/16"`, `"1/8t"` or `"1/16q"`.
///
/// `"off"` and unrecognised values map to zero, which every caller treats as
/// "leave timing alone".
pub fn grid_ticks(value: &str, ppq: u16) -> u64 {
    match grid_multiplier(value) {
        Some(multiplier) => (ppq as f64 * multiplier).round() as u64,
        None => 0,
    }
}

/// Round `ticks` to the nearest multiple of `quantum`, halves rounding up.
pub(crate) fn snap(ticks: u64, quantum: u64) -> u64 {
    if quantum == 0 {
        return ticks;
    }
    (2 * ticks + quantum) / (2 * quantum) * quantum
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridRole {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridConfidence {
    Ambiguous,
    WeakPrimary,
    Certain,
}

/// Where one grid would put a note onset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCandidate {
    pub role: GridRole,
    pub family: RhythmFamily,
    pub note_value: String,
    pub quantum: u64,
    pub ticks: u64,
    pub error: u64,
}

impl GridCandidate {
    fn measure(role: GridRole, rule: &RhythmRule, quantum: u64, onset: u64) -> Self {
        let ticks = snap(onset, quantum);
        Self {
            role,
            family: rule.family,
            note_value: rule.min_note_value.clone(),
            quantum,
            ticks,
            error: ticks.abs_diff(onset),
        }
    }
}

/// Per-note grid analysis: the winning candidate plus the losers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridFit {
    pub onset_tick: u64,
    pub best: GridCandidate,
    pub confidence: GridConfidence,
    pub alternatives: Vec<GridCandidate>,
}

/// Measure every note against the active grids and classify the fit.
///
/// Returns one [`GridFit`] per input note, in input order.
pub fn analyze_grid_fit(
    notes: &[Note],
    ppq: u16,
    primary: &RhythmRule,
    secondary: &RhythmRule,
) -> Vec<GridFit> {
    let primary_quantum = primary.quantum(ppq);
    let secondary_quantum = secondary.quantum(ppq);

    let finest = if secondary_quantum > 0 {
        primary_quantum.min(secondary_quantum)
    } else {
        primary_quantum
    };
    let tolerance = (finest as f64 * TOLERANCE_FRACTION).max(MIN_TOLERANCE_TICKS);

    notes
        .iter()
        .map(|note| {
            let onset = note.onset_tick;
            let mut candidates = Vec::with_capacity(2);
            if primary_quantum > 0 {
                candidates.push(GridCandidate::measure(
                    GridRole::Primary,
                    primary,
                    primary_quantum,
                    onset,
                ));
            }
            if secondary_quantum > 0 {
                candidates.push(GridCandidate::measure(
                    GridRole::Secondary,
                    secondary,
                    secondary_quantum,
                    onset,
                ));
            }

            if candidates.is_empty() {
                return GridFit {
                    onset_tick: onset,
                    best: GridCandidate {
                        role: GridRole::Primary,
                        family: RhythmFamily::Simple,
                        note_value: "off".to_string(),
                        quantum: 0,
                        ticks: onset,
                        error: 0,
                    },
                    confidence: GridConfidence::Certain,
                    alternatives: Vec::new(),
                };
            }

            candidates.sort_by_key(|c| c.error);
            let best = candidates.remove(0);
            let confidence = classify(&best, candidates.first(), tolerance);

            GridFit {
                onset_tick: onset,
                best,
                confidence,
                alternatives: candidates,
            }
        })
        .collect()
}

fn classify(best: &GridCandidate, runner_up: Option<&GridCandidate>, tolerance: f64) -> GridConfidence {
    if best.error as f64 <= tolerance {
        return GridConfidence::Certain;
    }
    let Some(runner_up) = runner_up else {
        return GridConfidence::WeakPrimary;
    };
    if best.error as f64 <= CLARITY_RATIO * runner_up.error as f64 {
        return GridConfidence::WeakPrimary;
    }
    if best.role == GridRole::Primary {
        // primary-grid bias
        GridConfidence::WeakPrimary
    } else {
        GridConfidence::Ambiguous
    }
}

/// Move each note onto its best candidate and snap its duration to that grid.
///
/// Confidence does not influence the choice; the lowest-error candidate always
/// wins. `fits` must come from [`analyze_grid_fit`] on the same notes.
/// Ornament links are moved along with their principals.
pub fn apply_grid_fit(notes: &[Note], fits: &[GridFit]) -> Vec<Note> {
    let snapped = notes
        .iter()
        .zip(fits)
        .map(|(note, fit)| {
            let mut out = note.clone();
            out.onset_tick = fit.best.ticks;
            let quantum = fit.best.quantum;
            if quantum > 0 {
                let duration = snap(note.duration_ticks, quantum);
                out.duration_ticks = if duration == 0 { quantum } else { duration };
            }
            out
        })
        .collect();
    follow_principals(notes, snapped)
}

/// Snap onsets and durations to the primary grid and, when enabled, a
/// competing secondary grid. A disabled primary leaves the notes untouched.
pub fn shadow_quantize(
    notes: &[Note],
    ppq: u16,
    primary: &RhythmRule,
    secondary: &RhythmRule,
) -> Vec<Note> {
    if !primary.enabled {
        return notes.to_vec();
    }

    let fits = analyze_grid_fit(notes, ppq, primary, secondary);
    let ambiguous = fits
        .iter()
        .filter(|f| f.confidence == GridConfidence::Ambiguous)
        .count();
    debug!(
        notes = notes.len(),
        ambiguous,
        primary = %primary.min_note_value,
        secondary = %secondary.min_note_value,
        "shadow quantization"
    );

    apply_grid_fit(notes, &fits)
}
