use midi_analysis::{
    is_known_note_value, Error, ExportRange, InversionMode, MelodicInversion, ModalConversion,
    Result, RhythmFamily, RhythmRule, SeparationParams, TimeSignature, DEFAULT_PPQ,
    MUSICAL_TIME_FRACTIONS,
};
use serde::{Deserialize, Serialize};

use crate::chords::ChordDetectionParams;
use crate::spelling::SpellingPreference;

/// What a tempo change does to the notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoChangeMode {
    /// Only the tempo marking changes; ticks stay put
    #[default]
    Speed,
    /// Ticks are stretched so the music keeps its wall-clock timing
    Time,
}

/// Everything one conversion call needs. Passed explicitly; nothing is read
/// from global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Tick resolution of the output
    pub output_ppq: u16,
    /// Semitones added to every pitch
    pub transposition: i32,
    pub note_time_scale: f64,
    pub tempo: f64,
    pub original_tempo: f64,
    pub tempo_change_mode: TempoChangeMode,
    /// Meter of the output, used by every measure-based stage
    pub time_signature: TimeSignature,

    pub primary_rhythm: RhythmRule,
    pub secondary_rhythm: RhythmRule,
    /// Minimum duration after quantization, as a note value; "off" disables
    pub quantize_duration_min: String,
    pub shift_to_measure: bool,
    pub detect_ornaments: bool,
    /// Index into the musical-time thresholds; 0 keeps every note
    pub remove_short_notes_index: usize,
    pub prune_overlaps: bool,
    pub prune_threshold_index: usize,
    pub voice_separation: SeparationParams,

    pub inversion_mode: InversionMode,
    pub melodic_inversion: MelodicInversion,
    pub modal_conversion: ModalConversion,
    pub export_range: ExportRange,
    pub key_spelling: SpellingPreference,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            output_ppq: DEFAULT_PPQ,
            transposition: 0,
            note_time_scale: 1.0,
            tempo: 120.0,
            original_tempo: 120.0,
            tempo_change_mode: TempoChangeMode::Speed,
            time_signature: TimeSignature::default(),
            primary_rhythm: RhythmRule::default(),
            secondary_rhythm: RhythmRule {
                enabled: false,
                family: RhythmFamily::Triple,
                min_note_value: "1/8t".to_string(),
            },
            quantize_duration_min: "off".to_string(),
            shift_to_measure: false,
            detect_ornaments: false,
            remove_short_notes_index: 0,
            prune_overlaps: false,
            prune_threshold_index: 3,
            voice_separation: SeparationParams::default(),
            inversion_mode: InversionMode::Off,
            melodic_inversion: MelodicInversion::default(),
            modal_conversion: ModalConversion::default(),
            export_range: ExportRange::default(),
            key_spelling: SpellingPreference::Auto,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            field,
            reason: format!("must be positive, got {value}"),
        })
    }
}

fn threshold_index(field: &'static str, index: usize) -> Result<()> {
    if index < MUSICAL_TIME_FRACTIONS.len() {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            field,
            reason: format!("index {} past the last threshold {}", index, MUSICAL_TIME_FRACTIONS.len() - 1),
        })
    }
}

impl ConversionOptions {
    /// Overall tick stretch for stage 4.
    pub fn time_scale_factor(&self) -> f64 {
        match self.tempo_change_mode {
            TempoChangeMode::Time if self.tempo > 0.0 && self.original_tempo > 0.0 => {
                self.note_time_scale * (self.original_tempo / self.tempo)
            }
            _ => self.note_time_scale,
        }
    }

    /// Reject settings the pipeline would otherwise quietly treat as no-ops.
    pub fn validate(&self) -> Result<()> {
        if self.output_ppq == 0 {
            return Err(Error::InvalidParameter {
                field: "output_ppq",
                reason: "must be non-zero".to_string(),
            });
        }
        if !self.note_time_scale.is_finite() || self.note_time_scale <= 0.0 {
            return Err(Error::InvalidTimeScale(self.note_time_scale));
        }
        positive("tempo", self.tempo)?;
        positive("original_tempo", self.original_tempo)?;
        if self.time_signature.numerator == 0 || self.time_signature.denominator == 0 {
            return Err(Error::InvalidParameter {
                field: "time_signature",
                reason: format!(
                    "{}/{} has a zero term",
                    self.time_signature.numerator, self.time_signature.denominator
                ),
            });
        }

        self.primary_rhythm.validate()?;
        self.secondary_rhythm.validate()?;
        if self.quantize_duration_min != "off" && !is_known_note_value(&self.quantize_duration_min) {
            return Err(Error::InvalidNoteValue(self.quantize_duration_min.clone()));
        }
        threshold_index("remove_short_notes_index", self.remove_short_notes_index)?;
        threshold_index("prune_threshold_index", self.prune_threshold_index)?;
        if self.voice_separation.max_voices == Some(0) {
            return Err(Error::InvalidParameter {
                field: "max_voices",
                reason: "use no limit instead of zero".to_string(),
            });
        }

        self.melodic_inversion.validate()?;
        self.modal_conversion.validate()?;
        self.export_range.validate()?;
        Ok(())
    }
}

/// A key chosen by the caller instead of the predicted one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChoice {
    pub root: u8,
    pub mode: String,
}

/// Settings for [`crate::MusicUnderstandingEngine::understand`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub detect_ornaments: bool,
    pub separation: SeparationParams,
    pub chords: ChordDetectionParams,
    /// Also score pentatonic, blues, octatonic and other non-diatonic scales
    pub include_exotic_modes: bool,
    pub key_spelling: SpellingPreference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_override: Option<KeyChoice>,
}

impl AnalysisOptions {
    /// Analysis settings matching a conversion, so the report describes what was converted.
    pub fn from_conversion(options: &ConversionOptions) -> Self {
        Self {
            detect_ornaments: options.detect_ornaments,
            separation: options.voice_separation.clone(),
            key_spelling: options.key_spelling,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ConversionOptions::default().validate().unwrap();
    }

    #[test]
    fn time_mode_stretches_by_tempo_ratio() {
        let options = ConversionOptions {
            tempo_change_mode: TempoChangeMode::Time,
            original_tempo: 120.0,
            tempo: 60.0,
            note_time_scale: 1.5,
            ..ConversionOptions::default()
        };
        assert!((options.time_scale_factor() - 3.0).abs() < 1e-12);

        let speed = ConversionOptions {
            tempo: 60.0,
            ..ConversionOptions::default()
        };
        assert_eq!(speed.time_scale_factor(), 1.0);
    }

    #[test]
    fn rejects_bad_values() {
        let bad_scale = ConversionOptions {
            note_time_scale: 0.0,
            ..ConversionOptions::default()
        };
        assert!(matches!(bad_scale.validate(), Err(Error::InvalidTimeScale(_))));

        let bad_grid = ConversionOptions {
            quantize_duration_min: "1/7".to_string(),
            ..ConversionOptions::default()
        };
        assert!(matches!(bad_grid.validate(), Err(Error::InvalidNoteValue(_))));

        let bad_index = ConversionOptions {
            prune_threshold_index: 11,
            ..ConversionOptions::default()
        };
        assert!(bad_index.validate().is_err());

        let mut bad_range = ConversionOptions::default();
        bad_range.export_range.start_measure = 5;
        bad_range.export_range.end_measure = 2;
        assert!(matches!(bad_range.validate(), Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let options: ConversionOptions =
            serde_json::from_str(r#"{"transposition": -3, "inversion_mode": "2beats"}"#).unwrap();
        assert_eq!(options.transposition, -3);
        assert_eq!(options.inversion_mode, InversionMode::TwoBeats);
        assert_eq!(options.prune_threshold_index, 3);
        assert_eq!(options.primary_rhythm.min_note_value, "1/16");
    }

    #[test]
    fn analysis_follows_conversion() {
        let conversion = ConversionOptions {
            detect_ornaments: true,
            key_spelling: SpellingPreference::Flat,
            ..ConversionOptions::default()
        };
        let analysis = AnalysisOptions::from_conversion(&conversion);
        assert!(analysis.detect_ornaments);
        assert_eq!(analysis.key_spelling, SpellingPreference::Flat);
        assert!(analysis.key_override.is_none());
    }
}
