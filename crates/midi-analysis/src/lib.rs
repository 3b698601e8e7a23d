pub mod context;
pub mod note;
pub mod ornament;
pub mod quantize;
pub mod rhythm;
pub mod transform;
pub mod voice_separate;

pub use context::{format_time, TimeSignature, TrackContext, DEFAULT_PPQ};
pub use note::{
    coerce_min_duration, follow_principals, pitch_name, sort_by_onset, Note, SeparatedVoice,
    VoiceStats, NOTE_NAMES,
};
pub use ornament::{
    clear_ornament_tags, find_ornaments, ornament_count, tag_ornaments, OrnamentGroup,
    OrnamentKind,
};
pub use quantize::{
    analyze_grid_fit, apply_grid_fit, grid_ticks, is_known_note_value, shadow_quantize,
    GridCandidate, GridConfidence, GridFit, GridRole, RhythmFamily, RhythmRule,
};
pub use rhythm::{analyze_rhythm, NoteValueStat, RhythmStats};
pub use transform::{
    crop_to_range, filter_short_notes, inversion_stats, melodic_inversion, modal_remap,
    musical_time_ticks, normalize_and_transpose, prune_overlaps, prune_overlaps_counted,
    prune_threshold_ticks, retrograde, shift_to_measure, time_scale, ExportRange, InversionMode,
    InversionStats, MelodicInversion, ModalConversion, MUSICAL_TIME_FRACTIONS,
};
pub use voice_separate::{separate_voices, tag_voices, voice_label, SeparationParams};

/// Errors from validating analysis and transform parameters.
///
/// The transforms themselves are total; these only come out of the explicit
/// `validate` helpers so callers can reject bad configuration up front.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown note value: {0:?}")]
    InvalidNoteValue(String),

    #[error("invalid measure range {start}..={end}")]
    InvalidRange { start: u32, end: u32 },

    #[error("time scale must be positive and finite, got {0}")]
    InvalidTimeScale(f64),

    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
