//! The conversion pipeline: eight stages in a fixed order, each taking the
//! previous stage's notes and returning a fresh list.
//!
//! 1. transposition and tick-base normalization
//! 2. short-note filtering
//! 3. quantization (ornaments, shift-to-measure, overlap pruning, shadow grid, duration floor)
//! 4. time scale
//! 5. retrograde
//! 6. melodic inversion
//! 7. modal remap
//! 8. range crop
//!
//! Later stages read absolute tick positions set by earlier ones, so the order
//! is not configurable.

use midi_analysis::{
    analyze_grid_fit, apply_grid_fit, coerce_min_duration, crop_to_range, filter_short_notes,
    grid_ticks, inversion_stats, melodic_inversion, modal_remap, musical_time_ticks,
    normalize_and_transpose, prune_overlaps_counted, prune_threshold_ticks, retrograde,
    shift_to_measure, sort_by_onset, tag_ornaments, time_scale, InversionStats, Note,
    TrackContext, DEFAULT_PPQ,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::options::ConversionOptions;

/// What the pipeline did to the notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformStats {
    pub total_notes_input: usize,
    pub total_notes_output: usize,
    pub notes_removed_short: usize,
    /// Notes tagged as ornament or ornament principal
    pub ornament_notes: usize,
    pub notes_removed_overlap: usize,
    pub notes_truncated_overlap: usize,
    /// Notes whose onset moved during quantization
    pub notes_quantized: usize,
    /// Mean onset movement over the moved notes
    pub average_shift_ticks: f64,
    pub notes_cropped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformOutput {
    /// Onset-ordered result
    pub notes: Vec<Note>,
    /// Resolution, tempo and meter of the output
    pub context: TrackContext,
    pub stats: TransformStats,
    /// Present when melodic inversion is enabled and the track has notes
    pub inversion: Option<InversionStats>,
}

/// Every stage boundary: no zero-length note leaves a stage.
fn settle(notes: Vec<Note>) -> Vec<Note> {
    coerce_min_duration(notes, 1)
}

/// Scale a tick threshold measured at the source resolution to the output one.
fn rescale(ticks: u64, ratio: f64) -> u64 {
    (ticks as f64 * ratio).round() as u64
}

fn quantize_stage(
    notes: Vec<Note>,
    ppq: u16,
    ratio: f64,
    source_ppq: u16,
    options: &ConversionOptions,
    stats: &mut TransformStats,
) -> Vec<Note> {
    let mut notes = notes;

    if options.detect_ornaments {
        notes = tag_ornaments(&notes, ppq);
        stats.ornament_notes = notes.iter().filter(|n| n.is_ornament).count();
    }

    if options.shift_to_measure {
        notes = shift_to_measure(&notes, ppq, options.time_signature);
    }

    if options.prune_overlaps {
        let threshold = rescale(
            prune_threshold_ticks(options.prune_threshold_index, source_ppq),
            ratio,
        );
        let before = notes.len();
        let (pruned, truncated) = prune_overlaps_counted(&notes, threshold);
        stats.notes_removed_overlap = before - pruned.len();
        stats.notes_truncated_overlap = truncated;
        notes = pruned;
    }

    if options.primary_rhythm.enabled {
        let fits = analyze_grid_fit(
            &notes,
            ppq,
            &options.primary_rhythm,
            &options.secondary_rhythm,
        );
        let shifts: Vec<u64> = fits
            .iter()
            .map(|f| f.best.ticks.abs_diff(f.onset_tick))
            .filter(|&shift| shift > 0)
            .collect();
        stats.notes_quantized = shifts.len();
        stats.average_shift_ticks = if shifts.is_empty() {
            0.0
        } else {
            shifts.iter().sum::<u64>() as f64 / shifts.len() as f64
        };
        notes = apply_grid_fit(&notes, &fits);
    }

    let floor = grid_ticks(&options.quantize_duration_min, ppq);
    if floor > 0 {
        for note in &mut notes {
            note.duration_ticks = note.duration_ticks.max(floor);
        }
    }

    notes
}

/// Run every stage over one track.
///
/// `source` describes the incoming notes; the output uses `options.output_ppq`
/// and `options.time_signature`. Total for any input: degenerate settings turn
/// a stage into a pass-through.
pub fn transform_track(notes: &[Note], source: &TrackContext, options: &ConversionOptions) -> TransformOutput {
    let source_ppq = source.effective_ppq();
    let ppq = if options.output_ppq == 0 {
        DEFAULT_PPQ
    } else {
        options.output_ppq
    };
    let ratio = ppq as f64 / source_ppq as f64;
    let meter = options.time_signature;

    let mut stats = TransformStats {
        total_notes_input: notes.len(),
        ..TransformStats::default()
    };

    let notes = settle(normalize_and_transpose(
        notes,
        options.transposition,
        source_ppq,
        ppq,
    ));
    debug!(stage = "normalize", notes = notes.len(), source_ppq, ppq, "pipeline stage");

    let min_ticks = rescale(
        musical_time_ticks(options.remove_short_notes_index, source_ppq),
        ratio,
    );
    let before = notes.len();
    let notes = settle(filter_short_notes(&notes, min_ticks));
    stats.notes_removed_short = before - notes.len();
    debug!(stage = "filter", notes = notes.len(), min_ticks, "pipeline stage");

    let notes = settle(quantize_stage(notes, ppq, ratio, source_ppq, options, &mut stats));
    debug!(
        stage = "quantize",
        notes = notes.len(),
        moved = stats.notes_quantized,
        "pipeline stage"
    );

    let factor = options.time_scale_factor();
    let notes = settle(time_scale(&notes, factor));
    debug!(stage = "time_scale", notes = notes.len(), factor, "pipeline stage");

    let notes = settle(retrograde(&notes, options.inversion_mode, ppq, meter));
    debug!(stage = "retrograde", notes = notes.len(), mode = ?options.inversion_mode, "pipeline stage");

    let inversion = if options.melodic_inversion.enabled {
        inversion_stats(&notes, &options.melodic_inversion, ppq, meter)
    } else {
        None
    };
    let notes = settle(melodic_inversion(&notes, &options.melodic_inversion, ppq, meter));
    debug!(stage = "melodic_inversion", notes = notes.len(), "pipeline stage");

    let notes = settle(modal_remap(&notes, &options.modal_conversion));
    debug!(stage = "modal_remap", notes = notes.len(), "pipeline stage");

    let before = notes.len();
    let mut notes = settle(crop_to_range(&notes, &options.export_range, ppq, meter));
    stats.notes_cropped = before - notes.len();
    debug!(stage = "crop", notes = notes.len(), cropped = stats.notes_cropped, "pipeline stage");

    sort_by_onset(&mut notes);
    stats.total_notes_output = notes.len();

    TransformOutput {
        notes,
        context: TrackContext::new(ppq, options.tempo, meter),
        stats,
        inversion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midi_analysis::{InversionMode, RhythmFamily, RhythmRule, TimeSignature};
    use pretty_assertions::assert_eq;

    fn make_note(pitch: u8, onset: u64, duration: u64) -> Note {
        Note::new(pitch, onset, duration, 0.8)
    }

    fn source() -> TrackContext {
        TrackContext::new(480, 120.0, TimeSignature::new(4, 4))
    }

    fn pitches_and_onsets(notes: &[Note]) -> Vec<(u8, u64)> {
        notes.iter().map(|n| (n.pitch, n.onset_tick)).collect()
    }

    #[test]
    fn on_grid_input_passes_through_defaults() {
        let notes = vec![make_note(60, 0, 480), make_note(64, 480, 480), make_note(67, 960, 960)];
        let output = transform_track(&notes, &source(), &ConversionOptions::default());
        assert_eq!(output.notes, notes);
        assert_eq!(output.stats.notes_quantized, 0);
        assert_eq!(output.stats.total_notes_output, 3);
        assert_eq!(output.context.ppq, 480);
    }

    #[test]
    fn transposes_and_rescales_resolution() {
        let notes = vec![make_note(60, 96, 48), make_note(127, 192, 96)];
        let options = ConversionOptions {
            transposition: 5,
            ..ConversionOptions::default()
        };
        let ctx = TrackContext::new(96, 120.0, TimeSignature::new(4, 4));
        let output = transform_track(&notes, &ctx, &options);
        assert_eq!(pitches_and_onsets(&output.notes), vec![(65, 480), (127, 960)]);
        assert_eq!(output.notes[0].duration_ticks, 240);
    }

    #[test]
    fn counts_short_notes_and_quantize_moves() {
        let notes = vec![
            make_note(60, 0, 480),
            make_note(62, 500, 10),
            make_note(64, 970, 470),
            make_note(65, 1430, 480),
        ];
        let options = ConversionOptions {
            // 1/32 of a whole note: 60 ticks
            remove_short_notes_index: 5,
            primary_rhythm: RhythmRule::new(RhythmFamily::Simple, "1/8"),
            ..ConversionOptions::default()
        };
        let output = transform_track(&notes, &source(), &options);
        assert_eq!(output.stats.notes_removed_short, 1);
        assert_eq!(output.stats.notes_quantized, 2);
        assert!((output.stats.average_shift_ticks - 10.0).abs() < 1e-9);
        assert_eq!(pitches_and_onsets(&output.notes), vec![(60, 0), (64, 960), (65, 1440)]);
    }

    #[test]
    fn quantizes_before_time_scale() {
        let notes = vec![make_note(60, 50, 430)];
        let options = ConversionOptions {
            note_time_scale: 2.0,
            ..ConversionOptions::default()
        };
        let output = transform_track(&notes, &source(), &options);
        // snapped to 0 first, then doubled; scaling first would land on 120
        assert_eq!(output.notes[0].onset_tick, 0);
        assert_eq!(output.notes[0].duration_ticks, 960);
    }

    #[test]
    fn global_retrograde_then_crop() {
        let notes = vec![
            make_note(60, 0, 1920),
            make_note(62, 1920, 1920),
            make_note(64, 3840, 1920),
        ];
        let mut options = ConversionOptions {
            inversion_mode: InversionMode::Global,
            ..ConversionOptions::default()
        };
        options.export_range.enabled = true;
        options.export_range.start_measure = 2;
        options.export_range.end_measure = 3;

        let output = transform_track(&notes, &source(), &options);
        assert_eq!(pitches_and_onsets(&output.notes), vec![(62, 0), (60, 1920)]);
        assert_eq!(output.stats.notes_cropped, 1);
    }

    #[test]
    fn melodic_inversion_reports_stats() {
        let notes = vec![make_note(60, 0, 480), make_note(64, 480, 480), make_note(67, 960, 480)];
        let mut options = ConversionOptions::default();
        options.melodic_inversion.enabled = true;
        options.melodic_inversion.start_measure = 1;
        options.melodic_inversion.end_measure = 1;

        let output = transform_track(&notes, &source(), &options);
        assert_eq!(
            output.notes.iter().map(|n| n.pitch).collect::<Vec<_>>(),
            vec![60, 56, 53]
        );
        let stats = output.inversion.unwrap();
        assert_eq!(stats.anchor_note_name, "C4");
        assert_eq!(stats.total_notes, 3);
        assert!(!stats.has_polyphony);
    }

    #[test]
    fn ornament_links_survive_every_stage() {
        let notes = vec![make_note(59, 440, 40), make_note(60, 482, 960)];
        let options = ConversionOptions {
            detect_ornaments: true,
            inversion_mode: InversionMode::Global,
            ..ConversionOptions::default()
        };
        let output = transform_track(&notes, &source(), &options);

        assert_eq!(output.stats.ornament_notes, 2);
        assert_eq!(pitches_and_onsets(&output.notes), vec![(60, 0), (59, 840)]);
        let grace = &output.notes[1];
        assert!(grace.is_ornament);
        assert_eq!(grace.principal_pitch, Some(60));
        assert_eq!(grace.principal_onset_tick, Some(0));
    }

    #[test]
    fn zero_durations_never_escape() {
        let notes = vec![make_note(60, 0, 0), make_note(64, 480, 0)];
        let options = ConversionOptions {
            primary_rhythm: RhythmRule::disabled(),
            ..ConversionOptions::default()
        };
        let output = transform_track(&notes, &source(), &options);
        assert!(output.notes.iter().all(|n| n.duration_ticks >= 1));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let notes = vec![
            make_note(72, 7, 470),
            make_note(70, 444, 30),
            make_note(71, 482, 461),
            make_note(48, 0, 1915),
        ];
        let options = ConversionOptions {
            detect_ornaments: true,
            prune_overlaps: true,
            inversion_mode: InversionMode::Measure,
            ..ConversionOptions::default()
        };
        let first = serde_json::to_string(&transform_track(&notes, &source(), &options)).unwrap();
        let second = serde_json::to_string(&transform_track(&notes, &source(), &options)).unwrap();
        assert_eq!(first, second);
    }
}
