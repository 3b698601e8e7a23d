pub mod analyzer;
pub mod chord_templates;
pub mod chords;
pub mod key;
pub mod modes;
pub mod options;
pub mod pipeline;
pub mod report;
pub mod spelling;
pub mod types;

pub use analyzer::{voice_leading_intervals, HeuristicAnalyzer, MusicAnalyzer};
pub use chord_templates::{identify_chord, ChordShape, CHORD_SHAPES};
pub use chords::{
    detect_all, detect_chords_attack, detect_chords_bucketed, detect_chords_hybrid,
    detect_chords_sustain, ArpeggioWindow, BucketSize, ChordDetectionParams, HybridParams,
    VoiceChordMode,
};
pub use key::{pitch_class_histogram, predict_key, KeyGroup, KeyPrediction};
pub use modes::{find_mode, Mode, EXOTIC_MODES, STANDARD_MODES};
pub use options::{AnalysisOptions, ConversionOptions, KeyChoice, TempoChangeMode};
pub use pipeline::{transform_track, TransformOutput, TransformStats};
pub use report::render_report;
pub use spelling::{
    spell_scale, Accidental, Letter, ScaleDegreeSpelling, ScaleSpelling, SpellingPreference,
};
pub use types::{ChordEvent, ChordIdentification, ChordMatch, ChordProgressions, MusicUnderstanding};

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use midi_analysis::{
    analyze_rhythm, clear_ornament_tags, find_ornaments, sort_by_onset, tag_ornaments, Note,
    TrackContext,
};
use tracing::{debug, info};

/// Current algorithm version; bump when any stage changes its output.
pub const CURRENT_VERSION: u32 = 1;

/// Harmonic understanding engine.
///
/// Composes ornament tagging, voice separation, chord detection, key
/// prediction and spelling into a single `MusicUnderstanding`. Holds no
/// state between calls besides the analyzer.
pub struct MusicUnderstandingEngine {
    analyzer: Arc<dyn MusicAnalyzer>,
}

impl Default for MusicUnderstandingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicUnderstandingEngine {
    /// Create with the default heuristic analyzer.
    pub fn new() -> Self {
        Self {
            analyzer: Arc::new(HeuristicAnalyzer),
        }
    }

    /// Create with a custom analyzer.
    pub fn with_analyzer(analyzer: Arc<dyn MusicAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Validate the options, then run the conversion pipeline.
    pub fn convert(
        &self,
        notes: &[Note],
        source: &TrackContext,
        options: &ConversionOptions,
    ) -> Result<TransformOutput> {
        options.validate().context("validating conversion options")?;
        info!(notes = notes.len(), ppq = source.ppq, "converting track");
        Ok(transform_track(notes, source, options))
    }

    /// Analyze one track.
    pub fn understand(
        &self,
        notes: &[Note],
        context: &TrackContext,
        options: &AnalysisOptions,
    ) -> Result<MusicUnderstanding> {
        if let Some(choice) = &options.key_override {
            if choice.root > 11 {
                bail!("key override root {} is not a pitch class", choice.root);
            }
            if find_mode(&choice.mode).is_none() {
                bail!("key override mode {:?} is not a known mode", choice.mode);
            }
        }

        let ppq = context.effective_ppq();
        info!(notes = notes.len(), ppq, "computing music understanding");

        let (tagged, ornaments) = if options.detect_ornaments {
            (tag_ornaments(notes, ppq), find_ornaments(notes, ppq))
        } else {
            // tags from an earlier pass would still pull notes onto a principal
            (clear_ornament_tags(notes), Vec::new())
        };

        let voices = self
            .analyzer
            .separate_voices(&tagged, context, &options.separation);
        let mut voiced: Vec<Note> = voices.iter().flat_map(|v| v.notes.iter().cloned()).collect();
        sort_by_onset(&mut voiced);

        let chords = self.analyzer.detect_chords(&voiced, context, &options.chords);

        let histogram = pitch_class_histogram(&tagged);
        let key_groups = self
            .analyzer
            .predict_key(&histogram, tagged.len(), options.include_exotic_modes);
        let key = key_groups.first().map(|g| g.winner.clone());

        let spelling = match (&options.key_override, &key) {
            (Some(choice), _) => Some(spell_scale(choice.root, &choice.mode, options.key_spelling)),
            (None, Some(predicted)) => Some(spell_scale(
                predicted.root,
                &predicted.mode,
                options.key_spelling,
            )),
            (None, None) => None,
        };

        let key_label = key.as_ref().map(KeyPrediction::label).unwrap_or_default();
        debug!(
            voices = voices.len(),
            ornaments = ornaments.len(),
            sustain_chords = chords.sustain.len(),
            key = %key_label,
            "music understanding computed"
        );

        Ok(MusicUnderstanding {
            version: CURRENT_VERSION,
            context: context.clone(),
            total_notes: tagged.len(),
            ornaments,
            rhythm: analyze_rhythm(&tagged, ppq, context.time_signature),
            voice_intervals: voice_leading_intervals(&voiced),
            voices,
            chords,
            pitch_class_histogram: histogram,
            key_groups,
            key,
            spelling,
        })
    }
}
