//! End-to-end checks: conversion and analysis through the public engine.

use std::sync::{Arc, Mutex};

use midi_analysis::{Note, SeparatedVoice, SeparationParams, TimeSignature, TrackContext};
use music_understand::{
    render_report, AnalysisOptions, ChordDetectionParams, ChordProgressions, ConversionOptions,
    HeuristicAnalyzer, KeyChoice, KeyGroup, MusicAnalyzer, MusicUnderstandingEngine,
    SpellingPreference,
};
use pretty_assertions::assert_eq;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn make_note(pitch: u8, onset: u64, duration: u64) -> Note {
    Note::new(pitch, onset, duration, 0.75)
}

fn context() -> TrackContext {
    TrackContext::new(480, 100.0, TimeSignature::new(4, 4))
}

/// I - V - I in C with a stepwise melody on top.
fn cadence() -> Vec<Note> {
    let mut notes = vec![
        make_note(48, 0, 1920),
        make_note(64, 0, 1920),
        make_note(67, 0, 1920),
        make_note(43, 1920, 1920),
        make_note(62, 1920, 1920),
        make_note(71, 1920, 1920),
        make_note(48, 3840, 1920),
        make_note(64, 3840, 1920),
        make_note(67, 3840, 1920),
        make_note(72, 3840, 1920),
    ];
    for (i, pitch) in [72, 74, 76, 77, 79, 77, 76, 74].into_iter().enumerate() {
        notes.push(make_note(pitch, i as u64 * 480, 480));
    }
    notes
}

#[test]
fn cadence_in_c_major() {
    init_tracing();
    let engine = MusicUnderstandingEngine::new();
    let understanding = engine
        .understand(&cadence(), &context(), &AnalysisOptions::default())
        .expect("analysis succeeds");

    assert_eq!(understanding.total_notes, 18);
    let key = understanding.key.as_ref().expect("key predicted");
    assert_eq!(key.label(), "C Major");
    assert_eq!(
        understanding.spelling.as_ref().map(|s| s.key_field()),
        Some("K:CMaj".to_string())
    );

    let sustain = &understanding.chords.sustain;
    assert_eq!(sustain[0].chord.name, "C Maj");
    assert!(sustain.iter().any(|c| c.chord.name == "G Maj" && c.measure == 2));

    let assigned: usize = understanding.voices.iter().map(|v| v.notes.len()).sum();
    assert_eq!(assigned, 18);
    assert!(understanding.voices.len() >= 2);

    let report = render_report("Cadence", &understanding, None);
    assert!(report.contains("Predicted Key: C Major (74%)"));
    assert!(report.contains("Key Signature: K:CMaj"));
}

#[test]
fn key_override_drives_spelling() {
    let engine = MusicUnderstandingEngine::new();
    let options = AnalysisOptions {
        key_override: Some(KeyChoice {
            root: 6,
            mode: "Major".to_string(),
        }),
        key_spelling: SpellingPreference::Auto,
        ..AnalysisOptions::default()
    };
    let understanding = engine.understand(&cadence(), &context(), &options).unwrap();
    let spelling = understanding.spelling.unwrap();
    assert_eq!(spelling.key_label, "F#Maj");
    // the predicted key is still reported
    assert_eq!(understanding.key.unwrap().root, 0);
}

#[test]
fn invalid_key_override_is_an_error() {
    let engine = MusicUnderstandingEngine::new();
    let options = AnalysisOptions {
        key_override: Some(KeyChoice {
            root: 3,
            mode: "Bebop".to_string(),
        }),
        ..AnalysisOptions::default()
    };
    assert!(engine.understand(&cadence(), &context(), &options).is_err());
}

#[test]
fn empty_track_has_no_key() {
    let engine = MusicUnderstandingEngine::new();
    let understanding = engine
        .understand(&[], &context(), &AnalysisOptions::default())
        .unwrap();
    assert!(understanding.key.is_none());
    assert!(understanding.spelling.is_none());
    assert!(understanding.key_groups.is_empty());
    assert_eq!(understanding.chords, ChordProgressions::default());
}

#[test]
fn convert_rejects_invalid_options() {
    let engine = MusicUnderstandingEngine::new();
    let options = ConversionOptions {
        note_time_scale: -1.0,
        ..ConversionOptions::default()
    };
    let err = engine.convert(&cadence(), &context(), &options).unwrap_err();
    assert!(format!("{err:#}").contains("validating conversion options"));
}

#[test]
fn convert_then_analyze_is_deterministic() {
    init_tracing();
    let engine = MusicUnderstandingEngine::new();
    let options = ConversionOptions {
        transposition: 2,
        detect_ornaments: true,
        ..ConversionOptions::default()
    };

    let run = || {
        let output = engine.convert(&cadence(), &context(), &options).unwrap();
        let analysis = engine
            .understand(
                &output.notes,
                &output.context,
                &AnalysisOptions::from_conversion(&options),
            )
            .unwrap();
        (
            serde_json::to_string(&output).unwrap(),
            serde_json::to_string(&analysis).unwrap(),
            render_report("Cadence", &analysis, Some(&output.stats)),
        )
    };

    let first = run();
    assert_eq!(first, run());
    assert!(first.2.contains("Predicted Key: D Major"));
}

/// Delegates to the heuristics but never predicts a key.
struct NoKeyAnalyzer;

impl MusicAnalyzer for NoKeyAnalyzer {
    fn separate_voices(
        &self,
        notes: &[Note],
        context: &TrackContext,
        params: &SeparationParams,
    ) -> Vec<SeparatedVoice> {
        HeuristicAnalyzer.separate_voices(notes, context, params)
    }

    fn detect_chords(
        &self,
        notes: &[Note],
        context: &TrackContext,
        params: &ChordDetectionParams,
    ) -> ChordProgressions {
        HeuristicAnalyzer.detect_chords(notes, context, params)
    }

    fn predict_key(
        &self,
        _histogram: &[u32; 12],
        _total_notes: usize,
        _include_exotic: bool,
    ) -> Vec<KeyGroup> {
        Vec::new()
    }
}

#[test]
fn custom_analyzer_is_used() {
    let engine = MusicUnderstandingEngine::with_analyzer(Arc::new(NoKeyAnalyzer));
    let understanding = engine
        .understand(&cadence(), &context(), &AnalysisOptions::default())
        .unwrap();
    assert!(understanding.key.is_none());
    assert!(!understanding.chords.sustain.is_empty());
    assert!(render_report("Cadence", &understanding, None).contains("Undetermined"));
}

/// Remembers the notes handed to voice separation.
#[derive(Default)]
struct RecordingAnalyzer {
    seen: Mutex<Vec<Note>>,
}

impl MusicAnalyzer for RecordingAnalyzer {
    fn separate_voices(
        &self,
        notes: &[Note],
        context: &TrackContext,
        params: &SeparationParams,
    ) -> Vec<SeparatedVoice> {
        if let Ok(mut seen) = self.seen.lock() {
            *seen = notes.to_vec();
        }
        HeuristicAnalyzer.separate_voices(notes, context, params)
    }

    fn detect_chords(
        &self,
        notes: &[Note],
        context: &TrackContext,
        params: &ChordDetectionParams,
    ) -> ChordProgressions {
        HeuristicAnalyzer.detect_chords(notes, context, params)
    }

    fn predict_key(
        &self,
        histogram: &[u32; 12],
        total_notes: usize,
        include_exotic: bool,
    ) -> Vec<KeyGroup> {
        HeuristicAnalyzer.predict_key(histogram, total_notes, include_exotic)
    }
}

#[test]
fn stale_ornament_tags_are_dropped_when_detection_is_off() {
    let mut stale = make_note(64, 480, 480);
    stale.is_ornament = true;
    stale.principal_pitch = Some(60);
    stale.principal_onset_tick = Some(0);
    let notes = vec![make_note(60, 0, 480), stale, make_note(67, 480, 480)];

    let analyzer = Arc::new(RecordingAnalyzer::default());
    let engine = MusicUnderstandingEngine::with_analyzer(analyzer.clone());
    let options = AnalysisOptions {
        detect_ornaments: false,
        ..AnalysisOptions::default()
    };
    let understanding = engine.understand(&notes, &context(), &options).unwrap();

    assert!(understanding.ornaments.is_empty());
    let seen = analyzer.seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|n| !n.is_ornament && n.principal_onset_tick.is_none()));
    let third = seen.iter().find(|n| n.pitch == 64).expect("third present");
    assert_eq!(third.harmonic_onset_tick(), 480);
}
