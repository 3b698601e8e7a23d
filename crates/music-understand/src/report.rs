use crate::pipeline::TransformStats;
use crate::types::{ChordEvent, MusicUnderstanding};

fn chord_section(number: u8, title: &str, events: &[ChordEvent]) -> String {
    let mut out = format!("{}. {}\n", number, title);
    if events.is_empty() {
        out.push_str("No chords detected.\n");
        return out;
    }
    for event in events {
        out.push_str(&format!(
            "{:<20}: {:<20} [{}]",
            event.formatted_time,
            event.chord.name,
            event.constituent_note_names.join(", ")
        ));
        if !event.chord.missing_notes.is_empty() {
            out.push_str(&format!(" (Missing: {})", event.chord.missing_notes.join(", ")));
        }
        out.push('\n');
    }
    out
}

fn interval_label(step: i32) -> String {
    match step {
        0 => "Unison".to_string(),
        s if s > 0 => format!("+{}", s),
        s => s.to_string(),
    }
}

/// Plain-text harmonic analysis of one track.
///
/// `impact` adds a summary of what a conversion changed. The output has no
/// timestamp, so the same analysis always renders the same text.
pub fn render_report(
    track_name: &str,
    understanding: &MusicUnderstanding,
    impact: Option<&TransformStats>,
) -> String {
    let mut out = String::new();

    out.push_str("HARMONIC ANALYSIS REPORT\n");
    out.push_str(&format!("Track: {}\n", track_name));
    out.push_str(&format!("{}\n\n", "-".repeat(50)));

    if let Some(t) = impact {
        out.push_str("0. PROCESSING IMPACT SUMMARY (Based on current settings)\n");
        out.push_str(&format!(
            "   Input Notes: {} -> Output Notes: {}\n",
            t.total_notes_input, t.total_notes_output
        ));
        out.push_str(&format!(
            "   - Quantization: {} notes shifted (Avg Error: {} ticks)\n",
            t.notes_quantized,
            t.average_shift_ticks.round()
        ));
        out.push_str(&format!(
            "   - Duration Filtering: {} notes removed (too short)\n",
            t.notes_removed_short
        ));
        out.push_str(&format!(
            "   - Overlap Pruning: {} notes removed, {} shortened\n",
            t.notes_removed_overlap, t.notes_truncated_overlap
        ));
        if t.notes_cropped > 0 {
            out.push_str(&format!("   - Range Crop: {} notes outside the range\n", t.notes_cropped));
        }
        out.push('\n');
    }

    let rhythm = &understanding.rhythm;
    out.push_str("1. RHYTHMIC ANALYSIS\n");
    out.push_str(&format!("Detected Grid: {}\n", rhythm.detected_grid_type));
    out.push_str("Note Breakdown:\n");
    for (i, stat) in rhythm.top_note_values.iter().enumerate() {
        out.push_str(&format!(
            "  {}. {} ({}%) - {} notes\n",
            i + 1,
            stat.name,
            stat.percentage.round(),
            stat.count
        ));
    }

    out.push_str("\n2. KEY & HARMONY\n");
    match &understanding.key {
        Some(key) => out.push_str(&format!(
            "Predicted Key: {} ({}%)\n",
            key.label(),
            (key.score * 100.0).round()
        )),
        None => out.push_str("Predicted Key: Undetermined\n"),
    }
    if let Some(spelling) = &understanding.spelling {
        out.push_str(&format!("Key Signature: {}\n", spelling.key_field()));
    }
    out.push('\n');

    let chords = &understanding.chords;
    out.push_str(&chord_section(3, "CHORD PROGRESSION (Sustain)", &chords.sustain));
    out.push('\n');
    out.push_str(&chord_section(3, "CHORD PROGRESSION (Attacks)", &chords.attack));
    if !chords.hybrid.is_empty() {
        out.push('\n');
        out.push_str(&chord_section(3, "CHORD PROGRESSION (Hybrid / Arpeggio)", &chords.hybrid));
    }
    if !chords.bucketed.is_empty() {
        out.push('\n');
        out.push_str(&chord_section(
            3,
            "CHORD PROGRESSION (Harmonic Rhythm Normalized)",
            &chords.bucketed,
        ));
    }

    out.push_str("\n4. VOICE LEADING\n");
    for (step, count) in &understanding.voice_intervals {
        out.push_str(&format!("  {:<8}: {}\n", interval_label(*step), count));
    }

    out
}
