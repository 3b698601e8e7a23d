use serde::{Deserialize, Serialize};

/// Default resolution used when a source reports zero ticks per quarter.
pub const DEFAULT_PPQ: u16 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Ticks in one beat of this meter (a denominator-note), as a float.
    ///
    /// Zero when the denominator is zero.
    pub fn ticks_per_beat(&self, ppq: u16) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        ppq as f64 * 4.0 / self.denominator as f64
    }

    /// Ticks in one full measure, as a float.
    pub fn ticks_per_measure(&self, ppq: u16) -> f64 {
        self.ticks_per_beat(ppq) * self.numerator as f64
    }

    /// Tick range `[start, end)` covered by an inclusive 1-based measure range.
    pub fn measure_range_ticks(&self, ppq: u16, start_measure: u32, end_measure: u32) -> (u64, u64) {
        let per_measure = self.ticks_per_measure(ppq);
        let start = (start_measure.max(1) - 1) as f64 * per_measure;
        let end = end_measure as f64 * per_measure;
        (start.round() as u64, end.round().max(0.0) as u64)
    }

    /// 1-based measure containing `tick`.
    pub fn measure_at(&self, tick: u64, ppq: u16) -> u32 {
        let per_measure = self.ticks_per_measure(ppq);
        if per_measure <= 0.0 {
            return 1;
        }
        (tick as f64 / per_measure).floor() as u32 + 1
    }
}

/// Track metadata delivered alongside the note list by the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackContext {
    pub ppq: u16,
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
}

impl Default for TrackContext {
    fn default() -> Self {
        Self {
            ppq: DEFAULT_PPQ,
            tempo_bpm: 120.0,
            time_signature: TimeSignature::default(),
        }
    }
}

impl TrackContext {
    pub fn new(ppq: u16, tempo_bpm: f64, time_signature: TimeSignature) -> Self {
        Self {
            ppq,
            tempo_bpm,
            time_signature,
        }
    }

    /// Ticks per quarter, substituting the default for a zero header value.
    pub fn effective_ppq(&self) -> u16 {
        if self.ppq == 0 {
            DEFAULT_PPQ
        } else {
            self.ppq
        }
    }

    pub fn ticks_per_measure(&self) -> f64 {
        self.time_signature.ticks_per_measure(self.effective_ppq())
    }

    /// "Meas 3 | Beat 2.50" for a tick position.
    pub fn format_time(&self, tick: u64) -> String {
        format_time(tick, self.effective_ppq(), self.time_signature)
    }
}

/// Human-readable position: 1-based measure and beat plus the fractional beat.
///
/// The position is rounded once, to hundredths of a beat, and the rounding
/// carries into the beat and measure: a tick just before beat 2 reads
/// "Beat 2.00", never "Beat 1.00". Degenerate meters (zero numerator or
/// denominator) render as measure 1, beat 1.
pub fn format_time(tick: u64, ppq: u16, time_signature: TimeSignature) -> String {
    let per_beat = time_signature.ticks_per_beat(ppq);
    let beats_per_measure = time_signature.numerator as u64;
    if per_beat <= 0.0 || beats_per_measure == 0 {
        return "Meas 1 | Beat 1.00".to_string();
    }

    let hundredths = (tick as f64 / per_beat * 100.0).round() as u64;
    let beats = hundredths / 100;
    format!(
        "Meas {} | Beat {}.{:02}",
        beats / beats_per_measure + 1,
        beats % beats_per_measure + 1,
        hundredths % 100
    )
}
