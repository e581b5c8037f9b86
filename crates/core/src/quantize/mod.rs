use crate::{PlayerError, QuantizerConfig, Result};

/// Highest note number a MIDI device accepts.
pub const MAX_NOTE: i32 = 127;

/// A frequency expressed as the nearest equal-tempered note plus a bend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantized {
    pub note: u8,
    /// Signed wheel offset. Not clamped: a value outside the device range
    /// means the requested pitch cannot be reached from `note`.
    pub bend: i32,
}

/// Converts absolute frequencies to `(note, bend)` pairs and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct PitchQuantizer {
    config: QuantizerConfig,
}

impl PitchQuantizer {
    pub fn new(config: QuantizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuantizerConfig {
        &self.config
    }

    /// Equal-tempered frequency of a note number.
    pub fn equal_tempered(&self, note: i32) -> f64 {
        self.config.a4_hz * 2f64.powf(f64::from(note - self.config.a4_note) / 12.0)
    }

    /// Bend units per octave of deviation.
    fn bend_per_octave(&self) -> f64 {
        f64::from(self.config.bend_range) * 12.0 / self.config.bend_semitones
    }

    pub fn to_note_and_bend(&self, frequency: f64) -> Result<Quantized> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(PlayerError::invalid(format!(
                "cannot quantize non-positive frequency {frequency} Hz"
            )));
        }

        let semitones = (frequency / self.config.a4_hz).log2() * 12.0;
        let note = semitones.round() as i32 + self.config.a4_note;
        if !(0..=MAX_NOTE).contains(&note) {
            return Err(PlayerError::invalid(format!(
                "{frequency:.3} Hz is outside the device note range"
            )));
        }

        let deviation = (frequency / self.equal_tempered(note)).log2();
        let bend = (self.bend_per_octave() * deviation).round() as i32;
        Ok(Quantized {
            note: note as u8,
            bend,
        })
    }

    /// Frequency the device produces for a note played with a bend.
    pub fn to_frequency(&self, note: u8, bend: i32) -> f64 {
        self.equal_tempered(i32::from(note)) * 2f64.powf(f64::from(bend) / self.bend_per_octave())
    }

    /// Whether a bend value can be sent to the device unchanged.
    pub fn bend_in_range(&self, bend: i32) -> bool {
        (-self.config.bend_range..self.config.bend_range).contains(&bend)
    }
}
