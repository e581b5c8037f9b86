use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PlayerError, Result, TimeSignature};

/// Channels addressable by a 4-bit MIDI channel number.
pub const MAX_CHANNELS: usize = 16;

/// Top-level configuration structure for a player session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Number of output channels the device exposes.
    pub channels: usize,
    /// Program sent on note-on when a note has no override.
    pub default_program: u8,
    pub velocity: u8,
    pub tempo: TempoConfig,
    pub quantizer: QuantizerConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            channels: 16,
            default_program: 85,
            velocity: 100,
            tempo: TempoConfig::default(),
            quantizer: QuantizerConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(PlayerError::invalid("config: at least one channel is required"));
        }
        if self.channels > MAX_CHANNELS {
            return Err(PlayerError::invalid(format!(
                "config: {} channels requested, the device has at most {MAX_CHANNELS}",
                self.channels
            )));
        }
        if self.default_program > 127 || self.velocity > 127 {
            return Err(PlayerError::invalid(
                "config: program and velocity must be within 0..=127",
            ));
        }
        if self.tempo.bpm == 0 {
            return Err(PlayerError::invalid("config: bpm must be positive"));
        }
        if self.tempo.signature.numerator == 0 || self.tempo.signature.denominator == 0 {
            return Err(PlayerError::invalid(
                "config: signature terms must be positive",
            ));
        }
        self.quantizer.validate()
    }
}

/// Initial tempo state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub bpm: u32,
    pub signature: TimeSignature,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            bpm: 120,
            signature: TimeSignature::COMMON,
        }
    }
}

/// Reference pitch and pitch-bend geometry of the output device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizerConfig {
    pub a4_hz: f64,
    pub a4_note: i32,
    /// Signed bend resolution; the wheel spans `[-bend_range, bend_range)`.
    pub bend_range: i32,
    /// Total bend span in semitones, centred at zero.
    pub bend_semitones: f64,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            a4_hz: 440.0,
            a4_note: 69,
            bend_range: 1 << 13,
            bend_semitones: 2.0,
        }
    }
}

impl QuantizerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.a4_hz.is_finite() && self.a4_hz > 0.0) {
            return Err(PlayerError::invalid("config: a4_hz must be positive"));
        }
        if !(self.bend_semitones.is_finite() && self.bend_semitones > 0.0) {
            return Err(PlayerError::invalid(
                "config: bend_semitones must be positive",
            ));
        }
        if self.bend_range <= 0 {
            return Err(PlayerError::invalid("config: bend_range must be positive"));
        }
        Ok(())
    }
}
