use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{PlayerError, Result, TempoConfig};

/// A `numerator/denominator` pair as written in a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Time signature; the denominator names the note value that gets one beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub const COMMON: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

impl TryFrom<Fraction> for TimeSignature {
    type Error = PlayerError;

    fn try_from(value: Fraction) -> Result<Self> {
        if value.numerator == 0 || value.denominator == 0 {
            return Err(PlayerError::invalid(format!(
                "invalid time signature {value}: both terms must be positive"
            )));
        }
        Ok(Self::new(value.numerator, value.denominator))
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Mutable tempo state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    pub bpm: u32,
    pub signature: TimeSignature,
}

impl Default for Tempo {
    fn default() -> Self {
        Self::from(TempoConfig::default())
    }
}

impl From<TempoConfig> for Tempo {
    fn from(config: TempoConfig) -> Self {
        Self {
            bpm: config.bpm,
            signature: config.signature,
        }
    }
}

impl Tempo {
    /// Length of `length` whole notes, where one beat is one
    /// `signature.denominator`-th note at `bpm`.
    pub fn sleep_duration(&self, length: Fraction) -> Result<Duration> {
        if length.denominator == 0 {
            return Err(PlayerError::invalid(format!(
                "invalid sleep length {length}: denominator must be positive"
            )));
        }
        if self.bpm == 0 {
            return Err(PlayerError::invalid("cannot sleep at 0 bpm"));
        }

        let beats_per_minute = f64::from(self.bpm) * f64::from(length.denominator)
            / f64::from(self.signature.denominator);
        let seconds = f64::from(length.numerator) * 60.0 / beats_per_minute;
        Duration::try_from_secs_f64(seconds).map_err(|_| {
            PlayerError::invalid(format!(
                "sleep {length} at {} bpm in {} is too long",
                self.bpm, self.signature
            ))
        })
    }
}

/// Blocks the interpreter between commands.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for Box<S> {
    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Suspends the calling thread for the full duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested pauses without blocking. Clones share one log.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses
            .lock()
            .map(|pauses| pauses.clone())
            .unwrap_or_default()
    }

    /// Sum of every recorded pause.
    pub fn total(&self) -> Duration {
        self.pauses().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        if let Ok(mut pauses) = self.pauses.lock() {
            pauses.push(duration);
        }
    }
}
