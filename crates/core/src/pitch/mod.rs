//! Exact rational pitch arithmetic.
//!
//! A note is tuned relative to its parent by a chain of harmonic steps and an
//! octave shift. Step `h` moves from harmonic `h - 1` to harmonic `h` of an
//! overtone series and contributes `h / max(1, h - 1)`; a bare step of 1 is
//! unison.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{PlayerError, Result};

/// Exact multiplier `2^octave * numerator / denominator` relative to a parent.
///
/// The ratio part is kept reduced. The octave is stored separately so that
/// large shifts never inflate the integer terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RationalPitch {
    numerator: u128,
    denominator: u128,
    octave: i32,
}

impl RationalPitch {
    pub const UNISON: RationalPitch = RationalPitch {
        numerator: 1,
        denominator: 1,
        octave: 0,
    };

    /// Composes a harmonic chain and an octave shift into one multiplier.
    ///
    /// Fails when the chain is empty, contains a zero step, or the reduced
    /// terms no longer fit in 128 bits.
    pub fn compose(harmonics: &[u32], octave: i32) -> Result<Self> {
        if harmonics.is_empty() {
            return Err(PlayerError::invalid("harmonic chain must not be empty"));
        }

        let mut pitch = Self {
            octave,
            ..Self::UNISON
        };
        for &step in harmonics {
            if step == 0 {
                return Err(PlayerError::invalid("harmonic steps must be at least 1"));
            }
            let step = u128::from(step);
            pitch = pitch.scaled(step, (step - 1).max(1))?;
        }
        Ok(pitch)
    }

    fn scaled(self, numerator: u128, denominator: u128) -> Result<Self> {
        let overflow = || PlayerError::invalid("harmonic chain is too long to represent exactly");
        let numerator = self.numerator.checked_mul(numerator).ok_or_else(overflow)?;
        let denominator = self
            .denominator
            .checked_mul(denominator)
            .ok_or_else(overflow)?;
        let divisor = gcd(numerator, denominator);
        Ok(Self {
            numerator: numerator / divisor,
            denominator: denominator / divisor,
            octave: self.octave,
        })
    }

    pub fn numerator(&self) -> u128 {
        self.numerator
    }

    pub fn denominator(&self) -> u128 {
        self.denominator
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// Floating point value of the multiplier.
    pub fn to_f64(&self) -> f64 {
        2f64.powi(self.octave) * self.numerator as f64 / self.denominator as f64
    }

    /// Applies the multiplier to a parent frequency.
    pub fn apply(&self, parent_hz: f64) -> f64 {
        parent_hz * self.to_f64()
    }
}

impl Default for RationalPitch {
    fn default() -> Self {
        Self::UNISON
    }
}

impl fmt::Display for RationalPitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)?;
        if self.octave != 0 {
            write!(f, " * 2^{}", self.octave)?;
        }
        Ok(())
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}
