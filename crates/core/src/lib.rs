//! Core library of the just-intonation score player.
//!
//! Scores describe pitches as exact harmonic ratios of named frequencies and
//! notes. The [`Interpreter`] walks a parsed [`CommandTree`], keeps the
//! [`EntityGraph`] of named pitches, and drives a MIDI-style [`MidiSink`] that
//! only understands note numbers plus pitch bend.

pub mod channels;
pub mod config;
pub mod error;
pub mod graph;
pub mod interpreter;
pub mod pitch;
pub mod playback;
pub mod quantize;
pub mod score;
pub mod sink;
pub mod timeline;

pub use channels::ChannelRegistry;
pub use config::{PlayerConfig, QuantizerConfig, TempoConfig, MAX_CHANNELS};
pub use error::{PlayerError, Result};
pub use graph::{Entity, EntityGraph, Frequency, Note, NoteDefinition, NoteUpdate, Sound};
pub use interpreter::{AbortHandle, FrequencySnapshot, Interpreter, NoteSnapshot, SessionSnapshot};
pub use pitch::RationalPitch;
pub use playback::PlaybackEngine;
pub use quantize::{PitchQuantizer, Quantized};
pub use score::{Block, Command, CommandTree, JsonTreeParser, Line, NoteRatio, ScoreParser};
pub use sink::{JsonLinesSink, MidiMessage, MidiSink, RecordingSink, TracingSink};
pub use timeline::{Fraction, RecordingSleeper, Sleeper, Tempo, ThreadSleeper, TimeSignature};
