use std::{
    fmt,
    io::Write,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};

/// Messages the player emits towards the sound device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MidiMessage {
    ProgramChange { channel: u8, program: u8 },
    PitchWheel { channel: u8, pitch: i16 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
}

impl MidiMessage {
    pub fn channel(&self) -> u8 {
        match *self {
            Self::ProgramChange { channel, .. }
            | Self::PitchWheel { channel, .. }
            | Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramChange { channel, program } => {
                write!(f, "program_change channel={channel} program={program}")
            }
            Self::PitchWheel { channel, pitch } => {
                write!(f, "pitchwheel channel={channel} pitch={pitch}")
            }
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => write!(f, "note_on channel={channel} note={note} velocity={velocity}"),
            Self::NoteOff { channel, note } => write!(f, "note_off channel={channel} note={note}"),
        }
    }
}

/// Outbound device channel. Calls are fire-and-forget: a sink never reports
/// failure back to the player.
pub trait MidiSink {
    fn send(&mut self, message: MidiMessage);
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn send(&mut self, message: MidiMessage) {
        (**self).send(message);
    }
}

/// Keeps every message in memory. Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<MidiMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<MidiMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Returns and clears the recorded messages.
    pub fn take(&self) -> Vec<MidiMessage> {
        self.messages
            .lock()
            .map(|mut messages| std::mem::take(&mut *messages))
            .unwrap_or_default()
    }
}

impl MidiSink for RecordingSink {
    fn send(&mut self, message: MidiMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

/// Logs each message through `tracing` and drops it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MidiSink for TracingSink {
    fn send(&mut self, message: MidiMessage) {
        tracing::info!(%message, "midi out");
    }
}

/// Writes one JSON object per message, for piping into a device bridge.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MidiSink for JsonLinesSink<W> {
    fn send(&mut self, message: MidiMessage) {
        let written = serde_json::to_writer(&mut self.writer, &message)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush());
        if let Err(err) = written {
            tracing::warn!(%message, error = %err, "failed to write midi message");
        }
    }
}
