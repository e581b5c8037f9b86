use crate::{
    ChannelRegistry, EntityGraph, MidiMessage, MidiSink, PitchQuantizer, PlayerError, Quantized,
    Result, Sound,
};

/// Turns note state transitions into ordered device messages.
pub struct PlaybackEngine {
    channels: ChannelRegistry,
    quantizer: PitchQuantizer,
    sink: Box<dyn MidiSink>,
    velocity: u8,
}

impl PlaybackEngine {
    pub fn new(
        channels: ChannelRegistry,
        quantizer: PitchQuantizer,
        sink: Box<dyn MidiSink>,
        velocity: u8,
    ) -> Self {
        Self {
            channels,
            quantizer,
            sink,
            velocity,
        }
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn quantizer(&self) -> &PitchQuantizer {
        &self.quantizer
    }

    /// Sounds a note, or retriggers it on its current channel when it is
    /// already sounding.
    ///
    /// A fresh note gets the lowest free channel and a program change; a
    /// retrigger sends note-off and keeps the channel and program. Pitch bend
    /// always precedes note-on. Nothing is sent when the pitch cannot be
    /// resolved or no channel is free.
    pub fn play(&mut self, graph: &mut EntityGraph, name: &str, default_program: u8) -> Result<()> {
        let frequency = graph.frequency_of(name)?;
        let Quantized { note, bend } = self.quantize(graph, name)?;
        let pitch = self.device_bend(name, bend);
        let entry = graph.note_mut(name)?;

        let channel = match entry.sound {
            Some(sound) => {
                self.send(MidiMessage::NoteOff {
                    channel: sound.channel,
                    note: sound.note,
                });
                sound.channel
            }
            None => {
                let channel =
                    self.channels
                        .allocate()
                        .ok_or_else(|| PlayerError::ChannelsExhausted {
                            note: name.to_string(),
                            capacity: self.channels.capacity(),
                        })?;
                let program = entry.program.unwrap_or(default_program);
                self.send(MidiMessage::ProgramChange { channel, program });
                channel
            }
        };

        tracing::debug!(name, frequency, channel, note, bend, "sounding note");
        entry.sound = Some(Sound {
            channel,
            note,
            velocity: self.velocity,
        });
        self.send(MidiMessage::PitchWheel { channel, pitch });
        self.send(MidiMessage::NoteOn {
            channel,
            note,
            velocity: self.velocity,
        });
        Ok(())
    }

    /// Device note and bend for the current pitch of `name`.
    pub fn quantize(&self, graph: &EntityGraph, name: &str) -> Result<Quantized> {
        self.quantizer.to_note_and_bend(graph.frequency_of(name)?)
    }

    /// Silences a note and releases its channel. Silent notes are left alone.
    pub fn stop(&mut self, graph: &mut EntityGraph, name: &str) -> Result<()> {
        let Some(sound) = graph.note_mut(name)?.sound.take() else {
            return Ok(());
        };
        self.send(MidiMessage::NoteOff {
            channel: sound.channel,
            note: sound.note,
        });
        self.channels.free(sound.channel);
        Ok(())
    }

    /// Silences every note in the graph.
    pub fn stop_all(&mut self, graph: &mut EntityGraph) {
        for name in graph.note_names() {
            if let Err(err) = self.stop(graph, &name) {
                tracing::warn!(name = name.as_str(), error = %err, "failed to stop note");
            }
        }
    }

    /// Clamps a bend into what the wheel accepts. Only pitches further than
    /// half the bend span from a tempered note are affected.
    fn device_bend(&self, name: &str, bend: i32) -> i16 {
        let range = self.quantizer.config().bend_range;
        let clamped = bend
            .clamp(-range, range - 1)
            .clamp(i32::from(i16::MIN), i32::from(i16::MAX));
        if clamped != bend {
            tracing::warn!(name, bend, clamped, "pitch bend exceeds device range");
        }
        clamped as i16
    }

    fn send(&mut self, message: MidiMessage) {
        tracing::debug!(%message, "sending to device");
        self.sink.send(message);
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("channels", &self.channels)
            .field("quantizer", &self.quantizer)
            .field("velocity", &self.velocity)
            .finish()
    }
}
