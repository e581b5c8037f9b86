use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    Block, ChannelRegistry, Command, CommandTree, EntityGraph, Fraction, Line, MidiSink,
    NoteDefinition, NoteUpdate, PitchQuantizer, PlaybackEngine, PlayerConfig, PlayerError,
    Result, Sleeper, Sound, Tempo, TimeSignature,
};

/// Clears the running flag of an [`Interpreter`] from outside the walk.
///
/// The walker checks the flag before every line, so an abort takes effect
/// between commands.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    running: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// One player session: the entity graph, tempo state and output channels.
///
/// All calls run on the caller's thread, one command at a time.
pub struct Interpreter {
    graph: EntityGraph,
    engine: PlaybackEngine,
    tempo: Tempo,
    default_program: u8,
    sleeper: Box<dyn Sleeper>,
    running: Arc<AtomicBool>,
}

impl Interpreter {
    pub fn new(
        config: &PlayerConfig,
        sink: impl MidiSink + 'static,
        sleeper: impl Sleeper + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let engine = PlaybackEngine::new(
            ChannelRegistry::new(config.channels),
            PitchQuantizer::new(config.quantizer),
            Box::new(sink),
            config.velocity,
        );
        Ok(Self {
            graph: EntityGraph::new(),
            engine,
            tempo: Tempo::from(config.tempo),
            default_program: config.default_program,
            sleeper: Box::new(sleeper),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn default_program(&self) -> u8 {
        self.default_program
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            running: self.running.clone(),
        }
    }

    /// Walks a command tree in document order.
    ///
    /// Stops at the first failing command and returns its error wrapped with
    /// the command's position. The running flag stays set afterwards; it is
    /// only cleared through an [`AbortHandle`], which makes the walk return
    /// early before its next line.
    pub fn process(&mut self, tree: &CommandTree) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        let mut position = 0;
        for block in &tree.blocks {
            let lines = match block {
                Block::Line(line) => std::slice::from_ref(line),
                Block::Multiline(lines) => lines.as_slice(),
            };
            for line in lines {
                if !self.is_running() {
                    tracing::info!(position, "walk aborted");
                    return Ok(());
                }
                position += 1;
                if let Line::Command(command) = line {
                    self.execute(command)
                        .map_err(|source| PlayerError::Command {
                            position,
                            command: command.to_string(),
                            source: Box::new(source),
                        })?;
                }
            }
        }
        Ok(())
    }

    /// Applies a single command.
    pub fn execute(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::Bpm { bpm } => self.set_bpm(*bpm),
            Command::Signature { signature } => self.set_signature(*signature),
            Command::Program { program, names } => self.set_program(*program, names),
            Command::Frequency { name, hz } => self.define_frequency(name, *hz),
            Command::Note { name, ratio } => self.define_note(name, ratio.clone().into()),
            Command::NoteOn { name } => self.note_on(name),
            Command::NoteOff { name } => self.note_off(name),
            Command::Sleep { length } => self.sleep(*length),
            Command::Sync => {
                tracing::info!("sync");
                Ok(())
            }
            Command::Unknown { kind } => {
                tracing::warn!(kind = kind.as_str(), "skipping unknown command");
                Ok(())
            }
        }
    }

    pub fn set_bpm(&mut self, bpm: u32) -> Result<()> {
        if bpm == 0 {
            return Err(PlayerError::invalid("bpm must be positive"));
        }
        tracing::info!(bpm, "setting tempo");
        self.tempo.bpm = bpm;
        Ok(())
    }

    pub fn set_signature(&mut self, signature: Fraction) -> Result<()> {
        let signature = TimeSignature::try_from(signature)?;
        tracing::info!(%signature, "setting signature");
        self.tempo.signature = signature;
        Ok(())
    }

    /// Sets the session default program, or the override of each named note.
    /// Overrides apply from the next fresh note-on.
    pub fn set_program(&mut self, program: u8, names: &[String]) -> Result<()> {
        if program > 127 {
            return Err(PlayerError::invalid(format!(
                "program {program} is outside 0..=127"
            )));
        }
        if names.is_empty() {
            tracing::info!(program, "setting default program");
            self.default_program = program;
            return Ok(());
        }
        for name in names {
            tracing::info!(name = name.as_str(), program, "setting note program");
            self.graph.set_program(name, program)?;
        }
        Ok(())
    }

    /// Defines or replaces a frequency and retriggers any sounding note
    /// tuned from it. The old value is kept when a sounding dependent
    /// cannot be played at its new pitch.
    pub fn define_frequency(&mut self, name: &str, hz: f64) -> Result<()> {
        tracing::info!(name, hz, "setting frequency");
        let previous = self.graph.define_frequency(name, hz)?;
        if let Err(err) = self.check_retrigger(name, false) {
            self.graph.restore_frequency(name, previous);
            return Err(err);
        }
        self.retrigger_dependents(name)
    }

    /// Creates a note or partially updates an existing one. A sounding note,
    /// and every sounding note tuned from it, is replayed at its new pitch.
    /// An update that would leave any of them unplayable is undone before
    /// anything is sent.
    pub fn define_note(&mut self, name: &str, update: NoteUpdate) -> Result<()> {
        tracing::info!(
            name,
            parent = ?update.parent,
            octave = ?update.octave,
            harmonics = ?update.harmonics,
            "defining note"
        );
        match self.graph.define_note(name, update)? {
            NoteDefinition::Created => Ok(()),
            NoteDefinition::Updated { previous } => {
                let sounding = previous.is_sounding();
                if let Err(err) = self.check_retrigger(name, sounding) {
                    self.graph.restore_note(name, previous);
                    return Err(err);
                }
                if sounding {
                    self.engine
                        .play(&mut self.graph, name, self.default_program)?;
                }
                self.retrigger_dependents(name)
            }
        }
    }

    /// Fails if the edited entity, when `sounding`, or any sounding note
    /// tuned from it has no device pitch.
    fn check_retrigger(&self, name: &str, sounding: bool) -> Result<()> {
        if sounding {
            self.engine.quantize(&self.graph, name)?;
        }
        for dependent in self.graph.dependents_of(name) {
            if self.graph.note(&dependent)?.is_sounding() {
                self.engine.quantize(&self.graph, &dependent)?;
            }
        }
        Ok(())
    }

    fn retrigger_dependents(&mut self, name: &str) -> Result<()> {
        for dependent in self.graph.dependents_of(name) {
            if self.graph.note(&dependent)?.is_sounding() {
                tracing::debug!(
                    name,
                    dependent = dependent.as_str(),
                    "retriggering dependent note"
                );
                self.engine
                    .play(&mut self.graph, &dependent, self.default_program)?;
            }
        }
        Ok(())
    }

    pub fn note_on(&mut self, name: &str) -> Result<()> {
        tracing::info!(name, "note on");
        self.engine
            .play(&mut self.graph, name, self.default_program)
    }

    pub fn note_off(&mut self, name: &str) -> Result<()> {
        tracing::info!(name, "note off");
        self.engine.stop(&mut self.graph, name)
    }

    /// Blocks for `length` whole notes at the current tempo.
    pub fn sleep(&mut self, length: Fraction) -> Result<()> {
        let duration = self.tempo.sleep_duration(length)?;
        tracing::info!(%length, ?duration, "sleeping");
        self.sleeper.sleep(duration);
        Ok(())
    }

    /// Silences every note. Safe to call repeatedly.
    pub fn stop(&mut self) {
        tracing::info!("stopping all notes");
        self.engine.stop_all(&mut self.graph);
    }

    /// Serialisable view of the whole session.
    pub fn snapshot(&self) -> SessionSnapshot {
        let quantizer = self.engine.quantizer();
        let frequencies = self
            .graph
            .frequency_names()
            .into_iter()
            .filter_map(|name| {
                self.graph
                    .frequency(&name)
                    .map(|frequency| FrequencySnapshot {
                        hz: frequency.hz,
                        name,
                    })
            })
            .collect();
        let notes = self
            .graph
            .notes()
            .map(|(name, note)| {
                let hz = self.graph.frequency_of(name).ok();
                let sounding_hz = note.sound.and_then(|sound| {
                    let quantized = quantizer.to_note_and_bend(hz?).ok()?;
                    Some(quantizer.to_frequency(sound.note, quantized.bend))
                });
                NoteSnapshot {
                    name: name.to_string(),
                    parent: note.parent.clone(),
                    octave: note.octave,
                    harmonics: note.harmonics.clone(),
                    program: note.program,
                    hz,
                    sound: note.sound,
                    sounding_hz,
                }
            })
            .collect();

        SessionSnapshot {
            tempo: self.tempo,
            default_program: self.default_program,
            frequencies,
            notes,
            channels_in_use: self.engine.channels().allocated(),
        }
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("graph", &self.graph)
            .field("engine", &self.engine)
            .field("tempo", &self.tempo)
            .field("default_program", &self.default_program)
            .field("running", &self.is_running())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub tempo: Tempo,
    pub default_program: u8,
    pub frequencies: Vec<FrequencySnapshot>,
    pub notes: Vec<NoteSnapshot>,
    pub channels_in_use: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencySnapshot {
    pub name: String,
    pub hz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSnapshot {
    pub name: String,
    pub parent: String,
    pub octave: i32,
    pub harmonics: Vec<u32>,
    pub program: Option<u8>,
    /// Exact target frequency.
    pub hz: Option<f64>,
    pub sound: Option<Sound>,
    /// Frequency the device is producing for the current sound.
    pub sounding_hz: Option<f64>,
}
