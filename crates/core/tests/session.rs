use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use float_cmp::approx_eq;
use just_player_core::{
    AbortHandle, Block, Command, CommandTree, Fraction, Interpreter, MidiMessage, MidiSink,
    NoteRatio, NoteUpdate, PlayerConfig, PlayerError, RecordingSink, RecordingSleeper, Sleeper,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Midi(MidiMessage),
    Pause(Duration),
}

/// Sink and sleeper that append to one shared timeline.
#[derive(Debug, Clone, Default)]
struct Timeline {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Timeline {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl MidiSink for Timeline {
    fn send(&mut self, message: MidiMessage) {
        self.events.lock().unwrap().push(Event::Midi(message));
    }
}

impl Sleeper for Timeline {
    fn sleep(&mut self, duration: Duration) {
        self.events.lock().unwrap().push(Event::Pause(duration));
    }
}

fn timeline_session() -> (Interpreter, Timeline) {
    let timeline = Timeline::default();
    let interpreter =
        Interpreter::new(&PlayerConfig::default(), timeline.clone(), timeline.clone()).unwrap();
    (interpreter, timeline)
}

fn recording_session(config: PlayerConfig) -> (Interpreter, RecordingSink) {
    let sink = RecordingSink::new();
    let interpreter = Interpreter::new(&config, sink.clone(), RecordingSleeper::new()).unwrap();
    (interpreter, sink)
}

fn frequency(name: &str, hz: f64) -> Command {
    Command::Frequency {
        name: name.to_string(),
        hz,
    }
}

fn note(name: &str, parent: Option<&str>, octave: Option<i32>, harmonics: &[u32]) -> Command {
    Command::Note {
        name: name.to_string(),
        ratio: NoteRatio::Harmonic {
            parent: parent.map(str::to_string),
            octave,
            harmonics: harmonics.to_vec(),
        },
    }
}

fn note_on(name: &str) -> Command {
    Command::NoteOn {
        name: name.to_string(),
    }
}

fn note_off(name: &str) -> Command {
    Command::NoteOff {
        name: name.to_string(),
    }
}

fn sleep(numerator: u32, denominator: u32) -> Command {
    Command::Sleep {
        length: Fraction::new(numerator, denominator),
    }
}

#[test]
fn plays_a_note_for_a_quarter_then_releases_it() {
    let (mut interpreter, timeline) = timeline_session();
    let tree = CommandTree::from_commands([
        frequency("f", 220.0),
        note("a", Some("f"), Some(0), &[1]),
        note_on("a"),
        sleep(1, 4),
        note_off("a"),
    ]);

    interpreter.process(&tree).unwrap();
    interpreter.stop();

    assert_eq!(
        timeline.take(),
        vec![
            Event::Midi(MidiMessage::ProgramChange { channel: 0, program: 85 }),
            Event::Midi(MidiMessage::PitchWheel { channel: 0, pitch: 0 }),
            Event::Midi(MidiMessage::NoteOn { channel: 0, note: 57, velocity: 100 }),
            Event::Pause(Duration::from_millis(500)),
            Event::Midi(MidiMessage::NoteOff { channel: 0, note: 57 }),
        ]
    );
}

#[test]
fn concert_pitch_note_maps_to_a4() {
    let (mut interpreter, timeline) = timeline_session();
    let tree = CommandTree::from_commands([
        frequency("f", 440.0),
        note("a", Some("f"), Some(0), &[1]),
        note_on("a"),
    ]);

    interpreter.process(&tree).unwrap();

    assert_eq!(
        timeline.take()[2],
        Event::Midi(MidiMessage::NoteOn { channel: 0, note: 69, velocity: 100 })
    );
}

#[test]
fn second_stop_is_silent() {
    let (mut interpreter, sink) = recording_session(PlayerConfig::default());
    let tree = CommandTree::from_commands([
        frequency("f", 440.0),
        note("a", Some("f"), None, &[1]),
        note("b", Some("f"), None, &[3]),
        note_on("a"),
        note_on("b"),
    ]);
    interpreter.process(&tree).unwrap();
    sink.take();

    interpreter.stop();
    assert_eq!(
        sink.take(),
        vec![
            MidiMessage::NoteOff { channel: 0, note: 69 },
            MidiMessage::NoteOff { channel: 1, note: 76 },
        ]
    );

    interpreter.stop();
    assert!(sink.take().is_empty());
    assert!(interpreter.snapshot().channels_in_use.is_empty());
}

#[test]
fn partial_update_retriggers_with_new_harmonics_only() {
    let (mut interpreter, sink) = recording_session(PlayerConfig::default());
    interpreter
        .process(&CommandTree::from_commands([
            frequency("f", 110.0),
            note("n", Some("f"), Some(2), &[1]),
            note_on("n"),
        ]))
        .unwrap();
    sink.take();

    interpreter
        .define_note(
            "n",
            NoteUpdate {
                parent: None,
                octave: None,
                harmonics: Some(vec![5, 4]),
            },
        )
        .unwrap();

    let entry = interpreter.graph().note("n").unwrap();
    assert_eq!(entry.parent, "f");
    assert_eq!(entry.octave, 2);
    assert_eq!(entry.harmonics, vec![5, 4]);
    // 110 * 4 * 5/4 * 4/3 = 733.33 Hz, just above F#5.
    assert!(approx_eq!(
        f64,
        interpreter.graph().frequency_of("n").unwrap(),
        110.0 * 4.0 * 5.0 / 3.0,
        epsilon = 1e-9
    ));

    let messages = sink.take();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0], MidiMessage::NoteOff { channel: 0, note: 69 });
    assert!(matches!(messages[1], MidiMessage::PitchWheel { channel: 0, .. }));
    assert_eq!(
        messages[2],
        MidiMessage::NoteOn { channel: 0, note: 78, velocity: 100 }
    );
}

#[test]
fn editing_a_parent_note_retriggers_sounding_children() {
    let (mut interpreter, sink) = recording_session(PlayerConfig::default());
    interpreter
        .process(&CommandTree::from_commands([
            frequency("f", 220.0),
            note("root", Some("f"), Some(1), &[1]),
            note("child", Some("root"), None, &[3, 2]),
            note_on("child"),
        ]))
        .unwrap();
    assert_eq!(interpreter.graph().frequency_of("child").unwrap(), 1320.0);
    sink.take();

    interpreter
        .process(&CommandTree::from_commands([note("root", None, Some(0), &[1])]))
        .unwrap();

    let messages = sink.take();
    assert_eq!(messages.first(), Some(&MidiMessage::NoteOff { channel: 0, note: 88 }));
    assert_eq!(
        messages.last(),
        Some(&MidiMessage::NoteOn { channel: 0, note: 76, velocity: 100 })
    );
    assert!(!interpreter.graph().note("root").unwrap().is_sounding());
}

#[test]
fn failing_command_stops_the_walk_and_names_the_command() {
    let (mut interpreter, sink) = recording_session(PlayerConfig::default());
    let tree = CommandTree::from_commands([
        frequency("f", 220.0),
        note_on("ghost"),
        Command::Bpm { bpm: 60 },
    ]);

    let err = interpreter.process(&tree).unwrap_err();

    match &err {
        PlayerError::Command {
            position, command, ..
        } => {
            assert_eq!(*position, 2);
            assert_eq!(command, "note_on ghost");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(err.root(), PlayerError::UnknownEntity { name } if name == "ghost"));
    assert_eq!(interpreter.tempo().bpm, 120);
    assert!(interpreter.is_running());
    assert!(sink.messages().is_empty());

    // The session stays usable after a failed walk.
    interpreter
        .process(&CommandTree::from_commands([Command::Bpm { bpm: 60 }]))
        .unwrap();
    assert_eq!(interpreter.tempo().bpm, 60);
}

#[test]
fn frequencies_cannot_be_sounded() {
    let (mut interpreter, _) = recording_session(PlayerConfig::default());
    let err = interpreter
        .process(&CommandTree::from_commands([frequency("f", 220.0), note_on("f")]))
        .unwrap_err();
    assert!(matches!(err.root(), PlayerError::InvalidOperation(_)));
}

#[test]
fn new_note_without_parent_is_rejected() {
    let (mut interpreter, _) = recording_session(PlayerConfig::default());
    let err = interpreter
        .process(&CommandTree::from_commands([note("n", Some("nowhere"), None, &[3])]))
        .unwrap_err();
    assert!(matches!(err.root(), PlayerError::MissingParent { .. }));
}

#[test]
fn channel_exhaustion_is_reported() {
    let config = PlayerConfig {
        channels: 2,
        ..PlayerConfig::default()
    };
    let (mut interpreter, sink) = recording_session(config);
    let tree = CommandTree::from_commands([
        frequency("f", 220.0),
        note("a", Some("f"), None, &[1]),
        note("b", Some("f"), None, &[3]),
        note("c", Some("f"), None, &[5]),
        note_on("a"),
        note_on("b"),
        note_on("c"),
    ]);

    let err = interpreter.process(&tree).unwrap_err();

    assert!(matches!(
        err.root(),
        PlayerError::ChannelsExhausted { note, capacity: 2 } if note == "c"
    ));
    assert_eq!(sink.messages().len(), 6);
    assert!(!interpreter.graph().note("c").unwrap().is_sounding());
}

#[test]
fn malformed_fractions_are_invalid() {
    let (mut interpreter, _) = recording_session(PlayerConfig::default());
    let err = interpreter
        .process(&CommandTree::from_commands([sleep(1, 0)]))
        .unwrap_err();
    assert!(matches!(err.root(), PlayerError::InvalidOperation(_)));

    let err = interpreter
        .process(&CommandTree::from_commands([Command::Signature {
            signature: Fraction::new(3, 0),
        }]))
        .unwrap_err();
    assert!(matches!(err.root(), PlayerError::InvalidOperation(_)));
}

#[test]
fn sleep_too_long_for_a_duration_is_invalid() {
    let (mut interpreter, _) = recording_session(PlayerConfig::default());
    let tree = CommandTree::from_commands([
        Command::Bpm { bpm: 1 },
        Command::Signature {
            signature: Fraction::new(4, u32::MAX),
        },
        sleep(u32::MAX, 1),
    ]);

    let err = interpreter.process(&tree).unwrap_err();

    assert!(matches!(err, PlayerError::Command { position: 3, .. }));
    assert!(matches!(err.root(), PlayerError::InvalidOperation(_)));
}

#[test]
fn notes_and_frequencies_cannot_share_a_name() {
    let (mut interpreter, _) = recording_session(PlayerConfig::default());
    let err = interpreter
        .process(&CommandTree::from_commands([
            frequency("a", 220.0),
            note("a", Some("a"), None, &[1]),
        ]))
        .unwrap_err();
    assert!(matches!(err, PlayerError::Command { position: 2, .. }));
    assert!(matches!(err.root(), PlayerError::InvalidOperation(_)));

    let err = interpreter
        .process(&CommandTree::from_commands([
            note("b", Some("a"), None, &[3]),
            frequency("b", 330.0),
        ]))
        .unwrap_err();
    assert!(matches!(err.root(), PlayerError::InvalidOperation(_)));
    assert!(interpreter.graph().frequency("b").is_none());
    assert!(approx_eq!(
        f64,
        interpreter.graph().frequency_of("b").unwrap(),
        660.0,
        epsilon = 1e-9
    ));
}

#[test]
fn unknown_and_sync_commands_are_skipped() {
    let (mut interpreter, sink) = recording_session(PlayerConfig::default());
    let tree = CommandTree::from_json(
        r#"{ "blocks": [
            { "line": { "kind": "sync" } },
            { "line": { "kind": "vibrato", "depth": 2 } },
            { "multiline": [ { "kind": "bpm", "bpm": 96 }, null ] }
        ] }"#,
    )
    .unwrap();

    interpreter.process(&tree).unwrap();

    assert_eq!(interpreter.tempo().bpm, 96);
    assert!(sink.messages().is_empty());
}

#[test]
fn per_note_program_overrides_default() {
    let (mut interpreter, sink) = recording_session(PlayerConfig::default());
    let tree = CommandTree::new(vec![
        Block::multiline([
            frequency("f", 220.0),
            note("a", Some("f"), None, &[1]),
            note("b", Some("f"), None, &[1]),
        ]),
        Block::multiline([
            Command::Program {
                program: 40,
                names: vec!["a".to_string()],
            },
            Command::Program {
                program: 7,
                names: Vec::new(),
            },
            note_on("a"),
            note_on("b"),
        ]),
    ]);

    interpreter.process(&tree).unwrap();

    let programs: Vec<MidiMessage> = sink
        .messages()
        .into_iter()
        .filter(|message| matches!(message, MidiMessage::ProgramChange { .. }))
        .collect();
    assert_eq!(
        programs,
        vec![
            MidiMessage::ProgramChange { channel: 0, program: 40 },
            MidiMessage::ProgramChange { channel: 1, program: 7 },
        ]
    );
}

#[test]
fn tempo_and_signature_shape_sleep_length() {
    let sleeper = RecordingSleeper::new();
    let mut interpreter =
        Interpreter::new(&PlayerConfig::default(), RecordingSink::new(), sleeper.clone()).unwrap();
    let tree = CommandTree::from_commands([
        Command::Bpm { bpm: 60 },
        Command::Signature {
            signature: Fraction::new(6, 8),
        },
        sleep(3, 8),
        sleep(1, 1),
    ]);

    interpreter.process(&tree).unwrap();

    assert_eq!(
        sleeper.pauses(),
        vec![Duration::from_secs(3), Duration::from_secs(8)]
    );
}

/// Aborts the walk the first time the score pauses.
#[derive(Clone, Default)]
struct AbortOnPause {
    handle: Arc<Mutex<Option<AbortHandle>>>,
}

impl Sleeper for AbortOnPause {
    fn sleep(&mut self, _duration: Duration) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[test]
fn abort_during_a_multiline_block_skips_the_rest() {
    let sleeper = AbortOnPause::default();
    let mut interpreter =
        Interpreter::new(&PlayerConfig::default(), RecordingSink::new(), sleeper.clone()).unwrap();
    *sleeper.handle.lock().unwrap() = Some(interpreter.abort_handle());

    let tree = CommandTree::new(vec![
        Block::multiline([Command::Bpm { bpm: 90 }, sleep(1, 4), Command::Bpm { bpm: 60 }]),
        Block::multiline([Command::Bpm { bpm: 30 }]),
    ]);
    interpreter.process(&tree).unwrap();

    assert_eq!(interpreter.tempo().bpm, 90);
    assert!(!interpreter.is_running());

    // A new walk re-arms the flag.
    interpreter
        .process(&CommandTree::from_commands([Command::Bpm { bpm: 70 }]))
        .unwrap();
    assert_eq!(interpreter.tempo().bpm, 70);
    assert!(interpreter.is_running());
}
