//! Command tree handed to the interpreter by an external score parser.

use std::fmt;

use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};

use crate::{Fraction, NoteUpdate, Result};

/// Ordered top-level blocks of a parsed score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandTree {
    pub blocks: Vec<Block>,
}

impl CommandTree {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// One single-line block per command.
    pub fn from_commands(commands: impl IntoIterator<Item = Command>) -> Self {
        Self::new(
            commands
                .into_iter()
                .map(|command| Block::Line(Line::Command(command)))
                .collect(),
        )
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Number of lines across all blocks.
    pub fn line_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|block| match block {
                Block::Line(_) => 1,
                Block::Multiline(lines) => lines.len(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    Line(Line),
    /// Group of lines written as one block in the score.
    Multiline(Vec<Line>),
}

impl Block {
    pub fn multiline(commands: impl IntoIterator<Item = Command>) -> Self {
        Self::Multiline(commands.into_iter().map(Line::Command).collect())
    }
}

/// A score line: a command, or nothing (blank lines and comments).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Line {
    Command(Command),
    Blank,
}

/// Closed set of score commands.
///
/// Objects whose `kind` is not one of [`Command::KINDS`] become
/// [`Command::Unknown`] and keep their kind for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self", tag = "kind", rename_all = "snake_case")]
pub enum Command {
    Bpm {
        bpm: u32,
    },
    Signature {
        signature: Fraction,
    },
    /// Sets the default program, or per-note overrides when names are given.
    Program {
        program: u8,
        #[serde(default)]
        names: Vec<String>,
    },
    Frequency {
        name: String,
        hz: f64,
    },
    Note {
        name: String,
        ratio: NoteRatio,
    },
    NoteOn {
        name: String,
    },
    NoteOff {
        name: String,
    },
    Sleep {
        length: Fraction,
    },
    Sync,
    /// Any command kind this build does not know about.
    #[serde(skip)]
    Unknown {
        kind: String,
    },
}

impl Command {
    /// Every `kind` tag with a command of its own.
    pub const KINDS: &'static [&'static str] = &[
        "bpm",
        "signature",
        "program",
        "frequency",
        "note",
        "note_on",
        "note_off",
        "sleep",
        "sync",
    ];
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Unknown { kind } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("kind", kind)?;
                map.end()
            }
            known => Command::serialize(known, serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if let Some(kind) = value.get("kind").and_then(serde_json::Value::as_str) {
            if !Self::KINDS.contains(&kind) {
                return Ok(Self::Unknown {
                    kind: kind.to_string(),
                });
            }
        }
        Command::deserialize(value).map_err(serde::de::Error::custom)
    }
}

/// Right-hand side of a `note` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoteRatio {
    /// `parent:octave@h1,h2,...` where parent and octave may be omitted when
    /// editing an existing note.
    Harmonic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        octave: Option<i32>,
        harmonics: Vec<u32>,
    },
    /// Bare `parent`: unison with the parent, replacing every field.
    Alias { parent: String },
}

impl From<NoteRatio> for NoteUpdate {
    fn from(ratio: NoteRatio) -> Self {
        match ratio {
            NoteRatio::Harmonic {
                parent,
                octave,
                harmonics,
            } => NoteUpdate {
                parent,
                octave,
                harmonics: Some(harmonics),
            },
            NoteRatio::Alias { parent } => NoteUpdate::alias(parent),
        }
    }
}

impl fmt::Display for NoteRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias { parent } => write!(f, "{parent}"),
            Self::Harmonic {
                parent,
                octave,
                harmonics,
            } => {
                if let Some(parent) = parent {
                    write!(f, "{parent}")?;
                }
                if let Some(octave) = octave {
                    write!(f, ":{octave}")?;
                }
                let steps: Vec<String> = harmonics.iter().map(u32::to_string).collect();
                write!(f, "@{}", steps.join(","))
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bpm { bpm } => write!(f, "bpm {bpm}"),
            Self::Signature { signature } => write!(f, "signature {signature}"),
            Self::Program { program, names } => {
                write!(f, "program {program}")?;
                for name in names {
                    write!(f, " {name}")?;
                }
                Ok(())
            }
            Self::Frequency { name, hz } => write!(f, "frequency {name} {hz}"),
            Self::Note { name, ratio } => write!(f, "note {name} = {ratio}"),
            Self::NoteOn { name } => write!(f, "note_on {name}"),
            Self::NoteOff { name } => write!(f, "note_off {name}"),
            Self::Sleep { length } => write!(f, "sleep {length}"),
            Self::Sync => f.write_str("sync"),
            Self::Unknown { kind } => write!(f, "<unknown {kind}>"),
        }
    }
}

/// Turns score text into a command tree.
pub trait ScoreParser {
    fn parse(&self, text: &str) -> Result<CommandTree>;
}

/// Reads trees that a grammar front end has already serialised as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTreeParser;

impl ScoreParser for JsonTreeParser {
    fn parse(&self, text: &str) -> Result<CommandTree> {
        CommandTree::from_json(text)
    }
}
