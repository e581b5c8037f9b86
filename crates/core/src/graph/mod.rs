//! Named frequencies and the notes tuned relative to them.
//!
//! Notes refer to their parent by name and never store a frequency. Every
//! query walks the parent chain down to a root [`Frequency`], so an edit
//! anywhere in the chain is seen by all descendants on their next query.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{PlayerError, RationalPitch, Result};

/// Named absolute pitch anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frequency {
    pub hz: f64,
}

/// Output binding of a note while it is audible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sound {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

/// Pitch defined relative to a parent frequency or note.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub parent: String,
    pub octave: i32,
    pub harmonics: Vec<u32>,
    /// Program override used instead of the session default.
    pub program: Option<u8>,
    pub sound: Option<Sound>,
}

impl Note {
    /// Multiplier of this note relative to its parent.
    pub fn pitch(&self) -> Result<RationalPitch> {
        RationalPitch::compose(&self.harmonics, self.octave)
    }

    pub fn is_sounding(&self) -> bool {
        self.sound.is_some()
    }
}

/// Result of a name lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entity<'a> {
    Frequency(&'a Frequency),
    Note(&'a Note),
}

/// Fields of a `note` definition. `None` keeps the previous value of an
/// existing note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteUpdate {
    pub parent: Option<String>,
    pub octave: Option<i32>,
    pub harmonics: Option<Vec<u32>>,
}

impl NoteUpdate {
    /// Full redefinition as a unison alias of `parent`.
    pub fn alias(parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            octave: Some(0),
            harmonics: Some(vec![1]),
        }
    }
}

/// How a `note` definition was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteDefinition {
    Created,
    /// `previous` is the note as it was before the update; its sound is
    /// unchanged by the update.
    Updated { previous: Note },
}

#[derive(Debug, Default)]
pub struct EntityGraph {
    frequencies: HashMap<String, Frequency>,
    notes: HashMap<String, Note>,
    /// Note names in definition order.
    order: Vec<String>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a frequency and returns the value it replaced.
    /// Dependents pick up the new value on their next query.
    ///
    /// Notes and frequencies share one namespace, so a name already taken by
    /// a note is rejected.
    pub fn define_frequency(&mut self, name: &str, hz: f64) -> Result<Option<Frequency>> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(PlayerError::invalid(format!(
                "frequency `{name}` must be a positive number of Hz, got {hz}"
            )));
        }
        if self.notes.contains_key(name) {
            return Err(PlayerError::invalid(format!(
                "`{name}` is already a note and cannot become a frequency"
            )));
        }
        Ok(self.frequencies.insert(name.to_string(), Frequency { hz }))
    }

    /// Puts back a frequency returned by [`EntityGraph::define_frequency`],
    /// removing the name when there was none before.
    pub(crate) fn restore_frequency(&mut self, name: &str, previous: Option<Frequency>) {
        match previous {
            Some(frequency) => {
                self.frequencies.insert(name.to_string(), frequency);
            }
            None => {
                self.frequencies.remove(name);
            }
        }
    }

    /// Puts back the definition returned in [`NoteDefinition::Updated`].
    pub(crate) fn restore_note(&mut self, name: &str, previous: Note) {
        if let Some(note) = self.notes.get_mut(name) {
            *note = previous;
        }
    }

    /// Looks a name up among notes and frequencies.
    pub fn resolve(&self, name: &str) -> Result<Entity<'_>> {
        if let Some(note) = self.notes.get(name) {
            return Ok(Entity::Note(note));
        }
        self.frequencies
            .get(name)
            .map(Entity::Frequency)
            .ok_or_else(|| PlayerError::unknown(name))
    }

    pub fn note(&self, name: &str) -> Result<&Note> {
        match self.notes.get(name) {
            Some(note) => Ok(note),
            None => Err(self.not_a_note(name)),
        }
    }

    pub fn note_mut(&mut self, name: &str) -> Result<&mut Note> {
        if !self.notes.contains_key(name) {
            return Err(self.not_a_note(name));
        }
        self.notes
            .get_mut(name)
            .ok_or_else(|| PlayerError::unknown(name))
    }

    fn not_a_note(&self, name: &str) -> PlayerError {
        if self.frequencies.contains_key(name) {
            PlayerError::invalid(format!(
                "`{name}` is a frequency; only notes can be played or edited"
            ))
        } else {
            PlayerError::unknown(name)
        }
    }

    pub fn frequency(&self, name: &str) -> Option<&Frequency> {
        self.frequencies.get(name)
    }

    /// Creates a note or applies a partial update to an existing one.
    ///
    /// The graph is left untouched when the definition is rejected, including
    /// when the update would make the note its own ancestor.
    pub fn define_note(&mut self, name: &str, update: NoteUpdate) -> Result<NoteDefinition> {
        if let Some(harmonics) = &update.harmonics {
            RationalPitch::compose(harmonics, 0)?;
        }
        if !self.notes.contains_key(name) && self.frequencies.contains_key(name) {
            return Err(PlayerError::invalid(format!(
                "`{name}` is already a frequency and cannot become a note"
            )));
        }
        if let Some(parent) = &update.parent {
            if !self.contains(parent) {
                if self.notes.contains_key(name) {
                    return Err(PlayerError::unknown(parent.as_str()));
                }
                return Err(PlayerError::MissingParent {
                    note: name.to_string(),
                    parent: Some(parent.clone()),
                });
            }
        }

        match self.notes.get_mut(name) {
            Some(note) => {
                let previous = note.clone();
                if let Some(parent) = update.parent {
                    note.parent = parent;
                }
                if let Some(octave) = update.octave {
                    note.octave = octave;
                }
                if let Some(harmonics) = update.harmonics {
                    note.harmonics = harmonics;
                }

                if let Err(err) = self.frequency_of(name) {
                    self.restore_note(name, previous);
                    return Err(err);
                }
                Ok(NoteDefinition::Updated { previous })
            }
            None => {
                let parent = update.parent.ok_or_else(|| PlayerError::MissingParent {
                    note: name.to_string(),
                    parent: None,
                })?;
                self.notes.insert(
                    name.to_string(),
                    Note {
                        parent,
                        octave: update.octave.unwrap_or(0),
                        harmonics: update.harmonics.unwrap_or_else(|| vec![1]),
                        program: None,
                        sound: None,
                    },
                );
                if let Err(err) = self.frequency_of(name) {
                    self.notes.remove(name);
                    return Err(err);
                }
                self.order.push(name.to_string());
                Ok(NoteDefinition::Created)
            }
        }
    }

    pub fn set_program(&mut self, name: &str, program: u8) -> Result<()> {
        self.note_mut(name)?.program = Some(program);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.notes.contains_key(name) || self.frequencies.contains_key(name)
    }

    /// Effective frequency of a note or frequency, recomputed from the root.
    pub fn frequency_of(&self, name: &str) -> Result<f64> {
        let mut multiplier = 1.0;
        let mut current = name;
        // A chain can visit each note at most once before reaching its root.
        for _ in 0..=self.notes.len() {
            if let Some(note) = self.notes.get(current) {
                multiplier *= note.pitch()?.to_f64();
                current = &note.parent;
                continue;
            }
            return match self.frequencies.get(current) {
                Some(root) => Ok(root.hz * multiplier),
                None => Err(PlayerError::unknown(current)),
            };
        }
        Err(PlayerError::invalid(format!(
            "note `{name}` is part of a parent cycle"
        )))
    }

    /// Notes whose parent chain passes through `name`, in definition order.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|candidate| candidate.as_str() != name && self.descends_from(candidate, name))
            .cloned()
            .collect()
    }

    fn descends_from(&self, note: &str, ancestor: &str) -> bool {
        let mut current = note;
        for _ in 0..=self.notes.len() {
            let Some(entry) = self.notes.get(current) else {
                return false;
            };
            if entry.parent == ancestor {
                return true;
            }
            current = &entry.parent;
        }
        false
    }

    /// Note names in definition order.
    pub fn note_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Frequency names sorted alphabetically.
    pub fn frequency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.frequencies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn notes(&self) -> impl Iterator<Item = (&str, &Note)> {
        self.order
            .iter()
            .filter_map(|name| self.notes.get(name).map(|note| (name.as_str(), note)))
    }

    pub fn sounding(&self) -> Vec<String> {
        self.notes()
            .filter(|(_, note)| note.is_sounding())
            .map(|(name, _)| name.to_string())
            .collect()
    }
}
