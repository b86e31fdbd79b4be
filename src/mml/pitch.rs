//! Pitch context: note names, octave tracking and arpeggio chords.
//!
//! Pitches are semitone numbers where 0 is the lowest A on the NES and
//! `c` in octave 0 (the octave below middle C) is 15.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::error::{CompileError, Result};
use super::note::{accidental_semitones, scan_pitch, NoteWord};

/// Offset added so that `c` in octave 0 lands on the engine's note 15.
const PITCH_BASE: i32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteLanguage {
    /// `b` is B natural.
    English,
    /// `b` is B flat and `h` is B natural.
    Deutsch,
}

/// How pitch words are interpreted in the current context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OctaveMode {
    /// No notes yet; the first note of a pattern decides.
    Unset,
    Drum,
    /// Noise sound effects: pitches are numbers 0-15.
    Noise,
    Absolute,
    /// Octave marks are relative to the previous note's octave.
    OctaveRelative,
    /// Like `OctaveRelative`, but moves to the nearest octave first.
    Relative,
}

impl OctaveMode {
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "absolute" => Some(OctaveMode::Absolute),
            "orelative" => Some(OctaveMode::OctaveRelative),
            "relative" => Some(OctaveMode::Relative),
            _ => None,
        }
    }
}

/// Which of `>` and `<` raises the octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmlOctaves {
    /// `>` raises, `<` lowers.
    Normal,
    /// `<` raises, `>` lowers.
    Swapped,
}

/// Result of interpreting a note word's letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotePitch {
    Semitone(i32),
    Rest,
    Wait,
    /// `l`: only sets the default duration.
    Length,
}

/// An arpeggio chord as two hex nibbles plus direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpSpec {
    /// Two uppercase hex digits, each a semitone offset above the base.
    pub code: String,
    /// Play the chord downward from the written note.
    pub downward: bool,
}

impl ArpSpec {
    fn silent() -> Self {
        Self {
            code: "00".to_string(),
            downward: false,
        }
    }

    fn max_nibble(&self) -> i32 {
        self.code
            .chars()
            .filter_map(|c| c.to_digit(16))
            .max()
            .map_or(0, |v| v as i32)
    }
}

/// Built-in chord names.
fn default_chord(name: &str) -> Option<&'static str> {
    let code = match name {
        "OF" => "00",
        "M" => "47",
        "m" => "37",
        "maj7" => "4B",
        "m7" => "3A",
        "dom7" => "4A",
        "dim" => "36",
        "dim7" => "39",
        "aug" => "48",
        _ => return None,
    };
    Some(code)
}

type ChordLayer = Rc<RefCell<HashMap<String, String>>>;

/// Named chords, layered so that songs and patterns see their parents'
/// names without being able to change them. Layers are shared, so a name
/// added to a parent later is still visible to its children.
#[derive(Debug, Clone)]
pub struct ChordTable {
    /// Outermost first; the last layer is this table's own.
    layers: Vec<ChordLayer>,
}

impl Default for ChordTable {
    fn default() -> Self {
        Self {
            layers: vec![ChordLayer::default()],
        }
    }
}

impl ChordTable {
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.borrow().get(name).cloned())
            .or_else(|| default_chord(name).map(str::to_string))
    }

    fn defines_locally(&self, name: &str) -> bool {
        self.layers
            .last()
            .is_some_and(|layer| layer.borrow().contains_key(name))
    }

    fn define(&self, name: &str, code: String) {
        if let Some(layer) = self.layers.last() {
            layer.borrow_mut().insert(name.to_string(), code);
        }
    }

    /// A new empty layer on top of this table's layers.
    fn child(&self) -> ChordTable {
        let mut layers = self.layers.clone();
        layers.push(ChordLayer::default());
        ChordTable { layers }
    }
}

/// Rotate a two-note chord `n` times so its lowest note moves up an octave.
pub fn invert_chord(code: &str, times: u32) -> Result<String> {
    let mut code = code.to_string();
    for _ in 0..times {
        code = invert_once(&code)?;
    }
    Ok(code)
}

fn invert_once(code: &str) -> Result<String> {
    let nibbles: Vec<i32> = code
        .chars()
        .filter_map(|c| c.to_digit(16).map(|v| v as i32))
        .collect();
    if nibbles.len() != 2 {
        return Err(CompileError::grammar(format!("{code} is not a two-digit chord")));
    }
    if nibbles.iter().any(|&n| n >= 12) {
        return Err(CompileError::range(format!(
            "chord {code} spans an octave or more and cannot be inverted"
        )));
    }
    if nibbles[1] == 0 {
        return Ok(format!("{:X}0", 12 - nibbles[0]));
    }
    let or_octave = |n: i32| if n == 0 { 12 } else { n };
    let mut notes = [12, or_octave(nibbles[0]), or_octave(nibbles[1])];
    let lowest = notes.iter().copied().min().unwrap_or(0);
    for n in notes.iter_mut() {
        *n -= lowest;
    }
    while notes[0] != 0 {
        notes.rotate_left(1);
    }
    Ok(format!("{:X}{:X}", notes[1], notes[2]))
}

/// Pitch state shared by a song, pattern or sound effect.
#[derive(Debug, Clone)]
pub struct PitchContext {
    language: NoteLanguage,
    pub octave_mode: OctaveMode,
    mml_octaves: MmlOctaves,
    /// Scale degree and octave of the previous note.
    last_octave: (i32, i32),
    last_arp: Option<ArpSpec>,
    arp_mod: Option<ArpSpec>,
    last_chord: Option<(i32, Option<String>)>,
    chords: ChordTable,
}

impl Default for PitchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PitchContext {
    pub fn new() -> Self {
        Self {
            language: NoteLanguage::English,
            octave_mode: OctaveMode::Unset,
            mml_octaves: MmlOctaves::Normal,
            last_octave: (3, 0),
            last_arp: None,
            arp_mod: None,
            last_chord: None,
            chords: ChordTable::default(),
        }
    }

    /// A copy of this context whose chord definitions stay local to it.
    pub fn child(&self) -> Self {
        Self {
            chords: self.chords.child(),
            ..self.clone()
        }
    }

    pub fn set_language(&mut self, word: &str) -> Result<()> {
        self.language = match word.to_ascii_lowercase().as_str() {
            "english" => NoteLanguage::English,
            "deutsch" => NoteLanguage::Deutsch,
            _ => {
                return Err(CompileError::grammar(format!(
                    "unknown note language {word}; try english or deutsch"
                )))
            }
        };
        Ok(())
    }

    pub fn set_mml_octaves(&mut self, word: &str) -> Result<()> {
        self.mml_octaves = match word {
            "normal" => MmlOctaves::Normal,
            "swapped" => MmlOctaves::Swapped,
            _ => {
                return Err(CompileError::grammar(format!(
                    "mmloctaves must be normal or swapped, not {word}"
                )))
            }
        };
        Ok(())
    }

    /// Forget octave and arpeggio state at the start of a pattern.
    pub fn reset_octave(&mut self, mode: OctaveMode) {
        self.octave_mode = mode;
        self.last_octave = (3, 0);
        self.last_arp = None;
        self.arp_mod = None;
        self.last_chord = None;
    }

    /// Turn chord text such as `M`, `-47` or `m/1` into an [`ArpSpec`].
    pub fn translate_arp(&self, text: &str) -> Result<Option<ArpSpec>> {
        if text.is_empty() {
            return Ok(None);
        }
        let (downward, text) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (name, inversion) = match text.split_once('/') {
            Some((name, inv)) => {
                let inv: u32 = inv.parse().ok().filter(|n| (1..=2).contains(n)).ok_or_else(|| {
                    CompileError::grammar(format!("chord inversion must be /1 or /2, not /{inv}"))
                })?;
                (name, inv)
            }
            None => (text, 0),
        };
        let code = if name.len() < 3 && !name.is_empty() && name.chars().all(|c| c.is_ascii_hexdigit()) {
            format!("{:0>2}", name.to_ascii_uppercase())
        } else {
            self.chords
                .lookup(name)
                .ok_or_else(|| CompileError::reference(format!("unknown chord name {name}")))?
        };
        Ok(Some(ArpSpec {
            code: invert_chord(&code, inversion)?,
            downward,
        }))
    }

    /// Define a chord name for this context and its children.
    pub fn add_chord_name(&mut self, name: &str, definition: &str) -> Result<()> {
        if definition.starts_with('-') {
            return Err(CompileError::grammar(format!(
                "chord {name} cannot be defined as downward; use -{name} when playing it"
            )));
        }
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(CompileError::grammar(format!(
                "chord name {name} must begin with a letter"
            )));
        }
        if matches!(name, "P1" | "P2") {
            return Err(CompileError::redefinition(format!(
                "{name} is reserved for arpeggio speed"
            )));
        }
        if self.chords.defines_locally(name) {
            return Err(CompileError::redefinition(format!(
                "chord name {name} is already defined here"
            )));
        }
        let code = self
            .translate_arp(definition)?
            .map(|arp| arp.code)
            .ok_or_else(|| CompileError::grammar(format!("chord {name} has no definition")))?;
        self.chords.define(name, code);
        Ok(())
    }

    /// Set the arpeggio that applies to following notes until changed.
    pub fn set_arp(&mut self, text: &str) -> Result<()> {
        self.last_arp = self.translate_arp(text)?;
        Ok(())
    }

    /// Interpret a scanned note word's pitch and arpeggio.
    ///
    /// Returns the pitch and the arpeggio to play with it, already shifted
    /// for downward chords.
    pub fn parse_pitch(&mut self, note: &NoteWord) -> Result<(NotePitch, Option<String>)> {
        let arp = match &note.arp {
            Some(text) => self.translate_arp(text)?,
            None => None,
        };

        if matches!(note.letter, 'r' | 'w' | 'l' | 'q') {
            if note.has_pitch_marks() {
                return Err(CompileError::grammar(format!(
                    "{} cannot take an accidental or octave change",
                    note.letter
                )));
            }
            if note.letter == 'q' {
                return self.repeat_chord(arp);
            }
            if note.letter == 'r' {
                self.arp_mod = arp.clone();
            }
            let pitch = match note.letter {
                'r' => NotePitch::Rest,
                'w' => NotePitch::Wait,
                _ => NotePitch::Length,
            };
            let arp = arp.or_else(|| self.arp_mod.clone()).or_else(|| self.last_arp.clone());
            return Ok((pitch, arp.map(|a| a.code)));
        }

        let semitone = self.note_semitone(note)?;
        self.arp_mod = arp.clone();
        if arp.is_some() && self.last_arp.is_none() {
            self.last_arp = Some(ArpSpec::silent());
        }
        let arp = arp.or_else(|| self.last_arp.clone());
        let semitone = match &arp {
            Some(a) if a.downward => semitone - a.max_nibble(),
            _ => semitone,
        };
        let code = arp.map(|a| a.code);
        self.last_chord = Some((semitone, code.clone()));
        Ok((NotePitch::Semitone(semitone), code))
    }

    fn repeat_chord(&mut self, arp: Option<ArpSpec>) -> Result<(NotePitch, Option<String>)> {
        let (semitone, last_code) = self
            .last_chord
            .clone()
            .ok_or_else(|| CompileError::structural("q repeats the previous chord, but there is none"))?;
        let code = arp.map(|a| a.code).or(last_code);
        Ok((NotePitch::Semitone(semitone), code))
    }

    fn note_semitone(&mut self, note: &NoteWord) -> Result<i32> {
        if !note.pre_octave.is_empty() && !note.post_octave.is_empty() {
            return Err(CompileError::grammar(
                "cannot mix MML (<>) and LilyPond (',) octave changes",
            ));
        }
        let mut octave = if !note.pre_octave.is_empty() {
            let count = note.pre_octave.len() as i32;
            let raises = note.pre_octave.starts_with('>') == (self.mml_octaves == MmlOctaves::Normal);
            if raises {
                count
            } else {
                -count
            }
        } else if note.post_octave.starts_with(',') {
            -(note.post_octave.len() as i32)
        } else {
            note.post_octave.len() as i32
        };

        if matches!(self.octave_mode, OctaveMode::OctaveRelative | OctaveMode::Relative) {
            octave += self.last_octave.1;
        }
        let degree = scale_degree(note.letter);
        if self.octave_mode == OctaveMode::Relative {
            let diff = degree - self.last_octave.0;
            if diff > 3 {
                octave -= 1;
            } else if diff < -3 {
                octave += 1;
            }
        }
        self.last_octave = (degree, octave);

        let semi = match (note.letter, self.language) {
            ('b', NoteLanguage::Deutsch) => 10,
            (letter, _) => letter_semitone(letter),
        };
        let accidental = accidental_semitones(&note.accidental)
            .ok_or_else(|| CompileError::grammar(format!("unknown accidental {}", note.accidental)))?;
        Ok(semi + accidental + 12 * octave + PITCH_BASE)
    }

    /// Parse a standalone pitch such as a sound effect step or a conductor
    /// note, using absolute octaves (or noise numbers in noise mode).
    pub fn parse_absolute_pitch(&mut self, word: &str) -> Result<i32> {
        if self.octave_mode == OctaveMode::Noise {
            let value: i32 = word
                .parse()
                .map_err(|_| CompileError::grammar(format!("noise pitch must be a number, not {word}")))?;
            if !(0..=15).contains(&value) {
                return Err(CompileError::range(format!(
                    "noise pitch must be 0 to 15, not {value}"
                )));
            }
            return Ok(15 - value);
        }
        let note = scan_pitch(word)
            .filter(|n| matches!(n.letter, 'a'..='h'))
            .ok_or_else(|| CompileError::grammar(format!("{word} doesn't look like a pitch")))?;
        let saved = self.octave_mode;
        self.octave_mode = OctaveMode::Absolute;
        let result = self.note_semitone(&note);
        self.octave_mode = saved;
        result
    }
}

fn scale_degree(letter: char) -> i32 {
    match letter {
        'c' => 0,
        'd' => 1,
        'e' => 2,
        'f' => 3,
        'g' => 4,
        'a' => 5,
        _ => 6,
    }
}

fn letter_semitone(letter: char) -> i32 {
    match letter {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        _ => 11,
    }
}
