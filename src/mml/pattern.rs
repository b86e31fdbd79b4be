//! Patterns: note sequences played on one track.
//!
//! Pattern text is parsed word by word into [`PatternItem`]s. Rendering
//! merges ties, drops dead arpeggio changes, splits the notes into runs
//! that fit a 25-semitone window and encodes the engine byte stream.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::error::{CompileError, Diagnostics, Result};
use super::lexer::SourceLoc;
use super::note::{is_arp, scan_drum, scan_note, DrumWord, NoteWord, SlurMark};
use super::pitch::{NotePitch, OctaveMode, PitchContext};
use super::render::{asm_name, DataBlock, DataFormat, Entity, Renderable, Rendered};
use super::rhythm::{decompose_rows, DurationCode, RhythmContext};
use super::scope::Score;

/// Note names for offsets 0-24 above a pattern's transpose base.
const PITCH_NAMES: [&str; 25] = [
    "N_C", "N_CS", "N_D", "N_DS", "N_E", "N_F", "N_FS", "N_G", "N_GS", "N_A", "N_AS", "N_B",
    "N_CH", "N_CSH", "N_DH", "N_DSH", "N_EH", "N_FH", "N_FSH", "N_GH", "N_GSH", "N_AH", "N_ASH",
    "N_BH", "N_CHH",
];

/// Widest interval a single transpose run may span.
const MAX_RUN_SPAN: i32 = 24;

/// Channels a pattern or conductor command can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Track {
    Pulse1,
    Pulse2,
    Triangle,
    Drum,
    Attack,
}

impl Track {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pulse1" => Some(Track::Pulse1),
            "pulse2" => Some(Track::Pulse2),
            "triangle" => Some(Track::Triangle),
            "drum" | "noise" => Some(Track::Drum),
            "attack" => Some(Track::Attack),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Track::Pulse1 => "pulse1",
            Track::Pulse2 => "pulse2",
            Track::Triangle => "triangle",
            Track::Drum => "drum",
            Track::Attack => "attack",
        }
    }

    /// Engine channel number.
    pub fn index(self) -> u8 {
        match self {
            Track::Pulse1 => 0,
            Track::Pulse2 => 1,
            Track::Triangle => 2,
            Track::Drum => 3,
            Track::Attack => 4,
        }
    }

    /// Suffix of conductor macros such as `playPatSq1`.
    pub fn suffix(self) -> &'static str {
        match self {
            Track::Pulse1 => "Sq1",
            Track::Pulse2 => "Sq2",
            Track::Triangle => "Tri",
            Track::Drum => "Noise",
            Track::Attack => "Attack",
        }
    }

    pub fn is_pitched(self) -> bool {
        self != Track::Drum
    }

    pub fn mute_bit(self) -> u8 {
        1 << self.index()
    }
}

/// What a note plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PatternNote {
    Pitch(i32),
    Rest,
    /// Hold the previous note.
    Wait,
    Drum(String),
}

/// Effect commands that change how later notes play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Effect {
    Instrument(String),
    Arpeggio(String),
    FastArp,
    SlowArp,
    Bend(u8),
    Vibrato(u8),
    ChannelVolume(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PatternItem {
    Note {
        note: PatternNote,
        /// Rows, or minus the frame count of a grace note.
        rows: i32,
        slur: SlurMark,
        arp: Option<String>,
    },
    Effect(Effect),
}

/// A pattern item after ties are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Collapsed {
    Note {
        note: PatternNote,
        rows: i32,
        /// Connects into the following note without a new attack.
        slurred: bool,
    },
    Effect(Effect),
}

/// One atom of encoded pattern data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternCode {
    Note {
        code: String,
        duration: Option<DurationCode>,
    },
    Grace(u32),
    Transpose(i32),
    Instrument(String),
    Arpeggio(String),
    FastArp,
    SlowArp,
    Bend(u8),
    Vibrato(u8),
    ChannelVolume(u8),
    LegatoOn,
    LegatoOff,
    PatEnd,
}

impl PatternCode {
    /// Encoded size in bytes: one per comma-separated field.
    pub fn size(&self) -> usize {
        self.to_string().split(',').count()
    }
}

impl fmt::Display for PatternCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternCode::Note { code, duration } => {
                write!(f, "{code}{}", duration.map_or("", |d| d.note_suffix()))
            }
            PatternCode::Grace(frames) => write!(f, "GRACE,{frames}"),
            PatternCode::Transpose(delta) => write!(f, "TRANSPOSE,<{delta}"),
            PatternCode::Instrument(label) => write!(f, "INSTRUMENT,{label}"),
            PatternCode::Arpeggio(code) => write!(f, "ARPEGGIO,${code}"),
            PatternCode::FastArp => f.write_str("FASTARP"),
            PatternCode::SlowArp => f.write_str("SLOWARP"),
            PatternCode::Bend(rate) => write!(f, "BEND,${rate:02X}"),
            PatternCode::Vibrato(depth) => write!(f, "VIBRATO,{depth}"),
            PatternCode::ChannelVolume(level) => write!(f, "CHVOLUME,{level}"),
            PatternCode::LegatoOn => f.write_str("LEGATO_ON"),
            PatternCode::LegatoOff => f.write_str("LEGATO_OFF"),
            PatternCode::PatEnd => f.write_str("PATEND"),
        }
    }
}

fn volume_word(word: &str) -> Option<u8> {
    match word {
        "pp" => Some(1),
        "mp" => Some(2),
        "mf" => Some(3),
        "ff" => Some(4),
        _ => None,
    }
}

/// Parse the operand of `EP`: `OF` or a hex rate `00`-`2F`.
fn bend_rate(arg: &str) -> Option<u8> {
    if arg == "OF" {
        return Some(0);
    }
    let bytes = arg.as_bytes();
    if bytes.len() == 2 && matches!(bytes[0], b'0'..=b'2') && bytes[1].is_ascii_hexdigit() {
        u8::from_str_radix(arg, 16).ok()
    } else {
        None
    }
}

/// Parse the operand of `MP`: `OF` or one hex digit, capped at 4.
fn vibrato_depth(arg: &str) -> Option<u8> {
    if arg == "OF" {
        return Some(0);
    }
    if arg.len() == 1 {
        u8::from_str_radix(arg, 16).ok().map(|v| v.min(4))
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pattern {
    pub name: String,
    pub loc: SourceLoc,
    pub track: Option<Track>,
    pub instrument: Option<String>,
    pub fallthrough: bool,
    items: Vec<PatternItem>,
    rows: u32,
    #[serde(skip)]
    pitch: PitchContext,
    #[serde(skip)]
    rhythm: RhythmContext,
}

impl Pattern {
    pub fn new(
        name: impl Into<String>,
        loc: SourceLoc,
        track: Option<Track>,
        instrument: Option<String>,
        pitch: &PitchContext,
        rhythm: &RhythmContext,
    ) -> Self {
        let mut pitch = pitch.child();
        pitch.reset_octave(match track {
            Some(Track::Drum) => OctaveMode::Drum,
            Some(_) => OctaveMode::Absolute,
            None => OctaveMode::Unset,
        });
        let mut rhythm = rhythm.clone();
        rhythm.reset_duration();
        Self {
            name: name.into(),
            loc,
            track,
            instrument,
            fallthrough: false,
            items: Vec::new(),
            rows: 0,
            pitch,
            rhythm,
        }
    }

    /// Length in rows of everything parsed so far.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn is_drum(&self) -> bool {
        self.track == Some(Track::Drum)
    }

    pub fn pitch_mut(&mut self) -> &mut PitchContext {
        &mut self.pitch
    }

    pub fn rhythm_mut(&mut self) -> &mut RhythmContext {
        &mut self.rhythm
    }

    /// Parse one word of pattern text. Non-fatal problems are appended to
    /// `warnings`.
    pub fn add_word(&mut self, word: &str, warnings: &mut Vec<String>) -> Result<()> {
        if word == "|" {
            self.bar_check(warnings)?;
            return Ok(());
        }
        if let Some(mode) = OctaveMode::from_word(word) {
            if self.pitch.octave_mode == OctaveMode::Drum {
                return Err(CompileError::grammar(format!(
                    "{word} cannot be used in a drum pattern"
                )));
            }
            self.pitch.octave_mode = mode;
            return Ok(());
        }
        if let Some(level) = volume_word(word) {
            self.items.push(PatternItem::Effect(Effect::ChannelVolume(level)));
            return Ok(());
        }
        if let Some(arg) = word.strip_prefix("EN") {
            match arg {
                "P1" => self.items.push(PatternItem::Effect(Effect::FastArp)),
                "P2" => self.items.push(PatternItem::Effect(Effect::SlowArp)),
                _ if is_arp(arg) => self.pitch.set_arp(arg)?,
                _ => warnings.push(format!("{word} is not a valid arpeggio effect")),
            }
            return Ok(());
        }
        if let Some(arg) = word.strip_prefix("EP") {
            match bend_rate(arg) {
                Some(rate) => self.items.push(PatternItem::Effect(Effect::Bend(rate))),
                None => warnings.push(format!("{word} is not a valid portamento effect")),
            }
            return Ok(());
        }
        if let Some(arg) = word.strip_prefix("MP") {
            match vibrato_depth(arg) {
                Some(depth) => self.items.push(PatternItem::Effect(Effect::Vibrato(depth))),
                None => warnings.push(format!("{word} is not a valid vibrato effect")),
            }
            return Ok(());
        }
        if let Some(name) = word.strip_prefix('@') {
            if name.is_empty() {
                return Err(CompileError::grammar("@ needs an instrument name"));
            }
            self.items
                .push(PatternItem::Effect(Effect::Instrument(name.to_string())));
            return Ok(());
        }
        self.add_note_word(word)
    }

    fn add_note_word(&mut self, word: &str) -> Result<()> {
        match self.pitch.octave_mode {
            OctaveMode::Unset => match (scan_note(word), scan_drum(word)) {
                (Some(note), _) if matches!(note.letter, 'l' | 'r' | 'w') => self.add_pitched(note),
                (Some(_), Some(_)) => Err(CompileError::grammar(format!(
                    "{word} is ambiguous: it could be a drum or a pitch"
                ))),
                (Some(note), None) => {
                    self.pitch.octave_mode = OctaveMode::Absolute;
                    self.add_pitched(note)
                }
                (None, Some(drum)) => {
                    self.pitch.octave_mode = OctaveMode::Drum;
                    self.track = Some(Track::Drum);
                    self.add_drum(drum)
                }
                (None, None) => Err(CompileError::grammar(format!(
                    "unknown first note {word}"
                ))),
            },
            OctaveMode::Drum => {
                let drum = scan_drum(word).ok_or_else(|| {
                    CompileError::grammar(format!("unknown drum pattern note {word}"))
                })?;
                self.add_drum(drum)
            }
            _ => {
                let note = scan_note(word).ok_or_else(|| {
                    CompileError::grammar(format!("unknown pitched pattern note {word}"))
                })?;
                self.add_pitched(note)
            }
        }
    }

    fn add_pitched(&mut self, word: NoteWord) -> Result<()> {
        let duration = RhythmContext::parse_duration(word.duration, word.augment)?;
        let (pitch, arp) = self.pitch.parse_pitch(&word)?;
        let note = match pitch {
            NotePitch::Length => return self.rhythm.set_length(duration),
            NotePitch::Semitone(s) => PatternNote::Pitch(s),
            NotePitch::Rest => PatternNote::Rest,
            NotePitch::Wait => PatternNote::Wait,
        };
        let rows = self.rhythm.note_rows(duration)?;
        self.push_note(note, rows, word.slur, arp);
        Ok(())
    }

    fn add_drum(&mut self, word: DrumWord) -> Result<()> {
        let duration = RhythmContext::parse_duration(word.duration, word.augment)?;
        let note = match word.name.as_str() {
            "l" => return self.rhythm.set_length(duration),
            "r" => PatternNote::Rest,
            "w" => PatternNote::Wait,
            name => PatternNote::Drum(name.to_string()),
        };
        let rows = self.rhythm.note_rows(duration)?;
        self.push_note(note, rows, SlurMark::None, None);
        Ok(())
    }

    fn push_note(&mut self, note: PatternNote, rows: i32, slur: SlurMark, arp: Option<String>) {
        if rows > 0 {
            self.rows += rows as u32;
        }
        self.items.push(PatternItem::Note {
            note,
            rows,
            slur,
            arp,
        });
    }

    fn bar_check(&self, warnings: &mut Vec<String>) -> Result<()> {
        let length = self.rhythm.measure_length()?;
        let offset = self.rows % length;
        if offset != 0 {
            warnings.push(format!(
                "bar check failed: {offset} rows into a {length}-row measure"
            ));
        }
        Ok(())
    }

    /// The lowest pitch of the first transpose run, or `None` if the
    /// pattern has no pitched notes.
    pub fn base_transpose(&self) -> Option<i32> {
        transpose_runs(&self.collapsed()).first().map(|run| run.1)
    }

    fn collapsed(&self) -> Vec<Collapsed> {
        collapse_effects(collapse_ties(&self.items, self.is_drum()))
    }

    /// Encode the pattern into engine atoms.
    pub fn encode(&self, score: &Score) -> Result<Vec<PatternCode>> {
        let items = self.collapsed();
        let runs = transpose_runs(&items);
        let base = runs.first().map_or(0, |run| run.1);
        let mut cur = base;
        let mut next_run = 1;
        let mut legato = false;
        let mut prev_slurred = false;
        let mut codes = Vec::new();

        for (i, item) in items.iter().enumerate() {
            if let Some(&(start, low)) = runs.get(next_run) {
                if i >= start {
                    codes.push(PatternCode::Transpose(low - cur));
                    cur = low;
                    next_run += 1;
                }
            }
            let (note, rows, slurred) = match item {
                Collapsed::Effect(effect) => {
                    codes.push(self.encode_effect(effect, score)?);
                    continue;
                }
                Collapsed::Note {
                    note,
                    rows,
                    slurred,
                } => (note, *rows, *slurred),
            };
            let code = match note {
                PatternNote::Pitch(p) => {
                    let offset = p - cur;
                    usize::try_from(offset)
                        .ok()
                        .and_then(|o| PITCH_NAMES.get(o))
                        .ok_or_else(|| {
                            CompileError::structural(format!(
                                "pitch {p} is outside the transpose run starting at {cur}"
                            ))
                        })?
                        .to_string()
                }
                PatternNote::Rest => "REST".to_string(),
                PatternNote::Wait => "N_TIE".to_string(),
                PatternNote::Drum(name) => {
                    let drum = score.drums.resolve(name, &self.name).ok_or_else(|| {
                        CompileError::reference(format!(
                            "pattern {} uses unknown drum {name}",
                            self.name
                        ))
                    })?;
                    format!("DR_{}", asm_name(&drum.name))
                }
            };
            if matches!(note, PatternNote::Pitch(_) | PatternNote::Drum(_)) && prev_slurred != legato {
                legato = prev_slurred;
                codes.push(if legato {
                    PatternCode::LegatoOn
                } else {
                    PatternCode::LegatoOff
                });
            }
            prev_slurred = slurred;

            if rows < 0 {
                codes.push(PatternCode::Grace(rows.unsigned_abs()));
                codes.push(PatternCode::Note {
                    code,
                    duration: None,
                });
                continue;
            }
            let mut code = code;
            for duration in decompose_rows(rows as u32) {
                codes.push(PatternCode::Note {
                    code: std::mem::replace(&mut code, "N_TIE".to_string()),
                    duration: Some(duration),
                });
            }
        }

        if cur != base {
            codes.push(PatternCode::Transpose(base - cur));
        }
        if !self.fallthrough {
            if legato {
                codes.push(PatternCode::LegatoOff);
            }
            codes.push(PatternCode::PatEnd);
        }
        Ok(codes)
    }

    fn encode_effect(&self, effect: &Effect, score: &Score) -> Result<PatternCode> {
        let code = match effect {
            Effect::Instrument(name) => {
                let inst = score.instruments.resolve(name, &self.name).ok_or_else(|| {
                    CompileError::reference(format!(
                        "pattern {} uses unknown instrument {name}",
                        self.name
                    ))
                })?;
                PatternCode::Instrument(format!("PI_{}", asm_name(&inst.name)))
            }
            Effect::Arpeggio(code) => PatternCode::Arpeggio(code.clone()),
            Effect::FastArp => PatternCode::FastArp,
            Effect::SlowArp => PatternCode::SlowArp,
            Effect::Bend(rate) => PatternCode::Bend(*rate),
            Effect::Vibrato(depth) => PatternCode::Vibrato(*depth),
            Effect::ChannelVolume(level) => PatternCode::ChannelVolume(*level),
        };
        Ok(code)
    }
}

/// Merge waits and ties into the notes they extend, and insert arpeggio
/// changes where a note's chord differs from the one before.
fn collapse_ties(items: &[PatternItem], is_drum: bool) -> Vec<Collapsed> {
    let mut out: Vec<Collapsed> = Vec::new();
    let mut last_arp: Option<&str> = None;
    let mut slur_active = false;

    for item in items {
        let (note, rows, slur, arp) = match item {
            PatternItem::Effect(effect) => {
                out.push(Collapsed::Effect(effect.clone()));
                continue;
            }
            PatternItem::Note {
                note,
                rows,
                slur,
                arp,
            } => (note, *rows, *slur, arp.as_deref()),
        };
        if arp.is_some() && arp != last_arp {
            if let Some(code) = arp {
                out.push(Collapsed::Effect(Effect::Arpeggio(code.to_string())));
            }
            last_arp = arp;
        }

        let mut note = note.clone();
        if is_drum && note == PatternNote::Rest {
            note = PatternNote::Wait;
        }
        if note == PatternNote::Wait && out.is_empty() {
            note = PatternNote::Rest;
        }

        let slurred = match slur {
            SlurMark::Open => {
                slur_active = true;
                true
            }
            SlurMark::Close => {
                slur_active = false;
                false
            }
            SlurMark::Tie => true,
            SlurMark::None => slur_active,
        };
        let slurred = slurred && !matches!(note, PatternNote::Rest | PatternNote::Wait);

        if let Some(Collapsed::Note {
            note: prev_note,
            rows: prev_rows,
            slurred: prev_slurred,
        }) = out.last_mut()
        {
            let extends = note == PatternNote::Wait || (*prev_slurred && *prev_note == note);
            if rows > 0 && *prev_rows > 0 && extends {
                *prev_rows += rows;
                *prev_slurred = slurred;
                continue;
            }
        }
        out.push(Collapsed::Note {
            note,
            rows,
            slurred,
        });
    }
    out
}

/// Drop arpeggio changes that no note plays before the next change.
fn collapse_effects(items: Vec<Collapsed>) -> Vec<Collapsed> {
    let mut kept = Vec::with_capacity(items.len());
    let mut note_follows = false;
    for item in items.into_iter().rev() {
        match &item {
            Collapsed::Note { note, .. } => {
                if *note != PatternNote::Rest {
                    note_follows = true;
                }
            }
            Collapsed::Effect(Effect::Arpeggio(code)) => {
                if !note_follows {
                    debug!(arpeggio = %code, "dropping unused arpeggio change");
                    continue;
                }
                note_follows = false;
            }
            Collapsed::Effect(_) => {}
        }
        kept.push(item);
    }
    kept.reverse();
    kept
}

/// Split pitched notes into runs spanning at most two octaves. Returns
/// each run's first item index and lowest pitch.
fn transpose_runs(items: &[Collapsed]) -> Vec<(usize, i32)> {
    let mut runs: Vec<(usize, i32)> = Vec::new();
    let mut high = 0;
    for (i, item) in items.iter().enumerate() {
        let Collapsed::Note {
            note: PatternNote::Pitch(p),
            ..
        } = item
        else {
            continue;
        };
        let p = *p;
        match runs.last_mut() {
            None => {
                runs.push((0, p));
                high = p;
            }
            Some(run) => {
                let low = run.1.min(p);
                let new_high = high.max(p);
                if new_high - low > MAX_RUN_SPAN {
                    runs.push((i, p));
                    high = p;
                } else {
                    run.1 = low;
                    high = new_high;
                }
            }
        }
    }
    runs
}

impl Entity for Pattern {
    fn name(&self) -> &str {
        &self.name
    }

    fn loc(&self) -> &SourceLoc {
        &self.loc
    }
}

impl Renderable for Pattern {
    fn render(&self, score: &Score, _diag: &mut Diagnostics) -> Result<Rendered> {
        let codes = self.encode(score)?;
        let name = asm_name(&self.name);
        let size: usize = codes.iter().map(PatternCode::size).sum();
        Ok(Rendered {
            label: format!("PP_{name}"),
            definition: format!("patdef PP_{name}, PPDAT_{name}"),
            data: Some(DataBlock {
                label: format!("PPDAT_{name}"),
                format: DataFormat::Byte,
                atoms: codes.iter().map(ToString::to_string).collect(),
                packable: None,
            }),
            byte_size: size + 2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(track: Option<Track>, text: &str) -> Pattern {
        let mut pat = Pattern::new(
            "p",
            SourceLoc::new("t", 1),
            track,
            None,
            &PitchContext::new(),
            &RhythmContext::new(),
        );
        let mut warnings = Vec::new();
        for word in text.split_whitespace() {
            pat.add_word(word, &mut warnings).unwrap();
        }
        pat
    }

    fn atoms(pat: &Pattern) -> Vec<String> {
        pat.encode(&Score::default())
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn scale_in_quarters() {
        let pat = pattern(None, "c d e f");
        assert_eq!(
            atoms(&pat),
            vec!["N_C|D_4", "N_D|D_4", "N_E|D_4", "N_F|D_4", "PATEND"]
        );
        assert_eq!(pat.base_transpose(), Some(15));
        assert_eq!(pat.rows(), 16);
    }

    #[test]
    fn long_notes_split_into_ties() {
        let pat = pattern(None, "c1. r16");
        assert_eq!(
            atoms(&pat),
            vec!["N_C|D_1", "N_TIE|D_2", "REST", "PATEND"]
        );
    }

    #[test]
    fn tie_merges_same_pitch() {
        let pat = pattern(None, "c4~ c8 d8");
        assert_eq!(atoms(&pat), vec!["N_C|D_D4", "N_D|D_8", "PATEND"]);
    }

    #[test]
    fn wait_after_tie_ends_the_tie() {
        let pat = pattern(None, "c4~ w4 c4 d4~ w4 e4");
        assert_eq!(
            atoms(&pat),
            vec!["N_C|D_2", "N_C|D_4", "N_D|D_2", "N_E|D_4", "PATEND"]
        );
    }

    #[test]
    fn wait_extends_previous_note() {
        let pat = pattern(None, "e2 w4 w4");
        assert_eq!(atoms(&pat), vec!["N_C|D_1", "PATEND"]);
    }

    #[test]
    fn leading_wait_becomes_rest() {
        let pat = pattern(Some(Track::Pulse1), "w2 c2");
        assert_eq!(atoms(&pat), vec!["REST|D_2", "N_C|D_2", "PATEND"]);
    }

    #[test]
    fn legato_run() {
        let pat = pattern(None, "c8( d8 e8) f8");
        assert_eq!(
            atoms(&pat),
            vec![
                "N_C|D_8",
                "LEGATO_ON",
                "N_D|D_8",
                "N_E|D_8",
                "LEGATO_OFF",
                "N_F|D_8",
                "PATEND"
            ]
        );
    }

    #[test]
    fn transpose_runs_split_wide_leaps() {
        let pat = pattern(None, "c,, c'' c,,");
        assert_eq!(
            atoms(&pat),
            vec![
                "N_C|D_4",
                "TRANSPOSE,<48",
                "N_C|D_4",
                "TRANSPOSE,<-48",
                "N_C|D_4",
                "PATEND"
            ]
        );
    }

    #[test]
    fn arpeggio_changes_emitted_once() {
        let pat = pattern(None, "c:M d:M e");
        assert_eq!(
            atoms(&pat),
            vec![
                "ARPEGGIO,$47",
                "N_C|D_4",
                "N_D|D_4",
                "ARPEGGIO,$00",
                "N_E|D_4",
                "PATEND"
            ]
        );
    }

    #[test]
    fn trailing_arpeggio_dropped() {
        let items = vec![
            Collapsed::Note {
                note: PatternNote::Pitch(20),
                rows: 4,
                slurred: false,
            },
            Collapsed::Effect(Effect::Arpeggio("47".into())),
            Collapsed::Note {
                note: PatternNote::Rest,
                rows: 4,
                slurred: false,
            },
        ];
        let out = collapse_effects(items);
        assert_eq!(out.len(), 2);
        assert!(!out.iter().any(|i| matches!(i, Collapsed::Effect(_))));
    }

    #[test]
    fn effect_words() {
        let pat = pattern(None, "mf EP05 MP9 ENP1 EPOF c");
        assert_eq!(
            atoms(&pat),
            vec!["CHVOLUME,3", "BEND,$05", "VIBRATO,4", "FASTARP", "BEND,$00", "N_C|D_4", "PATEND"]
        );
    }

    #[test]
    fn malformed_effects_warn() {
        let mut pat = pattern(None, "");
        let mut warnings = Vec::new();
        pat.add_word("EP3F", &mut warnings).unwrap();
        pat.add_word("MPxx", &mut warnings).unwrap();
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn grace_notes() {
        let pat = pattern(Some(Track::Pulse2), "d3g c2");
        assert_eq!(
            atoms(&pat),
            vec!["GRACE,3", "N_D", "N_C|D_2", "PATEND"]
        );
    }

    #[test]
    fn fallthrough_omits_patend() {
        let mut pat = pattern(None, "c");
        pat.fallthrough = true;
        assert_eq!(atoms(&pat), vec!["N_C|D_4"]);
    }

    #[test]
    fn first_drum_word_selects_drum_mode() {
        let pat = pattern(None, "kick8 snare8 r8 kick8");
        assert_eq!(pat.track, Some(Track::Drum));
        assert!(pat.is_drum());
        assert_eq!(pat.base_transpose(), None);
        let err = pat.encode(&Score::default()).unwrap_err();
        assert_eq!(err.kind, crate::mml::error::ErrorKind::Reference);
    }

    #[test]
    fn ambiguous_first_word() {
        let mut pat = pattern(None, "");
        let err = pat.add_word("ab", &mut Vec::new()).unwrap_err();
        assert!(err.message.contains("ambiguous"));
        let err = pat.add_word("5", &mut Vec::new()).unwrap_err();
        assert!(err.message.contains("unknown first note"));
    }

    #[test]
    fn rests_do_not_pick_a_mode() {
        let pat = pattern(None, "r4 kick4");
        assert!(pat.is_drum());
    }

    #[test]
    fn drum_patterns_reject_octave_modes() {
        let mut pat = pattern(Some(Track::Drum), "");
        assert!(pat.add_word("relative", &mut Vec::new()).is_err());
    }

    #[test]
    fn drum_rests_become_waits() {
        let items = vec![
            PatternItem::Note {
                note: PatternNote::Drum("kick".into()),
                rows: 2,
                slur: SlurMark::None,
                arp: None,
            },
            PatternItem::Note {
                note: PatternNote::Rest,
                rows: 2,
                slur: SlurMark::None,
                arp: None,
            },
        ];
        let out = collapse_ties(&items, true);
        assert_eq!(
            out,
            vec![Collapsed::Note {
                note: PatternNote::Drum("kick".into()),
                rows: 4,
                slurred: false,
            }]
        );
    }

    #[test]
    fn only_rests_have_no_transpose() {
        let pat = pattern(Some(Track::Triangle), "r1 r1");
        assert_eq!(pat.base_transpose(), None);
    }

    #[test]
    fn bar_check() {
        let mut warnings = Vec::new();
        let mut pat = pattern(None, "c d e");
        pat.add_word("|", &mut warnings).unwrap();
        assert_eq!(warnings.len(), 1);
        pat.add_word("f", &mut warnings).unwrap();
        pat.add_word("|", &mut warnings).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn code_sizes() {
        assert_eq!(PatternCode::Transpose(3).size(), 2);
        assert_eq!(PatternCode::LegatoOn.size(), 1);
        let note = PatternCode::Note {
            code: "N_C".into(),
            duration: Some(DurationCode::Quarter),
        };
        assert_eq!(note.size(), 1);
    }

    #[test]
    fn track_names() {
        assert_eq!(Track::from_name("noise"), Some(Track::Drum));
        assert_eq!(Track::Drum.suffix(), "Noise");
        assert_eq!(Track::Triangle.mute_bit(), 4);
        assert!(Track::from_name("pulse3").is_none());
    }
}
