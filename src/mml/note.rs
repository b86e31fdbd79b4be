//! Note word scanning: splits words like `>c#8.:m~` or `kick4` into parts.
//!
//! These scanners only check syntax. Pitch, rhythm and chord meaning are
//! applied by [`super::pitch`] and [`super::rhythm`].

use serde::Serialize;

/// Accidental spellings, longest first so that `bb` wins over `b`.
const ACCIDENTALS: [&str; 15] = [
    "eses", "isis", "bb", "--", "es", "ss", "is", "##", "++", "b", "-", "s", "#", "+", "x",
];

/// Semitone offset of an accidental spelling.
pub fn accidental_semitones(acc: &str) -> Option<i32> {
    let semis = match acc {
        "" => 0,
        "b" | "-" | "es" => -1,
        "bb" | "--" | "eses" => -2,
        "#" | "+" | "s" | "is" => 1,
        "##" | "++" | "ss" | "x" | "isis" => 2,
        _ => return None,
    };
    Some(semis)
}

/// Length multiplier written after a duration number, in quarters of the
/// written duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Augment {
    Plain,
    Dotted,
    DoubleDotted,
    /// `g`: the number counts frames of a grace note.
    Grace,
}

impl Augment {
    pub fn quarters(self) -> u32 {
        match self {
            Augment::Plain => 4,
            Augment::Dotted => 6,
            Augment::DoubleDotted => 7,
            Augment::Grace => 0,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Augment::Plain => "",
            Augment::Dotted => ".",
            Augment::DoubleDotted => "..",
            Augment::Grace => "g",
        }
    }
}

/// Slur mark that may end a note word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlurMark {
    None,
    /// `(` starts a legato run.
    Open,
    /// `)` ends a legato run.
    Close,
    /// `~` ties into the next note.
    Tie,
}

/// A pitch or rest word split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteWord {
    /// `>`/`<` marks written before the letter.
    pub pre_octave: String,
    /// One of `a`-`h`, or `r` (rest), `w` (wait), `l` (length), `q` (repeat chord).
    pub letter: char,
    pub accidental: String,
    /// `'`/`,` marks written after the accidental.
    pub post_octave: String,
    /// Duration number; `u32::MAX` if too long to parse so range checks fail.
    pub duration: Option<u32>,
    pub augment: Augment,
    /// Arpeggio text after `:`, including any `-` and `/N`.
    pub arp: Option<String>,
    pub slur: SlurMark,
}

impl NoteWord {
    /// Whether the word carries an accidental or octave mark.
    pub fn has_pitch_marks(&self) -> bool {
        !(self.pre_octave.is_empty() && self.accidental.is_empty() && self.post_octave.is_empty())
    }
}

/// A drum word split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrumWord {
    /// Drum name, or `r`, `w` or `l`.
    pub name: String,
    pub duration: Option<u32>,
    pub augment: Augment,
}

/// Scan a pattern note word: `(>*|<*)letter accidental (,*|'*) digits augment (:arp)? slur?`.
pub fn scan_note(word: &str) -> Option<NoteWord> {
    let (pre_octave, rest) = take_octave_marks(word, '>', '<');
    let mut chars = rest.chars();
    let letter = chars.next()?;
    if !matches!(letter, 'a'..='h' | 'r' | 'w' | 'l' | 'q') {
        return None;
    }
    let rest = chars.as_str();
    for acc in ACCIDENTALS.iter().copied().chain(std::iter::once("")) {
        let Some(tail) = rest.strip_prefix(acc) else {
            continue;
        };
        if let Some(note) = scan_note_tail(tail) {
            return Some(NoteWord {
                pre_octave: pre_octave.to_string(),
                letter,
                accidental: acc.to_string(),
                ..note
            });
        }
    }
    None
}

/// Scan everything after the accidental.
fn scan_note_tail(s: &str) -> Option<NoteWord> {
    let (post_octave, s) = take_octave_marks(s, '\'', ',');
    let (duration, s) = take_digits(s);
    let (augment, s) = take_augment(s);
    let (arp, s) = match s.strip_prefix(':') {
        Some(after) => {
            let len = arp_len(after)?;
            (Some(after[..len].to_string()), &after[len..])
        }
        None => (None, s),
    };
    let slur = match s {
        "" => SlurMark::None,
        "(" => SlurMark::Open,
        ")" => SlurMark::Close,
        "~" => SlurMark::Tie,
        _ => return None,
    };
    Some(NoteWord {
        pre_octave: String::new(),
        letter: 'r',
        accidental: String::new(),
        post_octave: post_octave.to_string(),
        duration,
        augment,
        arp,
        slur,
    })
}

/// Scan a bare pitch such as `c#'` or `>e-`, with nothing after it.
pub fn scan_pitch(word: &str) -> Option<NoteWord> {
    scan_note(word).filter(|n| {
        n.duration.is_none() && n.augment == Augment::Plain && n.arp.is_none() && n.slur == SlurMark::None
    })
}

/// Scan a drum pattern word: `name digits augment`, where a name starts and
/// ends with a letter or `_`, or is one of `r`, `w`, `l`.
pub fn scan_drum(word: &str) -> Option<DrumWord> {
    let name_end = word
        .char_indices()
        .take_while(|&(_, c)| c.is_ascii_alphanumeric() || c == '_')
        .last()
        .map(|(i, c)| i + c.len_utf8())?;
    // Back off until the name ends with a letter or underscore.
    let mut end = name_end;
    while end > 0 {
        let name = &word[..end];
        let last_ok = name.ends_with(|c: char| c.is_ascii_alphabetic() || c == '_');
        if last_ok && (is_drum_name(name) || matches!(name, "r" | "w" | "l")) {
            let (duration, rest) = take_digits(&word[end..]);
            let (augment, rest) = take_augment(rest);
            if rest.is_empty() {
                return Some(DrumWord {
                    name: name.to_string(),
                    duration,
                    augment,
                });
            }
        }
        end -= 1;
    }
    None
}

/// Whether `name` can name a drum: at least two characters, beginning and
/// ending with a letter or `_`, with letters, digits or `_` between.
pub fn is_drum_name(name: &str) -> bool {
    let edge = |c: char| c.is_ascii_alphabetic() || c == '_';
    name.len() >= 2
        && name.starts_with(edge)
        && name.ends_with(edge)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check arpeggio syntax: `-?(name|hex{1,2})(/[12])?`. Returns the length
/// of the arpeggio text at the start of `s`.
fn arp_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = usize::from(bytes.first() == Some(&b'-'));
    match bytes.get(i) {
        Some(c) if c.is_ascii_alphabetic() => {
            i += 1;
            while bytes.get(i).is_some_and(|c| c.is_ascii_alphanumeric()) {
                i += 1;
            }
        }
        Some(c) if c.is_ascii_hexdigit() => {
            i += 1;
            if bytes.get(i).is_some_and(|c| c.is_ascii_hexdigit()) {
                i += 1;
            }
        }
        _ => return None,
    }
    if bytes.get(i) == Some(&b'/') && matches!(bytes.get(i + 1), Some(b'1' | b'2')) {
        i += 2;
    }
    Some(i)
}

/// Whether an entire word is valid arpeggio syntax.
pub fn is_arp(s: &str) -> bool {
    arp_len(s) == Some(s.len())
}

fn take_octave_marks(s: &str, up: char, down: char) -> (&str, &str) {
    let first = match s.chars().next() {
        Some(c) if c == up || c == down => c,
        _ => return ("", s),
    };
    let len = s.len() - s.trim_start_matches(first).len();
    s.split_at(len)
}

fn take_digits(s: &str) -> (Option<u32>, &str) {
    let len = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if len == 0 {
        return (None, s);
    }
    let value = s[..len].parse().unwrap_or(u32::MAX);
    (Some(value), &s[len..])
}

fn take_augment(s: &str) -> (Augment, &str) {
    if let Some(rest) = s.strip_prefix("..") {
        (Augment::DoubleDotted, rest)
    } else if let Some(rest) = s.strip_prefix('.') {
        (Augment::Dotted, rest)
    } else if let Some(rest) = s.strip_prefix('g') {
        (Augment::Grace, rest)
    } else {
        (Augment::Plain, s)
    }
}
