//! Songs: the conductor track that starts and stops patterns over time.

use serde::Serialize;

use super::error::{CompileError, Diagnostics, Result};
use super::field::SetOnce;
use super::lexer::SourceLoc;
use super::pattern::Track;
use super::pitch::PitchContext;
use super::render::{asm_name, DataBlock, DataFormat, Entity, Renderable, Rendered};
use super::rhythm::{DurationCode, MeasurePos, RhythmContext};
use super::scope::Score;

/// Fastest playback the engine supports, in rows per minute.
pub const MAX_ROW_TEMPO: u32 = 1500;

/// Longest single wait the conductor can encode.
const MAX_WAIT_ROWS: u32 = 256;

/// Rehearsal marks beyond this many are not exported.
pub const MAX_MARKS: usize = 32;

/// One conductor command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConductorEvent {
    SetTempo(u32),
    SetBeatDuration(#[serde(serialize_with = "beat_name")] DurationCode),
    WaitRows(u32),
    Play {
        pattern: String,
        track: Option<Track>,
        instrument: Option<String>,
        transpose: i32,
        loc: SourceLoc,
    },
    NoteOn {
        track: Track,
        pitch: i32,
        instrument: String,
        loc: SourceLoc,
    },
    Stop(Track),
    AttackOn(Track),
    Segno,
    Fine,
    DalSegno,
}

fn beat_name<S: serde::Serializer>(code: &DurationCode, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(code.beat_name())
}

impl ConductorEvent {
    /// Bytes taken in the conductor stream.
    fn size(&self) -> usize {
        match self {
            ConductorEvent::SetTempo(_) | ConductorEvent::WaitRows(_) => 2,
            ConductorEvent::NoteOn { .. } => 3,
            ConductorEvent::Play { .. } | ConductorEvent::Stop(_) => 4,
            ConductorEvent::SetBeatDuration(_)
            | ConductorEvent::AttackOn(_)
            | ConductorEvent::Segno
            | ConductorEvent::Fine
            | ConductorEvent::DalSegno => 1,
        }
    }
}

/// How a song ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongEnd {
    Fine,
    DalSegno,
    DaCapo,
}

impl SongEnd {
    /// Parse the words of a `fine`, `dal segno` or `da capo` line.
    pub fn from_words(words: &[String]) -> Result<Self> {
        match words.join(" ").to_lowercase().as_str() {
            "fine" => Ok(SongEnd::Fine),
            "dal segno" | "dalsegno" => Ok(SongEnd::DalSegno),
            "da capo" | "dacapo" => Ok(SongEnd::DaCapo),
            other => Err(CompileError::grammar(format!(
                "unknown song end {other}; try fine, dal segno or da capo"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RehearsalMark {
    pub name: String,
    pub rows: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub name: String,
    pub loc: SourceLoc,
    #[serde(skip)]
    pub pitch: PitchContext,
    #[serde(skip)]
    pub rhythm: RhythmContext,
    tempo: f64,
    #[serde(skip)]
    last_row_tempo: Option<u32>,
    #[serde(skip)]
    last_beat: Option<u32>,
    segno: SetOnce<u32>,
    events: Vec<ConductorEvent>,
    byte_size: usize,
    rows: u32,
    marks: Vec<RehearsalMark>,
    pub mute: SetOnce<u8>,
    pub title: SetOnce<String>,
    pub author: SetOnce<String>,
}

impl Song {
    pub fn new(name: impl Into<String>, loc: SourceLoc, pitch: &PitchContext, rhythm: &RhythmContext) -> Self {
        let mut rhythm = rhythm.clone();
        rhythm.set_measure(MeasurePos { measure: 1, row: 0 });
        Self {
            name: name.into(),
            loc,
            pitch: pitch.child(),
            rhythm,
            tempo: 100.0,
            last_row_tempo: None,
            last_beat: None,
            segno: SetOnce::default(),
            events: Vec::new(),
            byte_size: 2,
            rows: 0,
            marks: Vec::new(),
            mute: SetOnce::default(),
            title: SetOnce::default(),
            author: SetOnce::default(),
        }
    }

    pub fn events(&self) -> &[ConductorEvent] {
        &self.events
    }

    pub fn marks(&self) -> &[RehearsalMark] {
        &self.marks
    }

    /// Rows elapsed since the start of the song.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    fn push(&mut self, event: ConductorEvent) {
        self.byte_size += event.size();
        self.events.push(event);
    }

    /// Set the tempo in beats per minute. Takes effect at the next wait.
    pub fn set_tempo(&mut self, tempo: f64) -> Result<()> {
        if !(1.0..=f64::from(MAX_ROW_TEMPO)).contains(&tempo) {
            return Err(CompileError::range(format!(
                "tempo must be 1 to {MAX_ROW_TEMPO} beats per minute, not {tempo}"
            )));
        }
        self.tempo = tempo;
        Ok(())
    }

    /// Advance the conductor by `rows`, emitting tempo and beat changes
    /// first if they differ from what the engine last saw.
    pub fn wait_rows(&mut self, rows: u32) -> Result<()> {
        if rows == 0 {
            return Ok(());
        }
        let beat = self.rhythm.beat_length()?;
        let row_tempo = (self.tempo * f64::from(beat)).round_ties_even();
        if row_tempo > f64::from(MAX_ROW_TEMPO) {
            return Err(CompileError::range(format!(
                "tempo of {row_tempo} rows per minute exceeds {MAX_ROW_TEMPO}; \
                 use a slower tempo or a coarser scale"
            )));
        }
        let row_tempo = row_tempo as u32;
        if self.last_row_tempo != Some(row_tempo) {
            self.push(ConductorEvent::SetTempo(row_tempo));
            self.last_row_tempo = Some(row_tempo);
        }
        if self.last_beat != Some(beat) {
            let code = DurationCode::for_rows(beat).ok_or_else(|| {
                CompileError::range(format!("a beat of {beat} rows has no duration code"))
            })?;
            self.push(ConductorEvent::SetBeatDuration(code));
            self.last_beat = Some(beat);
        }
        let mut remaining = rows;
        while remaining > MAX_WAIT_ROWS {
            self.push(ConductorEvent::WaitRows(MAX_WAIT_ROWS));
            remaining -= MAX_WAIT_ROWS;
        }
        self.push(ConductorEvent::WaitRows(remaining));
        self.rows += rows;
        Ok(())
    }

    /// Wait until `measure:beat:row`.
    pub fn wait_until(&mut self, measure: i32, beat: u32, row: u32) -> Result<()> {
        let target = self.rhythm.parse_measure(measure, beat, row)?;
        let rows = self.rhythm.wait_for_measure(target)?;
        self.wait_rows(rows)
    }

    /// Declare that the song's current position is `measure:beat:row`.
    pub fn pickup(&mut self, measure: i32, beat: u32, row: u32) -> Result<()> {
        let pos = self.rhythm.parse_measure(measure, beat, row)?;
        self.rhythm.set_measure(pos);
        Ok(())
    }

    pub fn set_segno(&mut self, loc: &SourceLoc) -> Result<()> {
        let name = self.name.clone();
        self.segno.set(self.rows, loc, "segno", &name)?;
        self.push(ConductorEvent::Segno);
        Ok(())
    }

    pub fn end(&mut self, end: SongEnd) -> Result<()> {
        let event = match end {
            SongEnd::Fine => ConductorEvent::Fine,
            SongEnd::DalSegno if !self.segno.is_set() => {
                return Err(CompileError::structural(format!(
                    "dal segno in song {} requires a segno",
                    self.name
                )))
            }
            SongEnd::DaCapo if self.segno.is_set() => {
                return Err(CompileError::structural(format!(
                    "cannot da capo after segno in song {}; try dal segno",
                    self.name
                )))
            }
            SongEnd::DalSegno | SongEnd::DaCapo => ConductorEvent::DalSegno,
        };
        self.push(event);
        Ok(())
    }

    /// Turn on the attack track for a pitched channel.
    pub fn attack_on(&mut self, track: Track) -> Result<()> {
        if !matches!(track, Track::Pulse1 | Track::Pulse2 | Track::Triangle) {
            return Err(CompileError::grammar(format!(
                "attack must be on pulse1, pulse2 or triangle, not {}",
                track.name()
            )));
        }
        self.push(ConductorEvent::AttackOn(track));
        Ok(())
    }

    pub fn play(
        &mut self,
        pattern: String,
        track: Option<Track>,
        instrument: Option<String>,
        transpose: i32,
        loc: &SourceLoc,
    ) {
        self.push(ConductorEvent::Play {
            pattern,
            track,
            instrument,
            transpose,
            loc: loc.clone(),
        });
    }

    pub fn note_on(&mut self, track: Track, pitch: i32, instrument: String, loc: &SourceLoc) {
        self.push(ConductorEvent::NoteOn {
            track,
            pitch,
            instrument,
            loc: loc.clone(),
        });
    }

    pub fn stop(&mut self, tracks: &[Track]) {
        for &track in tracks {
            self.push(ConductorEvent::Stop(track));
        }
    }

    /// Record a rehearsal mark at the current row. Returns warnings.
    pub fn add_mark(&mut self, name: &str) -> Result<Vec<String>> {
        if self.marks.iter().any(|m| m.name == name) {
            return Err(CompileError::redefinition(format!(
                "mark {name} is already defined in song {}",
                self.name
            )));
        }
        let mut warnings = Vec::new();
        if !name.is_ascii() {
            warnings.push(format!("mark name {name} contains non-ASCII characters"));
        }
        if self.marks.len() == MAX_MARKS {
            warnings.push(format!(
                "song {} has more than {MAX_MARKS} marks; later marks are not exported",
                self.name
            ));
        }
        self.marks.push(RehearsalMark {
            name: name.to_string(),
            rows: self.rows,
        });
        Ok(warnings)
    }

    pub fn mark_rows(&self, name: &str) -> Option<u32> {
        self.marks.iter().find(|m| m.name == name).map(|m| m.rows)
    }

    #[allow(clippy::too_many_arguments)]
    fn render_play(
        &self,
        pattern: &str,
        track: Option<Track>,
        instrument: Option<&str>,
        transpose: i32,
        loc: &SourceLoc,
        score: &Score,
        diag: &mut Diagnostics,
    ) -> Result<String> {
        let pat = score
            .patterns
            .resolve(pattern, &self.name)
            .ok_or_else(|| CompileError::reference(format!("unknown pattern {pattern}")))?;
        let pat_label = format!("PP_{}", asm_name(&pat.name));
        let track = match track.or(pat.track) {
            Some(track) => track,
            None => {
                diag.warn(
                    Some(loc),
                    format!("no track for pattern {pattern}; using pulse1"),
                );
                Track::Pulse1
            }
        };
        if track == Track::Drum {
            if !pat.is_drum() {
                return Err(CompileError::structural(format!(
                    "cannot play pitched pattern {pattern} on the drum track"
                )));
            }
            return Ok(format!("playPatNoise {pat_label}"));
        }
        if pat.is_drum() {
            return Err(CompileError::structural(format!(
                "cannot play drum pattern {pattern} on {}",
                track.name()
            )));
        }
        let base = pat.base_transpose().ok_or_else(|| {
            CompileError::structural(format!(
                "pattern {pattern} has only rests; use stop instead"
            ))
        })?;
        let transpose = transpose + base;
        if transpose < 0 {
            return Err(CompileError::range(format!(
                "pattern {pattern} transposed below the lowest note"
            )));
        }
        let inst_label = match (instrument, &pat.instrument) {
            (Some(name), _) => self.instrument_label(name, &self.name, score)?,
            (None, Some(name)) => self.instrument_label(name, &pat.name, score)?,
            (None, None) => {
                diag.warn(
                    Some(loc),
                    format!("no instrument for pattern {pattern}; using instrument 0"),
                );
                "0".to_string()
            }
        };
        Ok(format!(
            "playPat{} {pat_label}, {transpose}, {inst_label}",
            track.suffix()
        ))
    }

    fn instrument_label(&self, name: &str, scope: &str, score: &Score) -> Result<String> {
        score
            .instruments
            .resolve(name, scope)
            .map(|inst| format!("PI_{}", asm_name(&inst.name)))
            .ok_or_else(|| CompileError::reference(format!("unknown instrument {name}")))
    }
}

impl Entity for Song {
    fn name(&self) -> &str {
        &self.name
    }

    fn loc(&self) -> &SourceLoc {
        &self.loc
    }
}

impl Renderable for Song {
    fn render(&self, score: &Score, diag: &mut Diagnostics) -> Result<Rendered> {
        let mut lines = Vec::with_capacity(self.events.len());
        for event in &self.events {
            let line = match event {
                ConductorEvent::SetTempo(t) => format!("setTempo {t}"),
                ConductorEvent::SetBeatDuration(code) => {
                    format!("setBeatDuration {}", code.beat_name())
                }
                ConductorEvent::WaitRows(n) => format!("waitRows {n}"),
                ConductorEvent::Play {
                    pattern,
                    track,
                    instrument,
                    transpose,
                    loc,
                } => self
                    .render_play(pattern, *track, instrument.as_deref(), *transpose, loc, score, diag)
                    .map_err(|e| e.at(loc, &[]))?,
                ConductorEvent::NoteOn {
                    track,
                    pitch,
                    instrument,
                    loc,
                } => {
                    let inst = self
                        .instrument_label(instrument, &self.name, score)
                        .map_err(|e| e.at(loc, &[]))?;
                    format!("noteOn{} {pitch}, {inst}", track.suffix())
                }
                ConductorEvent::Stop(track) => format!("stopPat{}", track.suffix()),
                ConductorEvent::AttackOn(track) => format!("attackOn{}", track.suffix()),
                ConductorEvent::Segno => "segno".to_string(),
                ConductorEvent::Fine => "fine".to_string(),
                ConductorEvent::DalSegno => "dalSegno".to_string(),
            };
            lines.push(line);
        }
        let name = asm_name(&self.name);
        Ok(Rendered {
            label: format!("PS_{name}"),
            definition: format!("songdef PS_{name}, PSDAT_{name}"),
            data: Some(DataBlock {
                label: format!("PSDAT_{name}"),
                format: DataFormat::Statements,
                atoms: lines,
                packable: None,
            }),
            byte_size: self.byte_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> Song {
        Song::new(
            "test",
            SourceLoc::new("t", 1),
            &PitchContext::new(),
            &RhythmContext::new(),
        )
    }

    fn lines(song: &Song, score: &Score) -> Vec<String> {
        song.render(score, &mut Diagnostics::new())
            .unwrap()
            .data
            .unwrap()
            .atoms
    }

    #[test]
    fn first_wait_sets_tempo_and_beat() {
        let mut s = song();
        s.wait_until(2, 1, 0).unwrap();
        s.end(SongEnd::Fine).unwrap();
        assert_eq!(
            lines(&s, &Score::default()),
            vec!["setTempo 400", "setBeatDuration D_4", "waitRows 16", "fine"]
        );
        assert_eq!(s.rows(), 16);
    }

    #[test]
    fn long_waits_are_chunked() {
        let mut s = song();
        s.wait_rows(600).unwrap();
        let waits: Vec<_> = s
            .events()
            .iter()
            .filter_map(|e| match e {
                ConductorEvent::WaitRows(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(waits, vec![256, 256, 88]);
    }

    #[test]
    fn tempo_change_emitted_once() {
        let mut s = song();
        s.wait_rows(4).unwrap();
        s.wait_rows(4).unwrap();
        s.set_tempo(120.0).unwrap();
        s.wait_rows(4).unwrap();
        let tempos: Vec<_> = s
            .events()
            .iter()
            .filter_map(|e| match e {
                ConductorEvent::SetTempo(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(tempos, vec![400, 480]);
    }

    #[test]
    fn tempo_bounds() {
        let mut s = song();
        assert!(s.set_tempo(0.5).is_err());
        assert!(s.set_tempo(1501.0).is_err());
        s.set_tempo(1000.0).unwrap();
        let err = s.wait_rows(1).unwrap_err();
        assert!(err.message.contains("exceeds 1500"));
    }

    #[test]
    fn row_tempo_rounds_half_to_even() {
        let mut s = song();
        s.rhythm.set_scale(2).unwrap();
        s.rhythm.set_time_signature(2, 2).unwrap();
        s.set_tempo(100.5).unwrap();
        s.wait_rows(1).unwrap();
        assert_eq!(s.events()[0], ConductorEvent::SetTempo(100));
    }

    #[test]
    fn dal_segno_needs_segno() {
        let mut s = song();
        assert!(s.end(SongEnd::DalSegno).is_err());
        s.set_segno(&SourceLoc::new("t", 2)).unwrap();
        assert!(s.set_segno(&SourceLoc::new("t", 3)).is_err());
        assert!(s.end(SongEnd::DaCapo).is_err());
        s.end(SongEnd::DalSegno).unwrap();
    }

    #[test]
    fn song_end_words() {
        let w = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(SongEnd::from_words(&w("dal segno")).unwrap(), SongEnd::DalSegno);
        assert_eq!(SongEnd::from_words(&w("daCapo")).unwrap(), SongEnd::DaCapo);
        assert!(SongEnd::from_words(&w("dal fine")).is_err());
    }

    #[test]
    fn attack_only_on_melodic_channels() {
        let mut s = song();
        s.attack_on(Track::Pulse2).unwrap();
        assert!(s.attack_on(Track::Drum).is_err());
        assert!(s.attack_on(Track::Attack).is_err());
    }

    #[test]
    fn marks_record_rows() {
        let mut s = song();
        s.wait_rows(32).unwrap();
        assert!(s.add_mark("chorus").unwrap().is_empty());
        assert_eq!(s.mark_rows("chorus"), Some(32));
        assert!(s.add_mark("chorus").is_err());
        assert_eq!(s.add_mark("café").unwrap().len(), 1);
    }

    #[test]
    fn byte_size_counts_events() {
        let mut s = song();
        s.wait_rows(16).unwrap();
        s.stop(&[Track::Pulse1, Track::Drum]);
        s.end(SongEnd::Fine).unwrap();
        let r = s.render(&Score::default(), &mut Diagnostics::new()).unwrap();
        // base 2 + tempo 2 + beat 1 + wait 2 + stops 8 + fine 1
        assert_eq!(r.byte_size, 16);
        assert_eq!(r.definition, "songdef PS_test, PSDAT_test");
    }

    #[test]
    fn unknown_pattern_is_reference_error() {
        let mut s = song();
        s.play("nothing".into(), None, None, 0, &SourceLoc::new("t", 5));
        let err = s.render(&Score::default(), &mut Diagnostics::new()).unwrap_err();
        assert_eq!(err.kind, crate::mml::error::ErrorKind::Reference);
        assert_eq!(err.location, Some(SourceLoc::new("t", 5)));
    }
}
