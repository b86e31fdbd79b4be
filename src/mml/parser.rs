//! Line dispatcher for Pently MML.
//!
//! Each line starts with a keyword that configures the open object, opens
//! a new one or adds a conductor command to the open song. Lines that do
//! not start with a keyword are pattern text when a pattern is open.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::drum::Drum;
use super::error::{CompileError, Diagnostics, Result};
use super::instrument::Instrument;
use super::keyword::Keyword;
use super::lexer::{Lexer, SourceLoc};
use super::pattern::{Pattern, Track};
use super::pitch::{OctaveMode, PitchContext};
use super::rhythm::{parse_measure_word, parse_time_signature, RhythmContext};
use super::scope::{qualify, ObjectRef, ResumePoint, Score, ScopeState, Transition};
use super::sfx::{ChannelType, SoundEffect};
use super::song::{Song, SongEnd};

/// Default limit on nested `include` statements.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 8;

pub struct Parser {
    score: Score,
    state: ScopeState,
    pitch: PitchContext,
    rhythm: RhythmContext,
    diagnostics: Diagnostics,
    /// Locations of the `include` lines being processed, outermost first.
    include_stack: Vec<SourceLoc>,
    /// Directories that relative includes resolve against.
    dirs: Vec<PathBuf>,
    max_include_depth: usize,
    loc: SourceLoc,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INCLUDE_DEPTH)
    }
}

fn int_arg(word: &str, what: &str) -> Result<i64> {
    word.parse()
        .map_err(|_| CompileError::grammar(format!("{what} must be a number, not {word}")))
}

fn track_arg(word: &str) -> Result<Track> {
    Track::from_name(word).ok_or_else(|| {
        CompileError::grammar(format!(
            "unknown track {word}; try pulse1, pulse2, triangle, drum or attack"
        ))
    })
}

fn check_arg_count(keyword: &str, args: &[String], min: usize, max: usize, usage: &str) -> Result<()> {
    if args.len() < min || args.len() > max {
        if usage.is_empty() {
            return Err(CompileError::grammar(format!("{keyword} takes no arguments")));
        }
        return Err(CompileError::grammar(format!("usage: {keyword} {usage}")));
    }
    Ok(())
}

impl Parser {
    pub fn new(max_include_depth: usize) -> Self {
        Self {
            score: Score::default(),
            state: ScopeState::TopLevel,
            pitch: PitchContext::new(),
            rhythm: RhythmContext::new(),
            diagnostics: Diagnostics::new(),
            include_stack: Vec::new(),
            dirs: Vec::new(),
            max_include_depth,
            loc: SourceLoc::new("<input>", 0),
        }
    }

    /// Parse MML text. `dir` is where relative includes are looked up.
    pub fn parse_source(&mut self, source: &str, file: &str, dir: Option<&Path>) -> Result<()> {
        let lines = Lexer::new(source, file).lines();
        debug!(file, lines = lines.len(), "parsing");
        if let Some(dir) = dir {
            self.dirs.push(dir.to_path_buf());
        }
        let result = lines.iter().try_for_each(|line| {
            self.loc = line.loc.clone();
            self.dispatch(&line.words)
                .map_err(|e| e.at(&line.loc, &self.include_stack))
        });
        if dir.is_some() {
            self.dirs.pop();
        }
        result
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<()> {
        let source = fs::read_to_string(path)
            .map_err(|e| CompileError::io(format!("cannot read {}: {e}", path.display())))?;
        self.parse_source(&source, &path.display().to_string(), path.parent())
    }

    /// Check that the input ended cleanly and hand over the results.
    pub fn finish(self) -> Result<(Score, Diagnostics)> {
        if let Some(song) = self.state.song().and_then(|i| self.score.songs.at(i)) {
            return Err(CompileError::structural(format!(
                "song {} was not ended with fine, dal segno or da capo",
                song.name
            ))
            .at(&song.loc, &[]));
        }
        Ok((self.score, self.diagnostics))
    }

    fn dispatch(&mut self, words: &[String]) -> Result<()> {
        let Some(first) = words.first() else {
            return Ok(());
        };
        if first.starts_with('@') && words.iter().any(|w| w.contains('=')) {
            return self.add_definition(words);
        }
        let Some(keyword) = Keyword::from_word(first) else {
            return self.forward_to_pattern(words);
        };
        let object = self.state.object();
        if keyword.closes_object() {
            self.state = self.state.apply(Transition::CloseObject)?;
        }
        self.handle(keyword, words, object)
    }

    fn handle(&mut self, keyword: Keyword, words: &[String], object: Option<ObjectRef>) -> Result<()> {
        let kw = words[0].as_str();
        let args = &words[1..];
        let loc = self.loc.clone();
        match keyword {
            Keyword::NoteNames => {
                check_arg_count(kw, args, 1, 1, "english|deutsch")?;
                self.pitch_ctx().set_language(&args[0])
            }
            Keyword::Durations => {
                check_arg_count(kw, args, 1, 1, "temporary|stick")?;
                self.rhythm_ctx().set_durations_stick(&args[0])
            }
            Keyword::MmlOctaves => {
                check_arg_count(kw, args, 1, 1, "normal|swapped")?;
                self.pitch_ctx().set_mml_octaves(&args[0])
            }
            Keyword::Sfx => self.open_sfx(args, &loc),
            Keyword::Instrument => {
                check_arg_count(kw, args, 1, 1, "NAME")?;
                let name = qualify(&args[0], self.song_name().as_deref());
                let idx = self
                    .score
                    .instruments
                    .insert(Instrument::new(name, loc), "instrument")?;
                self.open(ObjectRef::Instrument(idx))
            }
            Keyword::Rate => {
                check_arg_count(kw, args, 1, 1, "FRAMES")?;
                let rate = int_arg(&args[0], "rate")?;
                match object {
                    Some(ObjectRef::Sfx(i)) => self.sfx_mut(i)?.set_rate(rate, &loc),
                    _ => Err(self.wrong_scope(kw, "a sfx")),
                }
            }
            Keyword::Volume | Keyword::Timbre | Keyword::Pitch => match object {
                Some(ObjectRef::Sfx(i)) => {
                    let sfx = self.sfx_mut(i)?;
                    match keyword {
                        Keyword::Volume => sfx.set_volume(args, &loc),
                        Keyword::Timbre => sfx.set_timbre(args, &loc),
                        _ => sfx.set_pitch(args, &loc),
                    }
                }
                Some(ObjectRef::Instrument(i)) => {
                    let inst = self.instrument_mut(i)?;
                    match keyword {
                        Keyword::Volume => inst.set_volume(args, &loc),
                        Keyword::Timbre => inst.set_timbre(args, &loc),
                        _ => inst.set_pitch(args, &loc),
                    }
                }
                _ => Err(self.wrong_scope(kw, "an instrument or sfx")),
            },
            Keyword::Decay => {
                check_arg_count(kw, args, 1, 1, "RATE")?;
                let rate = int_arg(&args[0], "decay")?;
                match object {
                    Some(ObjectRef::Instrument(i)) => self.instrument_mut(i)?.set_decay(rate, &loc),
                    _ => Err(self.wrong_scope(kw, "an instrument")),
                }
            }
            Keyword::Detached => {
                check_arg_count(kw, args, 0, 0, "")?;
                match object {
                    Some(ObjectRef::Instrument(i)) => {
                        self.instrument_mut(i)?.set_detached();
                        Ok(())
                    }
                    _ => Err(self.wrong_scope(kw, "an instrument")),
                }
            }
            Keyword::Drum => {
                check_arg_count(kw, args, 2, 3, "NAME SFX [SFX]")?;
                let name = qualify(&args[0], self.song_name().as_deref());
                let drum = Drum::new(name, &args[0], &args[1..], loc)?;
                self.score.drums.insert(drum, "drum")?;
                Ok(())
            }
            Keyword::Song => self.open_song(args, loc),
            Keyword::End => {
                let end = SongEnd::from_words(words)?;
                self.song_mut(kw)?.end(end)?;
                self.state = self.state.apply(Transition::CloseSong)?;
                Ok(())
            }
            Keyword::Segno => {
                check_arg_count(kw, args, 0, 0, "")?;
                self.song_mut(kw)?.set_segno(&loc)
            }
            Keyword::Mark => {
                check_arg_count(kw, args, 1, 1, "NAME")?;
                let warnings = self.song_mut(kw)?.add_mark(&args[0])?;
                for w in warnings {
                    self.diagnostics.warn(Some(&loc), w);
                }
                Ok(())
            }
            Keyword::Time => {
                let usage = "N/D [scale D]";
                check_arg_count(kw, args, 1, 3, usage)?;
                let (num, den) = parse_time_signature(&args[0])?;
                let scale = match args {
                    [_] => None,
                    [_, s, d] if s == "scale" => Some(int_arg(d, "scale")?),
                    _ => return Err(CompileError::grammar(format!("usage: {kw} {usage}"))),
                };
                let rhythm = self.rhythm_ctx();
                rhythm.set_time_signature(num, den)?;
                if let Some(scale) = scale {
                    rhythm.set_scale(u32::try_from(scale).unwrap_or(0))?;
                }
                Ok(())
            }
            Keyword::Scale => {
                check_arg_count(kw, args, 1, 1, "ROWS_PER_WHOLE_NOTE")?;
                let scale = int_arg(&args[0], "scale")?;
                self.rhythm_ctx()
                    .set_scale(u32::try_from(scale).unwrap_or(0))
            }
            Keyword::Attack => {
                match args {
                    [on, track] if on == "on" => {
                        let track = track_arg(track)?;
                        self.song_mut(kw)?.attack_on(track)
                    }
                    _ => Err(CompileError::grammar("usage: attack on TRACK")),
                }
            }
            Keyword::Pattern => self.open_pattern(args, loc),
            Keyword::Fallthrough => {
                check_arg_count(kw, args, 0, 0, "")?;
                match object {
                    Some(ObjectRef::Pattern(i)) => {
                        self.pattern_mut(i)?.fallthrough = true;
                        Ok(())
                    }
                    _ => Err(CompileError::scope("fallthrough must be inside a pattern")),
                }
            }
            Keyword::At => {
                if args.is_empty() {
                    return Err(CompileError::grammar("usage: at MEASURE[:BEAT[:ROW]] [COMMAND]"));
                }
                let (measure, beat, row) = parse_measure_word(&args[0])?;
                self.song_mut(kw)?.wait_until(measure, beat, row)?;
                if args.len() > 1 {
                    self.dispatch(&args[1..])?;
                }
                Ok(())
            }
            Keyword::Pickup => {
                check_arg_count(kw, args, 1, 1, "MEASURE[:BEAT[:ROW]]")?;
                let (measure, beat, row) = parse_measure_word(&args[0])?;
                self.song_mut(kw)?.pickup(measure, beat, row)
            }
            Keyword::Resume => {
                check_arg_count(kw, args, 0, 1, "[MARK]")?;
                let song = self.song_mut(kw)?;
                let rows = match args.first() {
                    Some(mark) => song.mark_rows(mark).ok_or_else(|| {
                        CompileError::reference(format!("unknown mark {mark} in song {}", song.name))
                    })?,
                    None => song.rows(),
                };
                let point = ResumePoint {
                    song: song.name.clone(),
                    rows,
                };
                self.score
                    .resume
                    .set(point, &loc, "resume point", "this score")
            }
            Keyword::Mute | Keyword::Solo => {
                if args.is_empty() {
                    return Err(CompileError::grammar(format!("usage: {kw} TRACK...")));
                }
                let bits = args
                    .iter()
                    .map(|t| track_arg(t).map(Track::mute_bit))
                    .collect::<Result<Vec<u8>>>()?
                    .into_iter()
                    .fold(0, |acc, bit| acc | bit);
                let mask = if keyword == Keyword::Solo { !bits & 0x1F } else { bits };
                let song = self.song_mut(kw)?;
                let name = song.name.clone();
                song.mute.set(mask, &loc, "mute or solo", &name)
            }
            Keyword::Tempo => {
                check_arg_count(kw, args, 1, 1, "BEATS_PER_MINUTE")?;
                let tempo: f64 = args[0]
                    .parse()
                    .map_err(|_| CompileError::grammar(format!("tempo must be a number, not {}", args[0])))?;
                self.song_mut(kw)?.set_tempo(tempo)
            }
            Keyword::Play => self.play(args, &loc),
            Keyword::Stop => {
                if args.is_empty() {
                    return Err(CompileError::grammar("usage: stop TRACK..."));
                }
                let tracks = args
                    .iter()
                    .map(|t| track_arg(t))
                    .collect::<Result<Vec<_>>>()?;
                self.song_mut(kw)?.stop(&tracks);
                Ok(())
            }
            Keyword::Include => {
                if args.is_empty() {
                    return Err(CompileError::grammar("usage: include FILE"));
                }
                self.include(&args.join(" "))
            }
            Keyword::Title | Keyword::Author | Keyword::Copyright => self.set_metadata(keyword, args, &loc),
        }
    }

    fn open(&mut self, object: ObjectRef) -> Result<()> {
        self.state = self.state.apply(Transition::OpenObject(object))?;
        Ok(())
    }

    fn open_sfx(&mut self, args: &[String], loc: &SourceLoc) -> Result<()> {
        let [name, on, channel] = args else {
            return Err(CompileError::grammar("usage: sfx NAME on pulse|triangle|noise"));
        };
        if on != "on" {
            return Err(CompileError::grammar("usage: sfx NAME on pulse|triangle|noise"));
        }
        let channel = ChannelType::from_name(channel)?;
        let name = qualify(name, self.song_name().as_deref());
        let sfx = SoundEffect::new(name, loc.clone(), channel, self.parent_pitch());
        let idx = self.score.sfx.insert(sfx, "sfx")?;
        self.open(ObjectRef::Sfx(idx))
    }

    fn open_song(&mut self, args: &[String], loc: SourceLoc) -> Result<()> {
        check_arg_count("song", args, 1, 1, "NAME")?;
        if let Some(song) = self.state.song().and_then(|i| self.score.songs.at(i)) {
            return Err(CompileError::structural(format!(
                "song {} began on {} and was not ended with fine or dal segno",
                song.name,
                song.loc.cite(&loc)
            )));
        }
        let song = Song::new(args[0].clone(), loc, &self.pitch, &self.rhythm);
        let idx = self.score.songs.insert(song, "song")?;
        self.state = self.state.apply(Transition::OpenSong(idx))?;
        Ok(())
    }

    fn open_pattern(&mut self, args: &[String], loc: SourceLoc) -> Result<()> {
        let usage = || CompileError::grammar("usage: pattern NAME [on TRACK] [with INSTRUMENT]");
        let (name, rest) = args.split_first().ok_or_else(usage)?;
        if rest.len() % 2 != 0 {
            return Err(usage());
        }
        let mut track = None;
        let mut instrument = None;
        for pair in rest.chunks(2) {
            match pair[0].as_str() {
                "on" => track = Some(track_arg(&pair[1])?),
                "with" => instrument = Some(pair[1].clone()),
                _ => return Err(usage()),
            }
        }
        let name = qualify(name, self.song_name().as_deref());
        let (pitch, rhythm) = match self.state.song().and_then(|i| self.score.songs.at(i)) {
            Some(song) => (&song.pitch, &song.rhythm),
            None => (&self.pitch, &self.rhythm),
        };
        let pattern = Pattern::new(name, loc, track, instrument, pitch, rhythm);
        let idx = self.score.patterns.insert(pattern, "pattern")?;
        self.open(ObjectRef::Pattern(idx))
    }

    fn play(&mut self, args: &[String], loc: &SourceLoc) -> Result<()> {
        let usage = || {
            CompileError::grammar("usage: play NAME [on TRACK] [with INSTRUMENT] [up N] [down N]")
        };
        let (name, rest) = args.split_first().ok_or_else(usage)?;
        if rest.len() % 2 != 0 {
            return Err(usage());
        }
        let mut track = None;
        let mut instrument = None;
        let mut transpose: i64 = 0;
        for pair in rest.chunks(2) {
            match pair[0].as_str() {
                "on" => track = Some(track_arg(&pair[1])?),
                "with" => instrument = Some(pair[1].clone()),
                "up" => transpose += int_arg(&pair[1], "transpose")?,
                "down" => transpose -= int_arg(&pair[1], "transpose")?,
                _ => return Err(usage()),
            }
        }
        let transpose = i32::try_from(transpose)
            .map_err(|_| CompileError::range(format!("transpose {transpose} is out of range")))?;

        let song = self.song_mut("play")?;
        if let (Some(track), Some(inst), 0) = (track, &instrument, transpose) {
            let mut ctx = song.pitch.clone();
            ctx.octave_mode = if track == Track::Drum {
                OctaveMode::Noise
            } else {
                OctaveMode::Absolute
            };
            if let Ok(pitch) = ctx.parse_absolute_pitch(name) {
                if track == Track::Attack {
                    return Err(CompileError::grammar(
                        "cannot play a single note on the attack track",
                    ));
                }
                song.note_on(track, pitch, inst.clone(), loc);
                return Ok(());
            }
        }
        song.play(name.clone(), track, instrument, transpose, loc);
        Ok(())
    }

    fn include(&mut self, file: &str) -> Result<()> {
        if self.include_stack.len() >= self.max_include_depth {
            return Err(CompileError::structural(format!(
                "includes nested more than {} deep",
                self.max_include_depth
            )));
        }
        let path = match self.dirs.last() {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        };
        let source = fs::read_to_string(&path)
            .map_err(|e| CompileError::io(format!("cannot read {}: {e}", path.display())))?;
        let here = self.loc.clone();
        self.include_stack.push(here.clone());
        let result = self.parse_source(&source, &path.display().to_string(), path.parent());
        self.include_stack.pop();
        self.loc = here;
        result
    }

    fn set_metadata(&mut self, keyword: Keyword, args: &[String], loc: &SourceLoc) -> Result<()> {
        let kw = match keyword {
            Keyword::Title => "title",
            Keyword::Author => "author",
            _ => "copyright",
        };
        if args.is_empty() {
            return Err(CompileError::grammar(format!("usage: {kw} TEXT")));
        }
        let text = args.join(" ");
        if self.state.song().is_some() {
            let song = self.song_mut(kw)?;
            let name = song.name.clone();
            return match keyword {
                Keyword::Title => song.title.set(text, loc, kw, &name),
                Keyword::Author => song.author.set(text, loc, kw, &name),
                _ => Err(CompileError::scope(
                    "copyright applies to the whole album and must be outside a song",
                )),
            };
        }
        let meta = &mut self.score.metadata;
        let field = match keyword {
            Keyword::Title => &mut meta.title,
            Keyword::Author => &mut meta.author,
            _ => &mut meta.copyright,
        };
        field.set(text, loc, kw, "the album")
    }

    fn add_definition(&mut self, words: &[String]) -> Result<()> {
        let joined = words.join(" ");
        let (lhs, rhs) = joined
            .split_once('=')
            .ok_or_else(|| CompileError::grammar("usage: @ENNAME = CHORD"))?;
        let name = lhs.trim().trim_start_matches('@');
        let chord = name.strip_prefix("EN").ok_or_else(|| {
            CompileError::grammar(format!(
                "only chords can be defined with @; try @EN{name} = {}",
                rhs.trim()
            ))
        })?;
        self.pitch_ctx().add_chord_name(chord, rhs.trim())
    }

    fn forward_to_pattern(&mut self, words: &[String]) -> Result<()> {
        let Some(ObjectRef::Pattern(i)) = self.state.object() else {
            let place = self.state.describe();
            self.diagnostics.unknown_keyword(
                &self.loc,
                format!("unknown keyword {} inside {place}", words[0]),
            );
            return Ok(());
        };
        let mut warnings = Vec::new();
        let pattern = self.pattern_mut(i)?;
        for word in words {
            pattern.add_word(word, &mut warnings)?;
        }
        for w in warnings {
            self.diagnostics.warn(Some(&self.loc), w);
        }
        Ok(())
    }

    fn wrong_scope(&self, keyword: &str, allowed: &str) -> CompileError {
        CompileError::scope(format!(
            "{keyword} must be inside {allowed}, not {}",
            self.state.describe()
        ))
    }

    fn song_name(&self) -> Option<String> {
        self.state
            .song()
            .and_then(|i| self.score.songs.at(i))
            .map(|s| s.name.clone())
    }

    fn song_mut(&mut self, keyword: &str) -> Result<&mut Song> {
        let idx = self
            .state
            .song()
            .ok_or_else(|| CompileError::scope(format!("{keyword} must be inside a song")))?;
        self.score
            .songs
            .get_mut(idx)
            .ok_or_else(|| CompileError::structural("open song is missing"))
    }

    fn sfx_mut(&mut self, idx: usize) -> Result<&mut SoundEffect> {
        self.score
            .sfx
            .get_mut(idx)
            .ok_or_else(|| CompileError::structural("open sfx is missing"))
    }

    fn instrument_mut(&mut self, idx: usize) -> Result<&mut Instrument> {
        self.score
            .instruments
            .get_mut(idx)
            .ok_or_else(|| CompileError::structural("open instrument is missing"))
    }

    fn pattern_mut(&mut self, idx: usize) -> Result<&mut Pattern> {
        self.score
            .patterns
            .get_mut(idx)
            .ok_or_else(|| CompileError::structural("open pattern is missing"))
    }

    /// Pitch context of the open song, or the top level.
    fn parent_pitch(&self) -> &PitchContext {
        match self.state.song().and_then(|i| self.score.songs.at(i)) {
            Some(song) => &song.pitch,
            None => &self.pitch,
        }
    }

    /// Pitch context that settings apply to: the open pattern's, else the
    /// open song's, else the top level's.
    fn pitch_ctx(&mut self) -> &mut PitchContext {
        if let Some(ObjectRef::Pattern(i)) = self.state.object() {
            if let Some(pattern) = self.score.patterns.get_mut(i) {
                return pattern.pitch_mut();
            }
        }
        if let Some(i) = self.state.song() {
            if let Some(song) = self.score.songs.get_mut(i) {
                return &mut song.pitch;
            }
        }
        &mut self.pitch
    }

    fn rhythm_ctx(&mut self) -> &mut RhythmContext {
        if let Some(ObjectRef::Pattern(i)) = self.state.object() {
            if let Some(pattern) = self.score.patterns.get_mut(i) {
                return pattern.rhythm_mut();
            }
        }
        if let Some(i) = self.state.song() {
            if let Some(song) = self.score.songs.get_mut(i) {
                return &mut song.rhythm;
            }
        }
        &mut self.rhythm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mml::error::ErrorKind;

    fn parse(src: &str) -> Result<(Score, Diagnostics)> {
        let mut parser = Parser::default();
        parser.parse_source(src, "test.pently", None)?;
        parser.finish()
    }

    fn parse_err(src: &str) -> CompileError {
        match parse(src) {
            Ok(_) => panic!("expected an error for {src:?}"),
            Err(e) => e,
        }
    }

    #[test]
    fn instrument_properties() {
        let (score, diag) = parse("instrument lead\nvolume 15 10\ndecay 2\ndetached").unwrap();
        assert_eq!(score.instruments.len(), 1);
        assert!(diag.is_empty());
    }

    #[test]
    fn duplicate_instrument_cites_first_line() {
        let err = parse_err("instrument lead\ninstrument lead");
        assert_eq!(err.kind, ErrorKind::Redefinition);
        assert_eq!(err.location, Some(SourceLoc::new("test.pently", 2)));
        assert!(err.message.contains("line 1"));
    }

    #[test]
    fn volume_outside_object() {
        let err = parse_err("volume 1 2 3");
        assert_eq!(err.kind, ErrorKind::Scope);
        assert_eq!(err.message, "volume must be inside an instrument or sfx, not top level");
    }

    #[test]
    fn decay_only_in_instruments() {
        let err = parse_err("sfx x on pulse\ndecay 2");
        assert_eq!(err.kind, ErrorKind::Scope);
        assert!(err.message.ends_with("not sfx"));
    }

    #[test]
    fn song_local_names_are_qualified() {
        let (score, _) = parse(
            "song verse\ninstrument bass\npattern riff with bass\nc d e f\nfine",
        )
        .unwrap();
        assert!(score.instruments.contains("verse::bass"));
        assert!(score.patterns.contains("verse::riff"));
        assert!(score.songs.contains("verse"));
    }

    #[test]
    fn nested_song_is_structural_error() {
        let err = parse_err("song a\nsong b");
        assert_eq!(err.kind, ErrorKind::Structural);
        assert!(err.message.contains("began on line 1"));
    }

    #[test]
    fn unterminated_song_at_end() {
        let err = parse_err("song a\ntempo 120");
        assert_eq!(err.kind, ErrorKind::Structural);
        assert_eq!(err.location.map(|l| l.line), Some(1));
    }

    #[test]
    fn conductor_commands_need_song() {
        assert_eq!(parse_err("tempo 120").kind, ErrorKind::Scope);
        assert_eq!(parse_err("play x").kind, ErrorKind::Scope);
        assert_eq!(parse_err("fine").kind, ErrorKind::Scope);
    }

    #[test]
    fn unknown_keywords_warn_outside_patterns() {
        let (_, diag) = parse("frobnicate 3\ninstrument x\nwibble").unwrap();
        assert_eq!(diag.warnings().len(), 2);
        assert_eq!(diag.warnings()[0].location, Some(SourceLoc::new("test.pently", 1)));
    }

    #[test]
    fn pattern_text_is_forwarded() {
        let (score, _) = parse("pattern p\nc d\ne f").unwrap();
        let pattern = score.patterns.get("p").unwrap();
        assert_eq!(pattern.rows(), 16);
    }

    #[test]
    fn play_closes_open_pattern() {
        // `c` after play is outside any pattern and only warns.
        let (score, diag) = parse("song s\npattern p on pulse2\nc1\nplay p\nc\nfine").unwrap();
        assert_eq!(score.patterns.get("s::p").unwrap().rows(), 16);
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn fallthrough_requires_pattern() {
        let (score, _) = parse("pattern p\nc\nfallthrough").unwrap();
        assert!(score.patterns.get("p").unwrap().fallthrough);
        assert_eq!(parse_err("instrument i\nfallthrough").kind, ErrorKind::Scope);
    }

    #[test]
    fn conductor_note_on() {
        let (score, _) = parse("song s\nplay a' on pulse1 with lead\nplay 3 on noise with hat\nfine").unwrap();
        let song = score.songs.get("s").unwrap();
        let notes: Vec<_> = song
            .events()
            .iter()
            .filter_map(|e| match e {
                crate::mml::song::ConductorEvent::NoteOn { pitch, .. } => Some(*pitch),
                _ => None,
            })
            .collect();
        assert_eq!(notes, vec![36, 12]);
    }

    #[test]
    fn play_prepositions() {
        let (score, _) = parse("song s\nplay riff on pulse2 up 5 down 2\nfine").unwrap();
        let song = score.songs.get("s").unwrap();
        match &song.events()[0] {
            crate::mml::song::ConductorEvent::Play { transpose, track, .. } => {
                assert_eq!(*transpose, 3);
                assert_eq!(*track, Some(Track::Pulse2));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(parse_err("song s\nplay riff sideways 2").kind, ErrorKind::Grammar);
    }

    #[test]
    fn chord_definitions() {
        let (score, _) = parse("@ENsus4 = 57\npattern p\nc:sus4").unwrap();
        assert!(score.patterns.contains("p"));
        assert_eq!(parse_err("@FOO = 57").kind, ErrorKind::Grammar);
    }

    #[test]
    fn resume_is_write_once() {
        let (score, _) = parse("song a\nat 3\nmark chorus\nat 5\nresume chorus\nfine").unwrap();
        assert_eq!(
            score.resume.get(),
            Some(&ResumePoint {
                song: "a".into(),
                rows: 32
            })
        );
        let err = parse_err("song a\nresume\nfine\nsong b\nresume\nfine");
        assert_eq!(err.kind, ErrorKind::Redefinition);
    }

    #[test]
    fn mute_and_solo_masks() {
        let (score, _) = parse("song a\nsolo pulse1 drum\nfine\nsong b\nmute triangle\nfine").unwrap();
        assert_eq!(score.songs.get("a").unwrap().mute.copied(), Some(0x16));
        assert_eq!(score.songs.get("b").unwrap().mute.copied(), Some(0x04));
        assert_eq!(parse_err("song a\nmute pulse1\nsolo drum").kind, ErrorKind::Redefinition);
    }

    #[test]
    fn metadata_placement() {
        let (score, _) = parse("title My Album\ncopyright 2019 Someone\nsong a\ntitle First\nfine").unwrap();
        assert_eq!(score.metadata.title.get().map(String::as_str), Some("My Album"));
        assert_eq!(
            score.songs.get("a").unwrap().title.get().map(String::as_str),
            Some("First")
        );
        assert_eq!(parse_err("song a\ncopyright x").kind, ErrorKind::Scope);
    }

    #[test]
    fn at_runs_trailing_command() {
        let (score, _) = parse("song a\nat 2 play p on pulse1\nfine").unwrap();
        let song = score.songs.get("a").unwrap();
        assert_eq!(song.rows(), 16);
        assert!(matches!(
            song.events().last(),
            Some(crate::mml::song::ConductorEvent::Fine)
        ));
    }

    #[test]
    fn time_and_scale_apply_to_context() {
        let (score, _) = parse("time 3/4 scale 8\nsong a\nat 2\nfine").unwrap();
        assert_eq!(score.songs.get("a").unwrap().rows(), 6);
        assert_eq!(parse_err("scale 12").kind, ErrorKind::Range);
    }

    #[test]
    fn missing_include_is_io_error() {
        let err = parse_err("include does-not-exist.pently");
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.location.map(|l| l.line), Some(1));
    }
}
