//! Volume, timbre and pitch envelopes shared by instruments and sound
//! effects.
//!
//! Timbre and pitch lists may contain a `|`. Steps after it repeat until
//! the volume envelope ends; without one, the last step repeats.

use serde::Serialize;

use super::error::{CompileError, Result};
use super::field::SetOnce;
use super::lexer::SourceLoc;

/// Envelope values plus the length of the repeating tail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopedSteps<T> {
    pub steps: Vec<T>,
    pub loop_len: usize,
}

impl<T: Copy> LoopedSteps<T> {
    /// Repeat the loop until `length` steps are produced.
    pub fn expand(&self, length: usize) -> Vec<T> {
        let mut out = Vec::with_capacity(length);
        let mut i = 0;
        while out.len() < length {
            if i >= self.steps.len() {
                i -= self.loop_len;
            }
            out.push(self.steps[i]);
            i += 1;
        }
        out
    }
}

/// Split words at the first `|` into one list and the loop length.
pub fn split_loop(words: &[String]) -> Result<(Vec<String>, usize)> {
    let joined = words.join(" ");
    let Some((intro, looped)) = joined.split_once('|') else {
        return Ok((words.to_vec(), 1));
    };
    let looped: Vec<String> = looped.split_whitespace().map(str::to_string).collect();
    if looped.is_empty() {
        return Err(CompileError::grammar("nothing to loop after |"));
    }
    let loop_len = looped.len();
    let mut all: Vec<String> = intro.split_whitespace().map(str::to_string).collect();
    all.extend(looped);
    Ok((all, loop_len))
}

/// One frame of an expanded envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeStep {
    pub timbre: u8,
    pub volume: u8,
    pub pitch: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Envelope {
    volume: SetOnce<Vec<u8>>,
    timbre: SetOnce<LoopedSteps<u8>>,
    pitch: SetOnce<LoopedSteps<i32>>,
}

fn require_values(what: &str, words: &[String]) -> Result<()> {
    if words.is_empty() {
        return Err(CompileError::grammar(format!("{what} requires at least one value")));
    }
    Ok(())
}

fn parse_int(word: &str, what: &str) -> Result<i32> {
    word.parse()
        .map_err(|_| CompileError::grammar(format!("{what} value {word} is not a number")))
}

impl Envelope {
    /// Volume has no loop; a `|` is accepted and ignored.
    pub fn set_volume(&mut self, words: &[String], loc: &SourceLoc, owner: &str) -> Result<()> {
        let (words, _) = split_loop(words)?;
        require_values("volume", &words)?;
        let volumes = words
            .iter()
            .map(|w| {
                let v = parse_int(w, "volume")?;
                u8::try_from(v)
                    .ok()
                    .filter(|v| *v <= 15)
                    .ok_or_else(|| CompileError::range(format!("volume must be 0 to 15, not {v}")))
            })
            .collect::<Result<Vec<u8>>>()?;
        self.volume.set(volumes, loc, "volume", owner)
    }

    pub fn set_timbre(
        &mut self,
        words: &[String],
        max: u8,
        loc: &SourceLoc,
        owner: &str,
    ) -> Result<()> {
        let (words, loop_len) = split_loop(words)?;
        require_values("timbre", &words)?;
        let steps = words
            .iter()
            .map(|w| {
                let v = parse_int(w, "timbre")?;
                u8::try_from(v)
                    .ok()
                    .filter(|v| *v <= max)
                    .ok_or_else(|| {
                        CompileError::range(format!("timbre must be 0 to {max}, not {v}"))
                    })
            })
            .collect::<Result<Vec<u8>>>()?;
        self.timbre
            .set(LoopedSteps { steps, loop_len }, loc, "timbre", owner)
    }

    /// Set the pitch envelope, converting each word with `parse`.
    pub fn set_pitch(
        &mut self,
        words: &[String],
        loc: &SourceLoc,
        owner: &str,
        mut parse: impl FnMut(&str) -> Result<i32>,
    ) -> Result<()> {
        let (words, loop_len) = split_loop(words)?;
        require_values("pitch", &words)?;
        let steps = words
            .iter()
            .map(|w| parse(w))
            .collect::<Result<Vec<i32>>>()?;
        self.pitch
            .set(LoopedSteps { steps, loop_len }, loc, "pitch", owner)
    }

    /// Expand all three envelopes to the volume envelope's length.
    pub fn steps(&self, default_timbre: u8) -> Vec<EnvelopeStep> {
        let volumes = self.volume.get().cloned().unwrap_or_else(|| vec![8]);
        let length = volumes.len();
        let timbres = match self.timbre.get() {
            Some(t) => t.expand(length),
            None => vec![default_timbre; length],
        };
        let pitches = match self.pitch.get() {
            Some(p) => p.expand(length),
            None => vec![0; length],
        };
        volumes
            .into_iter()
            .zip(timbres)
            .zip(pitches)
            .map(|((volume, timbre), pitch)| EnvelopeStep {
                timbre,
                volume,
                pitch,
            })
            .collect()
    }
}

/// Parse an instrument pitch envelope step: semitones -60 to 60.
pub fn parse_relative_pitch(word: &str) -> Result<i32> {
    let v = parse_int(word, "pitch")?;
    if !(-60..=60).contains(&v) {
        return Err(CompileError::range(format!(
            "pitch must be -60 to 60 semitones, not {v}"
        )));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn loc() -> SourceLoc {
        SourceLoc::new("t", 1)
    }

    #[test]
    fn split_without_pipe() {
        let (w, len) = split_loop(&words("1 2 3")).unwrap();
        assert_eq!(w, words("1 2 3"));
        assert_eq!(len, 1);
    }

    #[test]
    fn split_with_pipe() {
        let (w, len) = split_loop(&words("1 2 | 3 4")).unwrap();
        assert_eq!(w, words("1 2 3 4"));
        assert_eq!(len, 2);
        let (w, len) = split_loop(&words("1 2|3")).unwrap();
        assert_eq!(w, words("1 2 3"));
        assert_eq!(len, 1);
        assert!(split_loop(&words("1 2 |")).is_err());
    }

    #[test]
    fn expand_loops_tail() {
        let s = LoopedSteps {
            steps: vec![1, 2, 3, 4],
            loop_len: 2,
        };
        assert_eq!(s.expand(8), vec![1, 2, 3, 4, 3, 4, 3, 4]);
        assert_eq!(s.expand(2), vec![1, 2]);
    }

    #[test]
    fn defaults_fill_missing_envelopes() {
        let mut env = Envelope::default();
        env.set_volume(&words("15 10 5"), &loc(), "x").unwrap();
        let steps = env.steps(2);
        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.timbre == 2 && s.pitch == 0));
        assert_eq!(Envelope::default().steps(0)[0].volume, 8);
    }

    #[test]
    fn timbre_and_pitch_follow_volume_length() {
        let mut env = Envelope::default();
        env.set_volume(&words("8 8 8 8 8"), &loc(), "x").unwrap();
        env.set_timbre(&words("0 | 1 2"), 3, &loc(), "x").unwrap();
        env.set_pitch(&words("12 0"), &loc(), "x", parse_relative_pitch)
            .unwrap();
        let steps = env.steps(2);
        let timbres: Vec<u8> = steps.iter().map(|s| s.timbre).collect();
        let pitches: Vec<i32> = steps.iter().map(|s| s.pitch).collect();
        assert_eq!(timbres, vec![0, 1, 2, 1, 2]);
        assert_eq!(pitches, vec![12, 0, 0, 0, 0]);
    }

    #[test]
    fn value_ranges() {
        let mut env = Envelope::default();
        assert!(env.set_volume(&words("16"), &loc(), "x").is_err());
        assert!(env.set_volume(&words("-1"), &loc(), "x").is_err());
        assert!(env.set_volume(&[], &loc(), "x").is_err());
        assert!(env.set_timbre(&words("2"), 1, &loc(), "x").is_err());
        assert!(parse_relative_pitch("61").is_err());
        assert!(parse_relative_pitch("-60").is_ok());
    }

    #[test]
    fn volume_accepts_loop_marker() {
        let mut env = Envelope::default();
        env.set_volume(&words("15 | 10"), &loc(), "x").unwrap();
        let volumes: Vec<u8> = env.steps(2).iter().map(|s| s.volume).collect();
        assert_eq!(volumes, vec![15, 10]);
        let mut env = Envelope::default();
        env.set_volume(&words("8 6|4"), &loc(), "x").unwrap();
        assert_eq!(env.steps(2).len(), 3);
    }

    #[test]
    fn volume_is_write_once() {
        let mut env = Envelope::default();
        env.set_volume(&words("1"), &loc(), "lead").unwrap();
        let err = env
            .set_volume(&words("2"), &SourceLoc::new("t", 4), "lead")
            .unwrap_err();
        assert_eq!(err.message, "volume for lead was already set on line 1");
    }
}
