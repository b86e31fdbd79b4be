//! Sound effects: frame-by-frame envelopes played on one channel.

use serde::Serialize;

use super::envelope::Envelope;
use super::error::{CompileError, Diagnostics, Result};
use super::field::SetOnce;
use super::lexer::SourceLoc;
use super::pitch::{OctaveMode, PitchContext};
use super::render::{asm_name, DataBlock, DataFormat, Entity, Renderable, Rendered};
use super::scope::Score;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelType {
    Pulse,
    Triangle,
    Noise,
}

impl ChannelType {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "pulse" => Ok(ChannelType::Pulse),
            "triangle" => Ok(ChannelType::Triangle),
            "noise" => Ok(ChannelType::Noise),
            _ => Err(CompileError::grammar(format!(
                "unknown channel {name}; try pulse, triangle or noise"
            ))),
        }
    }

    /// Channel number in the engine, with `pulse` meaning either pulse.
    pub fn number(self) -> u8 {
        match self {
            ChannelType::Pulse => 0,
            ChannelType::Triangle => 2,
            ChannelType::Noise => 3,
        }
    }

    fn max_timbre(self) -> u8 {
        match self {
            ChannelType::Noise => 1,
            _ => 3,
        }
    }

    /// Move a timbre value to its bit position in the step word.
    fn timbre_bits(self, timbre: u8) -> u16 {
        match self {
            ChannelType::Pulse => u16::from(timbre) << 14,
            ChannelType::Triangle => 0x8000,
            ChannelType::Noise if timbre != 0 => 0x80,
            ChannelType::Noise => 0,
        }
    }
}

/// A pitch given as a semitone number above the lowest period table entry.
fn note_number(n: i32) -> Result<i32> {
    if !(0..=i32::from(MAX_NOTE)).contains(&n) {
        return Err(CompileError::range(format!(
            "note number must be 0 to {MAX_NOTE}, not {n}"
        )));
    }
    Ok(n)
}

/// Highest note number a period table can cover.
const MAX_NOTE: u8 = 87;

#[derive(Debug, Clone, Serialize)]
pub struct SoundEffect {
    pub name: String,
    pub loc: SourceLoc,
    pub channel: ChannelType,
    pub envelope: Envelope,
    rate: SetOnce<u8>,
    #[serde(skip)]
    pitch: PitchContext,
}

impl SoundEffect {
    pub fn new(name: impl Into<String>, loc: SourceLoc, channel: ChannelType, parent: &PitchContext) -> Self {
        let mut pitch = parent.child();
        pitch.reset_octave(if channel == ChannelType::Noise {
            OctaveMode::Noise
        } else {
            OctaveMode::Absolute
        });
        Self {
            name: name.into(),
            loc,
            channel,
            envelope: Envelope::default(),
            rate: SetOnce::default(),
            pitch,
        }
    }

    pub fn set_volume(&mut self, words: &[String], loc: &SourceLoc) -> Result<()> {
        self.envelope.set_volume(words, loc, &self.name)
    }

    pub fn set_timbre(&mut self, words: &[String], loc: &SourceLoc) -> Result<()> {
        self.envelope
            .set_timbre(words, self.channel.max_timbre(), loc, &self.name)
    }

    /// Pitch steps are absolute pitches or note numbers, or noise periods
    /// 0-15.
    pub fn set_pitch(&mut self, words: &[String], loc: &SourceLoc) -> Result<()> {
        let pitch = &mut self.pitch;
        self.envelope.set_pitch(words, loc, &self.name, |w| {
            match w.parse::<i32>() {
                Ok(n) if pitch.octave_mode != OctaveMode::Noise => note_number(n),
                _ => pitch.parse_absolute_pitch(w),
            }
        })
    }

    /// Frames per envelope step.
    pub fn set_rate(&mut self, rate: i64, loc: &SourceLoc) -> Result<()> {
        let rate = u8::try_from(rate)
            .ok()
            .filter(|r| (1..=16).contains(r))
            .ok_or_else(|| {
                CompileError::range(format!("rate must be 1 to 16 frames per step, not {rate}"))
            })?;
        self.rate.set(rate, loc, "rate", &self.name)
    }

    /// Step words with trailing silence removed, keeping at least one.
    pub fn step_words(&self) -> Vec<u16> {
        let default_timbre = if self.channel == ChannelType::Noise { 0 } else { 2 };
        let mut steps = self.envelope.steps(default_timbre);
        while steps.len() > 1 && steps.last().is_some_and(|s| s.volume == 0) {
            steps.pop();
        }
        steps
            .iter()
            .map(|s| self.channel.timbre_bits(s.timbre) | (u16::from(s.volume) << 8) | (s.pitch & 0xFF) as u16)
            .collect()
    }
}

impl Entity for SoundEffect {
    fn name(&self) -> &str {
        &self.name
    }

    fn loc(&self) -> &SourceLoc {
        &self.loc
    }
}

impl Renderable for SoundEffect {
    fn render(&self, _score: &Score, _diag: &mut Diagnostics) -> Result<Rendered> {
        let name = asm_name(&self.name);
        let words = self.step_words();
        let definition = format!(
            "sfxdef PE_{name}, PEDAT_{name}, {}, {}, {}",
            words.len(),
            self.rate.copied().unwrap_or(1),
            self.channel.number()
        );
        Ok(Rendered {
            label: format!("PE_{name}"),
            definition,
            data: Some(DataBlock {
                label: format!("PEDAT_{name}"),
                format: DataFormat::Word,
                atoms: words.iter().map(|w| format!("${w:04X}")).collect(),
                packable: Some(words.iter().flat_map(|w| w.to_be_bytes()).collect()),
            }),
            byte_size: words.len() * 2 + 4,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn sfx(channel: ChannelType) -> SoundEffect {
        SoundEffect::new("boop", SourceLoc::new("t", 1), channel, &PitchContext::new())
    }

    #[test]
    fn pulse_boop_trims_trailing_silence() {
        let loc = SourceLoc::new("t", 2);
        let mut s = sfx(ChannelType::Pulse);
        s.set_volume(&words("8 4 2 0"), &loc).unwrap();
        s.set_pitch(&words("c"), &loc).unwrap();
        let r = s.render(&Score::default(), &mut Diagnostics::new()).unwrap();
        assert_eq!(r.definition, "sfxdef PE_boop, PEDAT_boop, 3, 1, 0");
        let data = r.data.unwrap();
        assert_eq!(data.atoms, vec!["$880F", "$840F", "$820F"]);
        assert_eq!(r.byte_size, 10);
    }

    #[test]
    fn silent_effect_keeps_one_step() {
        let loc = SourceLoc::new("t", 2);
        let mut s = sfx(ChannelType::Triangle);
        s.set_volume(&words("0 0"), &loc).unwrap();
        assert_eq!(s.step_words(), vec![0x8000]);
    }

    #[test]
    fn noise_pitch_and_timbre() {
        let loc = SourceLoc::new("t", 2);
        let mut s = sfx(ChannelType::Noise);
        s.set_volume(&words("4 4"), &loc).unwrap();
        s.set_timbre(&words("1 0"), &loc).unwrap();
        s.set_pitch(&words("12 3"), &loc).unwrap();
        assert_eq!(s.step_words(), vec![0x0483, 0x040C]);
        assert!(s.set_rate(0, &loc).is_err());
        s.set_rate(16, &loc).unwrap();
        let r = s.render(&Score::default(), &mut Diagnostics::new()).unwrap();
        assert_eq!(r.definition, "sfxdef PE_boop, PEDAT_boop, 2, 16, 3");
    }

    #[test]
    fn noise_timbre_limit() {
        let loc = SourceLoc::new("t", 2);
        let mut s = sfx(ChannelType::Noise);
        assert!(s.set_timbre(&words("2"), &loc).is_err());
    }

    #[test]
    fn packable_bytes_are_big_endian() {
        let loc = SourceLoc::new("t", 2);
        let mut s = sfx(ChannelType::Pulse);
        s.set_volume(&words("1"), &loc).unwrap();
        s.set_timbre(&words("1"), &loc).unwrap();
        let r = s.render(&Score::default(), &mut Diagnostics::new()).unwrap();
        assert_eq!(r.data.unwrap().packable.unwrap(), vec![0x41, 0x00]);
    }

    #[test]
    fn numeric_pitch_steps() {
        let loc = SourceLoc::new("t", 2);
        let mut s = sfx(ChannelType::Pulse);
        s.set_volume(&words("15 10 5 0"), &loc).unwrap();
        s.set_pitch(&words("0 0 0 0"), &loc).unwrap();
        s.set_rate(4, &loc).unwrap();
        let r = s.render(&Score::default(), &mut Diagnostics::new()).unwrap();
        assert_eq!(r.definition, "sfxdef PE_boop, PEDAT_boop, 3, 4, 0");
        let mut s = sfx(ChannelType::Pulse);
        assert!(s.set_pitch(&words("88"), &loc).is_err());
    }

    #[test]
    fn unknown_channel() {
        assert!(ChannelType::from_name("pulse1").is_err());
        assert_eq!(ChannelType::from_name("noise").unwrap().number(), 3);
    }
}
