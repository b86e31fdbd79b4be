//! Instruments: an attack envelope followed by a sustained timbre and
//! volume that decays.

use serde::Serialize;

use super::envelope::{parse_relative_pitch, Envelope};
use super::error::{CompileError, Diagnostics, Result};
use super::field::SetOnce;
use super::lexer::SourceLoc;
use super::render::{asm_name, DataBlock, DataFormat, Entity, Renderable, Rendered};
use super::scope::Score;

/// Highest pulse duty setting.
pub const MAX_TIMBRE: u8 = 3;

/// Set in an attack byte when the step has no pitch offset byte.
const NO_PITCH_FLAG: u8 = 0x10;

#[derive(Debug, Clone, Serialize)]
pub struct Instrument {
    pub name: String,
    pub loc: SourceLoc,
    pub envelope: Envelope,
    decay: SetOnce<u8>,
    detached: bool,
}

impl Instrument {
    pub fn new(name: impl Into<String>, loc: SourceLoc) -> Self {
        Self {
            name: name.into(),
            loc,
            envelope: Envelope::default(),
            decay: SetOnce::default(),
            detached: false,
        }
    }

    pub fn set_volume(&mut self, words: &[String], loc: &SourceLoc) -> Result<()> {
        self.envelope.set_volume(words, loc, &self.name)
    }

    pub fn set_timbre(&mut self, words: &[String], loc: &SourceLoc) -> Result<()> {
        self.envelope.set_timbre(words, MAX_TIMBRE, loc, &self.name)
    }

    /// Pitch steps are semitone offsets from the played note.
    pub fn set_pitch(&mut self, words: &[String], loc: &SourceLoc) -> Result<()> {
        self.envelope
            .set_pitch(words, loc, &self.name, parse_relative_pitch)
    }

    /// Set the sustain decay in units of 1/16 volume per frame.
    pub fn set_decay(&mut self, rate: i64, loc: &SourceLoc) -> Result<()> {
        let rate = u8::try_from(rate)
            .ok()
            .filter(|r| *r <= 127)
            .ok_or_else(|| CompileError::range(format!("decay must be 0 to 127, not {rate}")))?;
        self.decay.set(rate, loc, "decay", &self.name)
    }

    /// Cut the note a row early instead of letting it ring into the next.
    pub fn set_detached(&mut self) {
        self.detached = true;
    }

    /// Encode attack frames: `timbre << 6 | volume`, flagged when the pitch
    /// offset is zero, otherwise followed by the offset byte.
    fn attack_bytes(&self) -> (Vec<u8>, usize, u8, u8) {
        let steps = self.envelope.steps(2);
        let sustain = steps.last().copied();
        let attack = &steps[..steps.len().saturating_sub(1)];
        let mut bytes = Vec::with_capacity(attack.len() * 2);
        for step in attack {
            let head = (step.timbre << 6) | step.volume;
            if step.pitch == 0 {
                bytes.push(head | NO_PITCH_FLAG);
            } else {
                bytes.push(head);
                bytes.push((step.pitch & 0xFF) as u8);
            }
        }
        let (timbre, volume) = sustain.map_or((2, 8), |s| (s.timbre, s.volume));
        (bytes, attack.len(), timbre, volume)
    }
}

impl Entity for Instrument {
    fn name(&self) -> &str {
        &self.name
    }

    fn loc(&self) -> &SourceLoc {
        &self.loc
    }
}

impl Renderable for Instrument {
    fn render(&self, _score: &Score, _diag: &mut Diagnostics) -> Result<Rendered> {
        let name = asm_name(&self.name);
        let (bytes, frames, timbre, volume) = self.attack_bytes();
        let data_label = format!("PIDAT_{name}");
        let data_ref = if frames > 0 { data_label.as_str() } else { "0" };
        let definition = format!(
            "instdef PI_{name}, {timbre}, {volume}, {}, {}, {data_ref}, {frames}",
            self.decay.copied().unwrap_or(0),
            u8::from(self.detached),
        );
        let data = (frames > 0).then(|| DataBlock {
            label: data_label.clone(),
            format: DataFormat::Byte,
            atoms: bytes.iter().map(|b| format!("${b:02X}")).collect(),
            packable: Some(bytes.clone()),
        });
        Ok(Rendered {
            label: format!("PI_{name}"),
            definition,
            data,
            byte_size: bytes.len() + 5,
        })
    }
}
