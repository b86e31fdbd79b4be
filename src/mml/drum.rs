//! Drums: one or two sound effects started together.

use serde::Serialize;

use super::error::{CompileError, Diagnostics, Result};
use super::lexer::SourceLoc;
use super::note::is_drum_name;
use super::render::{asm_name, Entity, Renderable, Rendered};
use super::scope::Score;

#[derive(Debug, Clone, Serialize)]
pub struct Drum {
    pub name: String,
    pub loc: SourceLoc,
    pub sfx: Vec<String>,
}

impl Drum {
    /// `local_name` is the name as written, before song qualification.
    pub fn new(name: String, local_name: &str, sfx: &[String], loc: SourceLoc) -> Result<Self> {
        if !is_drum_name(local_name) {
            return Err(CompileError::grammar(format!(
                "drum name {local_name} must begin and end with a letter or '_'"
            )));
        }
        if sfx.is_empty() || sfx.len() > 2 {
            return Err(CompileError::grammar(format!(
                "drum {local_name} needs one or two sound effects, not {}",
                sfx.len()
            )));
        }
        Ok(Self {
            name,
            loc,
            sfx: sfx.to_vec(),
        })
    }
}

impl Entity for Drum {
    fn name(&self) -> &str {
        &self.name
    }

    fn loc(&self) -> &SourceLoc {
        &self.loc
    }
}

impl Renderable for Drum {
    fn render(&self, score: &Score, _diag: &mut Diagnostics) -> Result<Rendered> {
        let labels = self
            .sfx
            .iter()
            .map(|name| {
                score
                    .sfx
                    .resolve(name, &self.name)
                    .map(|s| format!("PE_{}", asm_name(&s.name)))
                    .ok_or_else(|| {
                        CompileError::reference(format!(
                            "drum {} uses unknown sound effect {name}",
                            self.name
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let name = asm_name(&self.name);
        Ok(Rendered {
            label: format!("DR_{name}"),
            definition: format!("drumdef DR_{name}, {}", labels.join(", ")),
            data: None,
            byte_size: 2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mml::pitch::PitchContext;
    use crate::mml::sfx::{ChannelType, SoundEffect};

    fn names(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn score_with_sfx(names: &[&str]) -> Score {
        let mut score = Score::default();
        for name in names {
            let s = SoundEffect::new(*name, SourceLoc::new("t", 1), ChannelType::Noise, &PitchContext::new());
            score.sfx.insert(s, "sfx").unwrap();
        }
        score
    }

    #[test]
    fn two_effect_drum() {
        let score = score_with_sfx(&["kick_tri", "kick_noise"]);
        let drum = Drum::new("kick".into(), "kick", &names("kick_tri kick_noise"), SourceLoc::new("t", 3)).unwrap();
        let r = drum.render(&score, &mut Diagnostics::new()).unwrap();
        assert_eq!(r.definition, "drumdef DR_kick, PE_kick_tri, PE_kick_noise");
        assert_eq!(r.byte_size, 2);
    }

    #[test]
    fn song_drum_finds_song_sfx() {
        let score = score_with_sfx(&["verse::hat"]);
        let drum = Drum::new("verse::hh".into(), "hh", &names("hat"), SourceLoc::new("t", 3)).unwrap();
        let r = drum.render(&score, &mut Diagnostics::new()).unwrap();
        assert_eq!(r.definition, "drumdef DR_verse_hh, PE_verse_hat");
    }

    #[test]
    fn missing_effect_is_reference_error() {
        let drum = Drum::new("kick".into(), "kick", &names("nothing"), SourceLoc::new("t", 3)).unwrap();
        let err = drum.render(&Score::default(), &mut Diagnostics::new()).unwrap_err();
        assert_eq!(err.kind, crate::mml::error::ErrorKind::Reference);
    }

    #[test]
    fn drum_name_and_count_rules() {
        let loc = SourceLoc::new("t", 1);
        assert!(Drum::new("k1".into(), "k1", &names("a"), loc.clone()).is_err());
        assert!(Drum::new("kk".into(), "kk", &[], loc.clone()).is_err());
        assert!(Drum::new("kk".into(), "kk", &names("a b c"), loc).is_err());
    }
}
