//! Rhythm context: time signature, row scale, note durations and the
//! measure/row position of a song.

use super::error::{CompileError, Result};
use super::note::Augment;

/// A written duration: denominator plus augment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    pub denom: u32,
    pub augment: Augment,
}

/// Engine duration codes, each a fixed number of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationCode {
    Whole,
    DottedHalf,
    Half,
    DottedQuarter,
    Quarter,
    DottedEighth,
    Eighth,
    Row,
}

impl DurationCode {
    /// Largest first, for greedy decomposition.
    pub const ALL: [DurationCode; 8] = [
        DurationCode::Whole,
        DurationCode::DottedHalf,
        DurationCode::Half,
        DurationCode::DottedQuarter,
        DurationCode::Quarter,
        DurationCode::DottedEighth,
        DurationCode::Eighth,
        DurationCode::Row,
    ];

    pub fn rows(self) -> u32 {
        match self {
            DurationCode::Whole => 16,
            DurationCode::DottedHalf => 12,
            DurationCode::Half => 8,
            DurationCode::DottedQuarter => 6,
            DurationCode::Quarter => 4,
            DurationCode::DottedEighth => 3,
            DurationCode::Eighth => 2,
            DurationCode::Row => 1,
        }
    }

    pub fn for_rows(rows: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.rows() == rows)
    }

    /// Suffix appended to a note code: `|D_4`, or nothing for one row.
    pub fn note_suffix(self) -> &'static str {
        match self {
            DurationCode::Whole => "|D_1",
            DurationCode::DottedHalf => "|D_D2",
            DurationCode::Half => "|D_2",
            DurationCode::DottedQuarter => "|D_D4",
            DurationCode::Quarter => "|D_4",
            DurationCode::DottedEighth => "|D_D8",
            DurationCode::Eighth => "|D_8",
            DurationCode::Row => "",
        }
    }

    /// Operand of `setBeatDuration`.
    pub fn beat_name(self) -> &'static str {
        match self {
            DurationCode::Row => "0",
            other => &other.note_suffix()[1..],
        }
    }
}

/// Split a row count into engine duration codes, largest first.
pub fn decompose_rows(mut rows: u32) -> Vec<DurationCode> {
    let mut codes = Vec::new();
    while rows > 0 {
        let code = DurationCode::ALL
            .into_iter()
            .find(|c| c.rows() <= rows)
            .unwrap_or(DurationCode::Row);
        codes.push(code);
        rows -= code.rows();
    }
    codes
}

/// Position within a song, in measures and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurePos {
    pub measure: i32,
    pub row: u32,
}

fn is_power_of_two_in(value: u32, lo: u32, hi: u32) -> bool {
    (lo..=hi).contains(&value) && value.is_power_of_two()
}

#[derive(Debug, Clone)]
pub struct RhythmContext {
    pub durations_stick: bool,
    scale: u32,
    time_num: u32,
    time_den: u32,
    last_duration: Option<Duration>,
    pub position: MeasurePos,
}

impl Default for RhythmContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RhythmContext {
    pub fn new() -> Self {
        Self {
            durations_stick: false,
            scale: 16,
            time_num: 4,
            time_den: 4,
            last_duration: None,
            position: MeasurePos { measure: 1, row: 0 },
        }
    }

    /// Forget the default duration at the start of a pattern.
    pub fn reset_duration(&mut self) {
        self.last_duration = None;
    }

    pub fn set_durations_stick(&mut self, word: &str) -> Result<()> {
        self.durations_stick = match word {
            "temporary" => false,
            "stick" => true,
            _ => {
                return Err(CompileError::grammar(format!(
                    "durations must be temporary or stick, not {word}"
                )))
            }
        };
        Ok(())
    }

    /// Set the time signature. `num` beats per measure of `den`th notes.
    pub fn set_time_signature(&mut self, num: u32, den: u32) -> Result<()> {
        if num < 2 {
            return Err(CompileError::range(format!(
                "beats per measure must be at least 2, not {num}"
            )));
        }
        if !is_power_of_two_in(den, 2, 64) {
            return Err(CompileError::range(format!(
                "beat duration must be a power of 2 from 2 to 64, not {den}"
            )));
        }
        self.time_num = num;
        self.time_den = den;
        Ok(())
    }

    /// Set how many rows make up a whole note.
    pub fn set_scale(&mut self, scale: u32) -> Result<()> {
        if !is_power_of_two_in(scale, 2, 64) {
            return Err(CompileError::range(format!(
                "scale must be a power of 2 from 2 to 64, not {scale}"
            )));
        }
        self.scale = scale;
        Ok(())
    }

    fn check_scale_fits(&self) -> Result<()> {
        if self.scale % self.time_den != 0 {
            return Err(CompileError::range(format!(
                "scale of 1/{} is too coarse for 1/{} beats",
                self.scale, self.time_den
            )));
        }
        Ok(())
    }

    pub fn measure_length(&self) -> Result<u32> {
        self.check_scale_fits()?;
        Ok(self.scale / self.time_den * self.time_num)
    }

    /// Rows per beat. Compound meters (6/8, 9/8, ...) count dotted beats.
    pub fn beat_length(&self) -> Result<u32> {
        self.check_scale_fits()?;
        let base = self.scale / self.time_den;
        if self.time_num >= 6 && self.time_num % 3 == 0 {
            Ok(base * 3)
        } else {
            Ok(base)
        }
    }

    /// Validate a written duration number and augment.
    pub fn parse_duration(number: Option<u32>, augment: Augment) -> Result<Option<Duration>> {
        let Some(denom) = number else {
            if augment != Augment::Plain {
                return Err(CompileError::grammar(format!(
                    "augment {} requires a duration number",
                    augment.suffix()
                )));
            }
            return Ok(None);
        };
        if !(1..=64).contains(&denom) {
            return Err(CompileError::range(format!(
                "duration must be 1 to 64, not {denom}"
            )));
        }
        if augment != Augment::Grace && !denom.is_power_of_two() {
            return Err(CompileError::range(format!(
                "duration must be a power of 2, not {denom}"
            )));
        }
        Ok(Some(Duration { denom, augment }))
    }

    /// Set the default duration from an `l` word.
    pub fn set_length(&mut self, duration: Option<Duration>) -> Result<()> {
        match duration {
            Some(d) if d.augment != Augment::Grace => {
                self.last_duration = Some(d);
                Ok(())
            }
            Some(_) => Err(CompileError::grammar("l cannot set a grace note length")),
            None => Err(CompileError::grammar("l requires a duration")),
        }
    }

    /// Rows taken by a note of the given duration. Grace notes return the
    /// negated frame count.
    pub fn note_rows(&mut self, duration: Option<Duration>) -> Result<i32> {
        let d = match duration {
            Some(d) if d.augment == Augment::Grace => return Ok(-(d.denom as i32)),
            Some(d) => {
                if self.durations_stick {
                    self.last_duration = Some(d);
                }
                d
            }
            None => match self.last_duration {
                Some(d) => d,
                None => {
                    let d = self.default_duration()?;
                    self.last_duration = Some(d);
                    d
                }
            },
        };
        let num = self.scale * d.augment.quarters();
        let den = d.denom * 4;
        if num % den != 0 {
            return Err(CompileError::range(format!(
                "{}1/{} note not multiple of 1/{} note scale ({:.3} rows)",
                match d.augment {
                    Augment::Dotted => "dotted ",
                    Augment::DoubleDotted => "double dotted ",
                    _ => "",
                },
                d.denom,
                self.scale,
                f64::from(num) / f64::from(den)
            )));
        }
        Ok((num / den) as i32)
    }

    /// One beat, as a duration.
    fn default_duration(&self) -> Result<Duration> {
        let beat = self.beat_length()?;
        if beat % 3 == 0 {
            Ok(Duration {
                denom: self.scale * 3 / (beat * 2),
                augment: Augment::Dotted,
            })
        } else {
            Ok(Duration {
                denom: self.scale / beat,
                augment: Augment::Plain,
            })
        }
    }

    /// Convert `measure:beat:row` to a measure and row within it.
    pub fn parse_measure(&self, measure: i32, beat: u32, row: u32) -> Result<MeasurePos> {
        if beat < 1 {
            return Err(CompileError::range("beat must be at least 1"));
        }
        let actual_row = self
            .beat_length()?
            .checked_mul(beat - 1)
            .and_then(|r| r.checked_add(row))
            .ok_or_else(|| CompileError::range(format!("beat {beat} row {row} is too far into the measure")))?;
        let length = self.measure_length()?;
        if actual_row >= length {
            return Err(CompileError::range(format!(
                "row {actual_row} exceeds measure length {length}"
            )));
        }
        Ok(MeasurePos {
            measure,
            row: actual_row,
        })
    }

    /// Rows from the current position to `target`, moving there.
    pub fn wait_for_measure(&mut self, target: MeasurePos) -> Result<u32> {
        let length = i64::from(self.measure_length()?);
        let rows = (i64::from(target.measure) - i64::from(self.position.measure)) * length
            + i64::from(target.row)
            - i64::from(self.position.row);
        if rows < 0 {
            return Err(CompileError::structural(format!(
                "cannot go back from measure {}:{} to {}:{}",
                self.position.measure, self.position.row, target.measure, target.row
            )));
        }
        let rows = u32::try_from(rows).map_err(|_| {
            CompileError::range(format!("waiting {rows} rows to measure {} is too long", target.measure))
        })?;
        self.position = target;
        Ok(rows)
    }

    pub fn set_measure(&mut self, pos: MeasurePos) {
        self.position = pos;
    }
}

/// Parse `M`, `M:B` or `M:B:R`.
pub fn parse_measure_word(word: &str) -> Result<(i32, u32, u32)> {
    let bad = || CompileError::grammar(format!("{word} is not a measure:beat:row position"));
    let mut parts = word.splitn(3, ':');
    let measure = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let beat = match parts.next() {
        Some(p) => p.parse().map_err(|_| bad())?,
        None => 1,
    };
    let row = match parts.next() {
        Some(p) => p.parse().map_err(|_| bad())?,
        None => 0,
    };
    Ok((measure, beat, row))
}

/// Parse `N/D`, or one of the names `c` (4/4), `¢` (2/2) and `o` (3/4).
pub fn parse_time_signature(word: &str) -> Result<(u32, u32)> {
    match word {
        "c" | "C" => return Ok((4, 4)),
        "¢" => return Ok((2, 2)),
        "o" | "O" => return Ok((3, 4)),
        _ => {}
    }
    let (num, den) = word
        .split_once('/')
        .ok_or_else(|| CompileError::grammar(format!("time signature must be a fraction, not {word}")))?;
    let num = num
        .parse()
        .map_err(|_| CompileError::grammar(format!("{num} is not a number of beats")))?;
    let den = den
        .parse()
        .map_err(|_| CompileError::grammar(format!("{den} is not a beat duration")))?;
    Ok((num, den))
}
