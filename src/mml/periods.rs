//! NES APU period lookup tables.

use serde::{Deserialize, Serialize};

/// Console timing, which sets the CPU clock the periods divide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Ntsc,
    Pal,
    Dendy,
}

impl Region {
    pub fn name(self) -> &'static str {
        match self {
            Region::Ntsc => "ntsc",
            Region::Pal => "pal",
            Region::Dendy => "dendy",
        }
    }

    /// CPU clock divided by the pulse channel's 16-step sequencer.
    fn period_numerator(self) -> f64 {
        match self {
            Region::Ntsc => 39_375_000.0 / (22.0 * 16.0),
            Region::Pal => 266_017_125.0 / (10.0 * 16.0 * 16.0),
            Region::Dendy => 266_017_125.0 / (10.0 * 16.0 * 15.0),
        }
    }
}

/// Most semitones a period table may cover; the 2A03's 11-bit period is
/// too coarse beyond this.
pub const MAX_PERIODS: u32 = 88;

/// Period register values for `count` semitones starting at A1, where A4
/// is `tuning` Hz.
pub fn period_values(count: u32, region: Region, tuning: f64) -> Vec<u16> {
    let octave_base = region.period_numerator() / (tuning / 8.0);
    let semitone = 2.0_f64.powf(1.0 / 12.0);
    (0..count)
        .map(|i| {
            let freq = f64::from(1u32 << (i / 12)) * semitone.powi((i % 12) as i32);
            ((octave_base / freq).round_ties_even() as i64 - 1).clamp(0, 0x7FF) as u16
        })
        .collect()
}

/// Assembly lines defining `periodTableLo` and `periodTableHi`.
pub fn period_table_lines(count: u32, region: Region, tuning: f64) -> Vec<String> {
    let periods = period_values(count, region, tuning);
    let mut lines = vec![
        format!("; Period table of length {count} for {}", region.name()),
        ".export periodTableLo, periodTableHi".to_string(),
        "periodTableLo:".to_string(),
    ];
    let lo: Vec<String> = periods.iter().map(|p| format!("${:02x}", p & 0xFF)).collect();
    lines.extend(super::output::wrap_atoms(&lo, ".byt "));
    lines.push("periodTableHi:".to_string());
    let hi: Vec<String> = periods.iter().map(|p| (p >> 8).to_string()).collect();
    lines.extend(super::output::wrap_atoms(&hi, ".byt "));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntsc_a1() {
        let periods = period_values(13, Region::Ntsc, 440.0);
        assert_eq!(periods[0], 2033);
        // One octave up halves the period, give or take rounding.
        assert!((i32::from(periods[12]) - 1016).abs() <= 1);
    }

    #[test]
    fn pal_is_lower() {
        let ntsc = period_values(1, Region::Ntsc, 440.0);
        let pal = period_values(1, Region::Pal, 440.0);
        assert_eq!(pal[0], 1888);
        assert!(pal[0] < ntsc[0]);
    }

    #[test]
    fn periods_descend() {
        let periods = period_values(MAX_PERIODS, Region::Dendy, 440.0);
        assert_eq!(periods.len(), 88);
        assert!(periods.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn table_layout() {
        let lines = period_table_lines(2, Region::Ntsc, 440.0);
        assert_eq!(lines[0], "; Period table of length 2 for ntsc");
        assert_eq!(lines[2], "periodTableLo:");
        assert!(lines[3].starts_with(".byt $f1,"));
        assert_eq!(lines[4], "periodTableHi:");
        assert_eq!(lines[5], ".byt 7,7");
    }

    #[test]
    fn region_from_yaml() {
        let region: Region = serde_yaml::from_str("pal").unwrap();
        assert_eq!(region, Region::Pal);
    }
}
