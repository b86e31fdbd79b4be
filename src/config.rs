//! Assembler configuration loaded from pentlyas.yaml or ~/.pentlyas/config.yaml.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::mml::{CompileOptions, OutputOptions, Region};

/// File name looked for in the working directory.
pub const LOCAL_CONFIG: &str = "pentlyas.yaml";

/// Assembler configuration loaded from YAML. Command-line flags override it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Linker segment for the music data.
    #[serde(default = "default_segment")]
    pub segment: String,
    /// Engine include file that defines the table macros.
    #[serde(default = "default_engine_include")]
    pub engine_include: String,
    #[serde(default)]
    pub period_region: Region,
    /// Semitones of period table to append; 0 for none.
    #[serde(default)]
    pub periods: u32,
    /// Frequency of A4 in Hz.
    #[serde(default = "default_tuning")]
    pub tuning: f64,
    /// Treat warnings as errors.
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,
}

fn default_segment() -> String {
    "RODATA".to_string()
}

fn default_engine_include() -> String {
    "pentlyseq.inc".to_string()
}

fn default_tuning() -> f64 {
    440.0
}

fn default_max_include_depth() -> usize {
    CompileOptions::default().max_include_depth
}

impl AssemblerConfig {
    /// Load config from the standard path (~/.pentlyas/config.yaml).
    /// Returns None if the file doesn't exist or doesn't parse.
    pub fn load() -> Option<Self> {
        Self::load_from_home(&dirs::home_dir()?)
    }

    fn load_from_home(home: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(Self::user_path(home)).ok()?;
        serde_yaml::from_str(&content).ok()
    }

    fn user_path(home: &Path) -> PathBuf {
        home.join(".pentlyas").join("config.yaml")
    }

    /// Load config from an explicitly named file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// The explicit file if given, else `./pentlyas.yaml`, else the user
    /// config, else defaults.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            return Self::load_from(local);
        }
        Ok(Self::load().unwrap_or_default())
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            max_include_depth: self.max_include_depth,
        }
    }

    pub fn output_options(&self, source_name: &str) -> OutputOptions {
        OutputOptions {
            segment: self.segment.clone(),
            engine_include: self.engine_include.clone(),
            source_name: source_name.to_string(),
            periods: self.periods,
            region: self.period_region,
            tuning: self.tuning,
        }
    }
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            segment: default_segment(),
            engine_include: default_engine_include(),
            period_region: Region::default(),
            periods: 0,
            tuning: default_tuning(),
            strict: false,
            max_include_depth: default_max_include_depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AssemblerConfig::default();
        assert_eq!(config.segment, "RODATA");
        assert_eq!(config.max_include_depth, 8);
        assert_eq!(config.period_region, Region::Ntsc);
        assert!(!config.strict);
    }

    #[test]
    fn serialize_deserialize() {
        let config = AssemblerConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AssemblerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.segment, config.segment);
        assert_eq!(parsed.tuning, 440.0);
    }

    #[test]
    fn custom_config_deserialize() {
        let yaml = r#"
segment: MUSIC
period_region: dendy
periods: 64
strict: true
"#;
        let config: AssemblerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.segment, "MUSIC");
        assert_eq!(config.period_region, Region::Dendy);
        assert_eq!(config.periods, 64);
        assert!(config.strict);
        assert_eq!(config.engine_include, "pentlyseq.inc");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "tuning: 432.0\n").unwrap();
        let config = AssemblerConfig::load_from(&path).unwrap();
        assert_eq!(config.tuning, 432.0);
        assert!(AssemblerConfig::load_from(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn options_carry_settings() {
        let config = AssemblerConfig {
            periods: 12,
            ..AssemblerConfig::default()
        };
        let out = config.output_options("song.pently");
        assert_eq!(out.periods, 12);
        assert_eq!(out.source_name, "song.pently");
        assert_eq!(config.compile_options().max_include_depth, 8);
    }

    #[test]
    fn load_missing_file_returns_none() {
        let home = tempfile::tempdir().unwrap();
        assert!(AssemblerConfig::load_from_home(home.path()).is_none());
    }

    #[test]
    fn load_reads_user_config() {
        let home = tempfile::tempdir().unwrap();
        let path = AssemblerConfig::user_path(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "segment: MUSIC\n").unwrap();
        let config = AssemblerConfig::load_from_home(home.path()).unwrap();
        assert_eq!(config.segment, "MUSIC");

        std::fs::write(&path, "segment: [unclosed\n").unwrap();
        assert!(AssemblerConfig::load_from_home(home.path()).is_none());
    }
}
