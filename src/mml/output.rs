//! Assembly text for the main output and the optional include file.

use super::compile::{CompiledMusic, TableKind};
use super::periods::{period_table_lines, Region};
use super::render::{asm_name, DataFormat};
use super::song::MAX_MARKS;

/// Longest line `wrap_atoms` produces.
const MAX_LINE: usize = 79;

const HEADER: &str = "; Generated using Pently music assembler";

/// What surrounds the compiled data in the main output.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub segment: String,
    /// Engine include file providing `instdef` and friends.
    pub engine_include: String,
    /// Shown in the `; Music from` line.
    pub source_name: String,
    /// Semitones of period table to append; 0 for none.
    pub periods: u32,
    pub region: Region,
    pub tuning: f64,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            segment: "RODATA".to_string(),
            engine_include: "pentlyseq.inc".to_string(),
            source_name: "standard input".to_string(),
            periods: 0,
            region: Region::Ntsc,
            tuning: 440.0,
        }
    }
}

/// Join atoms with commas into lines of at most 79 characters, each
/// starting with `prefix`. An atom longer than a line gets a line of its
/// own.
pub fn wrap_atoms(atoms: &[String], prefix: &str) -> Vec<String> {
    let max = MAX_LINE.saturating_sub(prefix.len());
    let mut lines = Vec::new();
    let mut line: Vec<&str> = Vec::new();
    let mut len = 0;
    for atom in atoms {
        if !line.is_empty() && atom.len() + len > max {
            lines.push(format!("{prefix}{}", line.join(",")));
            line.clear();
            len = 0;
        }
        line.push(atom);
        len += atom.len() + 1;
    }
    if !line.is_empty() {
        lines.push(format!("{prefix}{}", line.join(",")));
    }
    lines
}

fn music_lines(music: &CompiledMusic, opts: &OutputOptions) -> Vec<String> {
    let mut lines = vec![
        format!("; Music from {}", opts.source_name),
        format!(".include \"{}\"", opts.engine_include),
        format!(".segment \"{}\"", opts.segment),
        format!("NUM_SONGS={}", music.score.songs.len()),
        format!("NUM_SOUNDS={}", music.score.sfx.len()),
        ".exportzp NUM_SONGS, NUM_SOUNDS".to_string(),
    ];
    let mut exports = Vec::new();
    let mut exportzp = Vec::new();
    let mut size_lines = Vec::new();

    for table in &music.tables {
        let label = table.kind.label();
        let bytes = table.byte_size();
        let count = table.entries.len();
        exports.push(label.to_string());
        if table.kind.exports_names() {
            exportzp.extend(table.entries.iter().map(|e| e.label.clone()));
        }

        let plural = if count == 1 { "entry" } else { "entries" };
        lines.push(format!("{label}:  ; {count} {plural}, {bytes} bytes"));
        lines.extend(table.entries.iter().map(|e| e.definition.clone()));
        for block in table.entries.iter().filter_map(|e| e.data.as_ref()) {
            if let Some(alias) = music.aliases.get(&block.label) {
                lines.push(format!("{} = {} + {}", block.label, alias.base, alias.offset));
                continue;
            }
            lines.push(format!("{}:", block.label));
            match block.format {
                DataFormat::Statements => lines.extend(block.atoms.iter().cloned()),
                format => {
                    let prefix = format!("{} ", format.directive());
                    lines.extend(wrap_atoms(&block.atoms, &prefix));
                }
            }
        }

        size_lines.push(format!("; {label}: {bytes} bytes"));
        size_lines.extend(
            table
                .entries
                .iter()
                .map(|e| format!(";   {}: {} bytes", e.label, e.byte_size)),
        );
    }

    lines.push(String::new());
    lines.push("; Make music data available to Pently".to_string());
    lines.extend(wrap_atoms(&exports, ".export "));
    lines.push(String::new());
    lines.push("; Sound effect, instrument, and song names for your program to .importzp".to_string());
    lines.extend(wrap_atoms(&exportzp, ".exportzp "));
    lines.push(String::new());
    lines.push(format!("; Total music data size: {} bytes", music.total_bytes()));
    lines.extend(size_lines);
    lines
}

/// The main assembly output: compiled music, a period table or both.
pub fn render_asm(music: Option<&CompiledMusic>, opts: &OutputOptions) -> String {
    let mut lines = vec![HEADER.to_string()];
    if let Some(music) = music {
        lines.extend(music_lines(music, opts));
    }
    if opts.periods > 0 {
        lines.extend(period_table_lines(opts.periods, opts.region, opts.tuning));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Quote text for a ca65 string literal, which has no escapes.
fn asm_string(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "'"))
}

/// Constants for a game that includes the music rather than linking it:
/// entity ids, the resume point, mute masks, rehearsal marks and
/// metadata strings.
pub fn render_inc(music: &CompiledMusic) -> String {
    let score = &music.score;
    let mut lines = vec![
        HEADER.to_string(),
        ".ifndef PENTLY_MUSIC_INC".to_string(),
        "PENTLY_MUSIC_INC = 1".to_string(),
        format!("NUM_SONGS = {}", score.songs.len()),
        format!("NUM_SOUNDS = {}", score.sfx.len()),
    ];

    if !score.sfx.is_empty() {
        lines.push("; Sound effects".to_string());
        lines.extend(
            score
                .sfx
                .iter()
                .enumerate()
                .map(|(i, s)| format!("SFX_{} = {i}", asm_name(&s.name))),
        );
    }

    if !score.songs.is_empty() {
        lines.push("; Songs".to_string());
    }
    for (i, song) in score.songs.iter().enumerate() {
        let name = asm_name(&song.name);
        lines.push(format!("SONG_{name} = {i}"));
        if let Some(mask) = song.mute.copied() {
            lines.push(format!("PSMUTE_{name} = ${mask:02X}"));
        }
        lines.extend(
            song.marks()
                .iter()
                .take(MAX_MARKS)
                .map(|m| format!("PSMARK_{name}_{} = {}", asm_name(&m.name), m.rows)),
        );
    }

    if let Some(resume) = score.resume.get() {
        let found = score
            .songs
            .iter()
            .enumerate()
            .find(|(_, s)| s.name == resume.song);
        if let Some((i, song)) = found {
            lines.push("; Debugging start point".to_string());
            lines.push(format!("PENTLY_RESUME_SONG = {i}"));
            lines.push(format!("PENTLY_RESUME_ROWS = {}", resume.rows));
            lines.push(format!("PENTLY_RESUME_MUTE = ${:02X}", song.mute.copied().unwrap_or(0)));
        }
    }

    let meta = &score.metadata;
    for (label, value) in [
        ("PENTLY_TITLE", meta.title.get()),
        ("PENTLY_AUTHOR", meta.author.get()),
        ("PENTLY_COPYRIGHT", meta.copyright.get()),
    ] {
        if let Some(text) = value {
            lines.push(format!(".define {label} {}", asm_string(text)));
        }
    }
    if !score.songs.is_empty() {
        let titles: Vec<String> = score
            .songs
            .iter()
            .map(|s| asm_string(s.title.get().map_or(s.name.as_str(), String::as_str)))
            .collect();
        let authors: Vec<String> = score
            .songs
            .iter()
            .map(|s| asm_string(s.author.get().or(meta.author.get()).map_or("", String::as_str)))
            .collect();
        lines.push(format!(".define PENTLY_SONG_TITLES {}", titles.join(", ")));
        lines.push(format!(".define PENTLY_SONG_AUTHORS {}", authors.join(", ")));
    }

    lines.push(".endif".to_string());
    lines.push(String::new());
    lines.join("\n")
}
