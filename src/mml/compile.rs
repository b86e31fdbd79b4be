//! Render pass: turns a parsed [`Score`] into assembly-ready tables.
//!
//! Every entity is rendered in definition order, then the sound effect and
//! instrument data blocks are packed against each other within their table.

use std::collections::HashMap;

use tracing::debug;

use super::error::{Diagnostics, Result};
use super::packer::subseq_pack;
use super::render::{Entity, Renderable, Rendered};
use super::scope::{Score, Table};

/// The five directory tables the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Sfx,
    Instruments,
    Drums,
    Patterns,
    Songs,
}

impl TableKind {
    pub const ALL: [TableKind; 5] = [
        TableKind::Sfx,
        TableKind::Instruments,
        TableKind::Drums,
        TableKind::Patterns,
        TableKind::Songs,
    ];

    /// Label of the directory table in the output.
    pub fn label(self) -> &'static str {
        match self {
            TableKind::Sfx => "pently_sfx_table",
            TableKind::Instruments => "pently_instruments",
            TableKind::Drums => "pently_drums",
            TableKind::Patterns => "pently_patterns",
            TableKind::Songs => "pently_songs",
        }
    }

    /// Whether entry names are exported for the game to `.importzp`.
    pub fn exports_names(self) -> bool {
        matches!(self, TableKind::Sfx | TableKind::Instruments | TableKind::Songs)
    }

    fn packs_data(self) -> bool {
        matches!(self, TableKind::Sfx | TableKind::Instruments)
    }
}

#[derive(Debug, Clone)]
pub struct RenderedTable {
    pub kind: TableKind,
    pub entries: Vec<Rendered>,
}

impl RenderedTable {
    pub fn byte_size(&self) -> usize {
        self.entries.iter().map(|e| e.byte_size).sum()
    }
}

/// A data block emitted as `LABEL = BASE + offset` instead of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub base: String,
    /// Byte offset into `base`.
    pub offset: usize,
}

/// Everything needed to write the output files.
#[derive(Debug, Clone)]
pub struct CompiledMusic {
    pub score: Score,
    pub tables: Vec<RenderedTable>,
    /// Packed data blocks, keyed by their own label.
    pub aliases: HashMap<String, Alias>,
    pub diagnostics: Diagnostics,
}

impl CompiledMusic {
    pub fn total_bytes(&self) -> usize {
        self.tables.iter().map(RenderedTable::byte_size).sum()
    }

    pub fn table(&self, kind: TableKind) -> Option<&RenderedTable> {
        self.tables.iter().find(|t| t.kind == kind)
    }
}

fn render_all<T: Renderable>(table: &Table<T>, score: &Score, diag: &mut Diagnostics) -> Result<Vec<Rendered>> {
    table
        .iter()
        .map(|item| {
            item.render(score, diag)
                .map_err(|e| e.at(item.loc(), &[]))
        })
        .collect()
}

/// Alias every packable block of `entries` that appears inside another.
fn pack(entries: &[Rendered]) -> Vec<(String, Alias)> {
    let blocks: Vec<(&str, &[u8])> = entries
        .iter()
        .filter_map(|r| r.data.as_ref())
        .filter_map(|d| d.packable.as_deref().map(|bytes| (d.label.as_str(), bytes)))
        .collect();
    let seqs: Vec<&[u8]> = blocks.iter().map(|&(_, bytes)| bytes).collect();
    subseq_pack(&seqs)
        .into_iter()
        .zip(&blocks)
        .filter_map(|(found, &(label, _))| {
            let found = found?;
            let base = blocks[found.base].0;
            debug!(label, base, offset = found.offset, "packed data block");
            Some((
                label.to_string(),
                Alias {
                    base: base.to_string(),
                    offset: found.offset,
                },
            ))
        })
        .collect()
}

/// Render and pack a parsed score.
pub fn compile_score(score: Score, mut diagnostics: Diagnostics) -> Result<CompiledMusic> {
    let mut tables = Vec::with_capacity(TableKind::ALL.len());
    let mut aliases = HashMap::new();
    for kind in TableKind::ALL {
        let entries = match kind {
            TableKind::Sfx => render_all(&score.sfx, &score, &mut diagnostics)?,
            TableKind::Instruments => render_all(&score.instruments, &score, &mut diagnostics)?,
            TableKind::Drums => render_all(&score.drums, &score, &mut diagnostics)?,
            TableKind::Patterns => render_all(&score.patterns, &score, &mut diagnostics)?,
            TableKind::Songs => render_all(&score.songs, &score, &mut diagnostics)?,
        };
        if kind.packs_data() {
            aliases.extend(pack(&entries));
        }
        debug!(table = kind.label(), entries = entries.len(), "rendered table");
        tables.push(RenderedTable { kind, entries });
    }
    Ok(CompiledMusic {
        score,
        tables,
        aliases,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mml::lexer::SourceLoc;
    use crate::mml::sfx::{ChannelType, SoundEffect};
    use crate::mml::pitch::PitchContext;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn sfx(name: &str, volumes: &str) -> SoundEffect {
        let loc = SourceLoc::new("t", 1);
        let mut s = SoundEffect::new(name, loc.clone(), ChannelType::Pulse, &PitchContext::new());
        s.set_volume(&words(volumes), &loc).unwrap();
        s
    }

    #[test]
    fn contained_sfx_is_aliased() {
        let mut score = Score::default();
        score.sfx.insert(sfx("tail", "4 2"), "sfx").unwrap();
        score.sfx.insert(sfx("full", "8 6 4 2"), "sfx").unwrap();
        let music = compile_score(score, Diagnostics::new()).unwrap();
        assert_eq!(
            music.aliases.get("PEDAT_tail"),
            Some(&Alias {
                base: "PEDAT_full".into(),
                offset: 4
            })
        );
        assert!(!music.aliases.contains_key("PEDAT_full"));
    }

    #[test]
    fn tables_in_engine_order() {
        let music = compile_score(Score::default(), Diagnostics::new()).unwrap();
        let labels: Vec<_> = music.tables.iter().map(|t| t.kind.label()).collect();
        assert_eq!(
            labels,
            vec![
                "pently_sfx_table",
                "pently_instruments",
                "pently_drums",
                "pently_patterns",
                "pently_songs"
            ]
        );
        assert_eq!(music.total_bytes(), 0);
    }

    #[test]
    fn render_errors_carry_entity_location() {
        use crate::mml::drum::Drum;
        let mut score = Score::default();
        let drum = Drum::new("kick".into(), "kick", &words("missing"), SourceLoc::new("t", 9)).unwrap();
        score.drums.insert(drum, "drum").unwrap();
        let err = compile_score(score, Diagnostics::new()).unwrap_err();
        assert_eq!(err.location, Some(SourceLoc::new("t", 9)));
    }
}
