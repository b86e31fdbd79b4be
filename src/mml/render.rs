//! Rendering interface shared by every entity kind.

use super::error::{Diagnostics, Result};
use super::lexer::SourceLoc;
use super::scope::Score;

/// How a data block's atoms are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// `.byte` directives, several atoms per line.
    Byte,
    /// `.dbyt` big-endian words, several atoms per line.
    Word,
    /// One conductor macro per line.
    Statements,
}

impl DataFormat {
    pub fn directive(self) -> &'static str {
        match self {
            DataFormat::Byte => ".byte",
            DataFormat::Word => ".dbyt",
            DataFormat::Statements => "",
        }
    }
}

/// Labelled data that an entity's definition points at.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub label: String,
    pub format: DataFormat,
    pub atoms: Vec<String>,
    /// Raw bytes when the block may be aliased into another block.
    pub packable: Option<Vec<u8>>,
}

/// The assembly produced for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// Public label such as `PI_lead`.
    pub label: String,
    /// Definition macro line such as `instdef PI_lead, ...`.
    pub definition: String,
    pub data: Option<DataBlock>,
    pub byte_size: usize,
}

/// Common identity of named entities.
pub trait Entity {
    /// Qualified name: `song::local` for names defined inside a song.
    fn name(&self) -> &str;
    fn loc(&self) -> &SourceLoc;
}

/// An entity that can be turned into assembly.
pub trait Renderable: Entity {
    fn render(&self, score: &Score, diag: &mut Diagnostics) -> Result<Rendered>;
}

/// Turn a qualified name into an assembler-safe identifier: alphanumeric
/// runs joined by `_`, with nothing leading or trailing.
pub fn asm_name(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asm_names() {
        assert_eq!(asm_name("lead"), "lead");
        assert_eq!(asm_name("intro::bass"), "intro_bass");
        assert_eq!(asm_name("a b-c"), "a_b_c");
        assert_eq!(asm_name("héllo"), "h_llo");
        assert_eq!(asm_name("_snare"), "snare");
        assert_eq!(asm_name("lead!"), "lead");
        assert_eq!(asm_name("--a--b--"), "a_b");
    }

    #[test]
    fn directives() {
        assert_eq!(DataFormat::Byte.directive(), ".byte");
        assert_eq!(DataFormat::Word.directive(), ".dbyt");
        assert_eq!(DataFormat::Statements.directive(), "");
    }
}
