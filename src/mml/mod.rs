//! Pently MML assembler: line parser → entity tables → render and pack → assembly text.

pub mod compile;
pub mod drum;
pub mod envelope;
pub mod error;
pub mod field;
pub mod instrument;
pub mod keyword;
pub mod lexer;
pub mod note;
pub mod output;
pub mod packer;
pub mod parser;
pub mod pattern;
pub mod periods;
pub mod pitch;
pub mod render;
pub mod rhythm;
pub mod scope;
pub mod sfx;
pub mod song;

pub use compile::CompiledMusic;
pub use error::{CompileError, Diagnostics, ErrorKind, Warning};
pub use output::{render_asm, render_inc, OutputOptions};
pub use periods::Region;
pub use scope::Score;

use std::path::Path;

use compile::compile_score;
use parser::{Parser, DEFAULT_MAX_INCLUDE_DEPTH};

/// Settings that affect parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub max_include_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }
}

/// The MML compiler.
///
/// Parses source text into a [`Score`], then renders it into tables ready
/// for [`render_asm`].
pub struct Compiler;

impl Compiler {
    /// Parse MML source. Relative includes are looked up from the
    /// working directory.
    pub fn parse(source: &str, file: &str) -> Result<(Score, Diagnostics), CompileError> {
        Self::parse_with(source, file, None, CompileOptions::default())
    }

    /// Parse MML source, resolving relative includes against `dir`.
    pub fn parse_with(
        source: &str,
        file: &str,
        dir: Option<&Path>,
        options: CompileOptions,
    ) -> Result<(Score, Diagnostics), CompileError> {
        let mut parser = Parser::new(options.max_include_depth);
        parser.parse_source(source, file, dir)?;
        parser.finish()
    }

    /// Parse and render MML source.
    pub fn compile(source: &str, file: &str) -> Result<CompiledMusic, CompileError> {
        let (score, diagnostics) = Self::parse(source, file)?;
        compile_score(score, diagnostics)
    }

    /// Parse and render an MML file and everything it includes.
    pub fn compile_file(path: &Path, options: CompileOptions) -> Result<CompiledMusic, CompileError> {
        let mut parser = Parser::new(options.max_include_depth);
        parser.parse_file(path)?;
        let (score, diagnostics) = parser.finish()?;
        compile_score(score, diagnostics)
    }

    /// Parse and render source read from somewhere other than a file.
    pub fn compile_source(
        source: &str,
        file: &str,
        dir: Option<&Path>,
        options: CompileOptions,
    ) -> Result<CompiledMusic, CompileError> {
        let (score, diagnostics) = Self::parse_with(source, file, dir, options)?;
        compile_score(score, diagnostics)
    }
}
