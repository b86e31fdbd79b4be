//! Lexer for Pently MML source.
//!
//! Splits source text into statement lines of whitespace-separated words,
//! stripping comments and recording where each line came from.

use std::fmt;

use serde::Serialize;

/// A position in the MML source: file name and 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLoc {
    pub file: String,
    pub line: usize,
}

impl SourceLoc {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Describe this location as seen from another line, omitting the file
    /// name when both are in the same file.
    pub fn cite(&self, from: &SourceLoc) -> String {
        if self.file == from.file {
            format!("line {}", self.line)
        } else {
            format!("line {} of {}", self.line, self.file)
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One non-empty statement line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub loc: SourceLoc,
    pub words: Vec<String>,
}

pub struct Lexer<'a> {
    source: &'a str,
    file: String,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file: impl Into<String>) -> Self {
        Self {
            source,
            file: file.into(),
        }
    }

    /// Split the source into statement lines. Blank and comment-only lines
    /// are dropped but still counted.
    pub fn lines(&self) -> Vec<Line> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(idx, text)| {
                let words: Vec<String> = strip_comment(text)
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                if words.is_empty() {
                    None
                } else {
                    Some(Line {
                        loc: SourceLoc::new(self.file.clone(), idx + 1),
                        words,
                    })
                }
            })
            .collect()
    }
}

/// Cut a line at the first comment.
///
/// A comment starts at `//` anywhere, or at a word that begins with `#`.
/// A `#` inside a word is a sharp sign (`c#`), not a comment.
fn strip_comment(line: &str) -> &str {
    let mut prev_is_space = true;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'#' && prev_is_space {
            return &line[..i];
        }
        if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
            return &line[..i];
        }
        prev_is_space = b.is_ascii_whitespace();
    }
    line
}
