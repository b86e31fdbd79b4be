//! Error and warning types for the MML assembler.

use std::fmt;

use thiserror::Error;

use super::lexer::SourceLoc;

/// Convenient result alias for compilation steps.
pub type Result<T> = std::result::Result<T, CompileError>;

/// A fatal error that stops compilation.
#[derive(Debug, Clone, Error)]
#[error("{}{kind} error: {message}{}", location_prefix(.location), include_trail(.included_from))]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<SourceLoc>,
    /// Locations of the `include` statements that led to `location`,
    /// innermost last.
    pub included_from: Vec<SourceLoc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A word matches no pitch, drum, duration or keyword syntax.
    Grammar,
    /// A keyword appears outside the entity it configures.
    Scope,
    /// An entity or write-once field was defined twice.
    Redefinition,
    /// A number is outside its documented bounds.
    Range,
    /// A name did not resolve to an entity or chord.
    Reference,
    /// Song or pattern structure is inconsistent.
    Structural,
    /// A source file could not be read.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Grammar => "grammar",
            ErrorKind::Scope => "scope",
            ErrorKind::Redefinition => "redefinition",
            ErrorKind::Range => "range",
            ErrorKind::Reference => "reference",
            ErrorKind::Structural => "structural",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

fn location_prefix(location: &Option<SourceLoc>) -> String {
    location
        .as_ref()
        .map(|loc| format!("{loc}: "))
        .unwrap_or_default()
}

fn include_trail(stack: &[SourceLoc]) -> String {
    stack
        .iter()
        .rev()
        .map(|loc| format!("\n  included from {loc}"))
        .collect()
}

impl CompileError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            included_from: Vec::new(),
        }
    }

    pub fn grammar(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Grammar, message)
    }

    pub fn scope(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scope, message)
    }

    pub fn redefinition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Redefinition, message)
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Reference, message)
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Structural, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    /// Attach a location unless the error already carries one from a
    /// deeper include level.
    pub fn at(mut self, location: &SourceLoc, included_from: &[SourceLoc]) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
            self.included_from = included_from.to_vec();
        }
        self
    }
}

/// A non-fatal problem reported after compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub location: Option<SourceLoc>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{loc}: warning: {}", self.message),
            None => write!(f, "warning: {}", self.message),
        }
    }
}

/// Unknown keywords beyond this many are counted but not kept.
pub const MAX_UNKNOWN_KEYWORD_WARNINGS: usize = 100;

/// Warnings accumulated across parsing and rendering.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
    unknown_keywords: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, location: Option<&SourceLoc>, message: impl Into<String>) {
        self.warnings.push(Warning {
            location: location.cloned(),
            message: message.into(),
        });
    }

    /// Record an unrecognized keyword, keeping only the first few verbatim.
    pub fn unknown_keyword(&mut self, location: &SourceLoc, message: impl Into<String>) {
        if self.unknown_keywords < MAX_UNKNOWN_KEYWORD_WARNINGS {
            self.warn(Some(location), message);
        }
        self.unknown_keywords += 1;
    }

    pub fn unknown_keywords(&self) -> usize {
        self.unknown_keywords
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.unknown_keywords == 0
    }

    /// Number of warnings including unknown keywords that were not kept.
    pub fn len(&self) -> usize {
        self.warnings.len()
            + self
                .unknown_keywords
                .saturating_sub(MAX_UNKNOWN_KEYWORD_WARNINGS)
    }
}
