//! Error taxonomy shared by every reader and the composition engine.
//!
//! Errors abort the operation that raised them and bubble to the public entry
//! points; warnings accumulate in a [`Warnings`] list and are always handed
//! back next to the (possibly partial) result.

use std::fmt;

use thiserror::Error;

/// 1-based row/column of a diagnostic inside a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextPos {
    pub row: u32,
    pub col: u32,
}

impl TextPos {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for TextPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.col)
    }
}

#[derive(Debug, Error)]
pub enum UsdError {
    /// Missing/empty input, or a configured size limit was exceeded.
    #[error("input: {0}")]
    Input(String),

    /// Wrong magic bytes or an unsupported format version.
    #[error("format: {0}")]
    Format(String),

    /// Malformed literal (string, number, identifier, escape) in USDA text.
    #[error("lex error at {pos}: {msg}")]
    Lex { pos: TextPos, msg: String },

    /// Grammar violation in USDA text.
    #[error("parse error at {pos}: {msg}")]
    Parse { pos: TextPos, msg: String },

    /// Type mismatch or disallowed token while lowering a layer to a stage.
    #[error("schema: {0}")]
    Schema(String),

    /// Asset not found on any search path.
    #[error("resolution: {0}")]
    Resolution(String),

    /// Composition arc cycle, missing default prim, or iteration bound hit.
    #[error("composition: {0}")]
    Composition(String),

    /// Out-of-range offset/index, ZIP constraint violation, or LZ4 failure
    /// in a binary container.
    #[error("integrity error in `{section}` at offset {offset}: {msg}")]
    Integrity {
        section: &'static str,
        offset: u64,
        msg: String,
    },
}

impl UsdError {
    pub fn parse(pos: TextPos, msg: impl Into<String>) -> Self {
        Self::Parse {
            pos,
            msg: msg.into(),
        }
    }

    pub fn lex(pos: TextPos, msg: impl Into<String>) -> Self {
        Self::Lex {
            pos,
            msg: msg.into(),
        }
    }

    pub fn integrity(section: &'static str, offset: u64, msg: impl Into<String>) -> Self {
        Self::Integrity {
            section,
            offset,
            msg: msg.into(),
        }
    }
}

pub type Result<T, E = UsdError> = std::result::Result<T, E>;

/// A recoverable diagnostic. Warnings never fail a load.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub pos: Option<TextPos>,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "[{pos}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Ordered warning accumulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Warnings(Vec<Warning>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(Warning {
            message: message.into(),
            pos: None,
        });
    }

    pub fn push_at(&mut self, pos: TextPos, message: impl Into<String>) {
        self.0.push(Warning {
            message: message.into(),
            pos: Some(pos),
        });
    }

    pub fn extend(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Warning> {
        self.0.iter()
    }
}

impl IntoIterator for Warnings {
    type Item = Warning;
    type IntoIter = std::vec::IntoIter<Warning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
