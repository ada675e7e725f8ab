use std::fmt;

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::errors::RowIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    Semicolon,
    Pipe,
    Comma,
    Tab,
}

impl Delimiter {
    /// Sniffing order; earlier entries win ties.
    pub const CANDIDATES: [Delimiter; 4] = [
        Delimiter::Semicolon,
        Delimiter::Pipe,
        Delimiter::Comma,
        Delimiter::Tab,
    ];

    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Semicolon => ';',
            Delimiter::Pipe => '|',
            Delimiter::Comma => ',',
            Delimiter::Tab => '\t',
        }
    }

    pub fn as_byte(&self) -> u8 {
        self.as_char() as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Delimiter::Semicolon => "semicolon",
            Delimiter::Pipe => "pipe",
            Delimiter::Comma => "comma",
            Delimiter::Tab => "tab",
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<char> for Delimiter {
    type Error = String;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        Delimiter::CANDIDATES
            .into_iter()
            .find(|candidate| candidate.as_char() == value)
            .ok_or_else(|| format!("unsupported delimiter '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a data row whose shape does not match the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowPolicy {
    #[default]
    Skip,
    Reject,
}

/// A delimited file read into a frame of nullable `String` columns.
///
/// `row_lines[i]` is the 1-based source line of row `i` in `df`.
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub df: DataFrame,
    pub delimiter: Delimiter,
    pub encoding: TextEncoding,
    pub row_lines: Vec<u64>,
    pub issues: Vec<RowIssue>,
}

impl ParsedTable {
    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn skipped_rows(&self) -> usize {
        self.issues.len()
    }
}
