use std::fmt;

use polars::prelude::PolarsError;
use serde::Serialize;
use thiserror::Error;

/// A data row that was dropped while reading, with the 1-based line it started on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowIssue {
    pub line: u64,
    pub message: String,
}

impl RowIssue {
    pub fn new(line: u64, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("input did not contain a header row")]
    EmptyInput,

    #[error("header column {index} invalid: {message}")]
    InvalidHeader { index: usize, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("data row at line {line} invalid: {message}")]
    DataRow { line: u64, message: String },

    #[error("failed to assemble table: {0}")]
    Polars(#[from] PolarsError),
}
