// crates/dataroad-core/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::config::{ConfigError, SourceKind};
use crate::enricher::EnrichmentError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to persist output file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Join failed: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error(
        "missing {kind} input: no files matching '{pattern}' under {}",
        .directory.display()
    )]
    MissingInput {
        kind: SourceKind,
        directory: PathBuf,
        pattern: String,
    },

    #[error("{kind} input unreadable, every matched file failed: {}", .failures.join("; "))]
    UnreadableSource {
        kind: SourceKind,
        failures: Vec<String>,
    },

    #[error("output path {} is a directory", .0.display())]
    DestinationIsDirectory(PathBuf),

    #[error("failed to read {kind} file {}: {reason}", .path.display())]
    ReadFailure {
        kind: SourceKind,
        path: PathBuf,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
