use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use blake3::Hasher;
use dataroad_parser::{read_delimited, Delimiter, ParsedTable, ParserError, RowIssue, TextEncoding};
use glob::Pattern;
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ReadPolicy, SourceKind, SourceSpec};
use crate::error::{PipelineError, Result};
use crate::normalize::{normalize_column_name, normalize_columns, NormalizeError};
use crate::schema::KEY_COLUMN;
use crate::types::{KeyError, MunicipalityCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub hash: Option<String>,
    pub status: FileStatus,
    pub delimiter: Option<Delimiter>,
    pub encoding: Option<TextEncoding>,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
    pub issues: Vec<RowIssue>,
    pub error: Option<String>,
}

impl FileReport {
    fn loaded(path: &Path, hash: String, file: &LoadedFile) -> Self {
        Self {
            path: path.display().to_string(),
            hash: Some(hash),
            status: FileStatus::Loaded,
            delimiter: Some(file.delimiter),
            encoding: Some(file.encoding),
            rows_loaded: file.df.height(),
            rows_skipped: file.issues.len(),
            issues: file.issues.clone(),
            error: None,
        }
    }

    fn failed(path: &Path, hash: Option<String>, failure: &FileFailure) -> Self {
        Self {
            path: path.display().to_string(),
            hash,
            status: FileStatus::Failed,
            delimiter: None,
            encoding: None,
            rows_loaded: 0,
            rows_skipped: 0,
            issues: Vec::new(),
            error: Some(failure.reason.clone()),
        }
    }
}

/// One file read, normalized and keyed on [`KEY_COLUMN`].
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub df: DataFrame,
    pub delimiter: Delimiter,
    pub encoding: TextEncoding,
    pub issues: Vec<RowIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub reason: String,
}

impl FileFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl From<ParserError> for FileFailure {
    fn from(err: ParserError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<NormalizeError> for FileFailure {
    fn from(err: NormalizeError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<PolarsError> for FileFailure {
    fn from(err: PolarsError) -> Self {
        Self::new(err.to_string())
    }
}

/// Every file matched for one source, combined into a single table.
#[derive(Debug)]
pub struct SourceLoad {
    pub kind: SourceKind,
    /// `None` when no file matched or none could be loaded.
    pub table: Option<DataFrame>,
    pub reports: Vec<FileReport>,
}

impl SourceLoad {
    pub fn is_absent(&self) -> bool {
        self.table.is_none()
    }

    pub fn rows_loaded(&self) -> usize {
        self.reports.iter().map(|report| report.rows_loaded).sum()
    }

    pub fn rows_skipped(&self) -> usize {
        self.reports.iter().map(|report| report.rows_skipped).sum()
    }

    pub fn failed_files(&self) -> usize {
        self.reports
            .iter()
            .filter(|report| report.status == FileStatus::Failed)
            .count()
    }
}

/// Lists the files under `input_dir` matching the source pattern, sorted by path.
pub fn discover_files(input_dir: &Path, spec: &SourceSpec) -> Result<Vec<PathBuf>> {
    let escaped = Pattern::escape(&input_dir.to_string_lossy());
    let pattern = format!("{}/{}", escaped.trim_end_matches('/'), spec.pattern);

    let mut paths = Vec::new();
    for entry in glob::glob(&pattern)? {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(err) => warn!(source = %spec.kind, error = %err, "could not read matched path"),
        }
    }
    paths.sort();
    Ok(paths)
}

/// Loads every file of one source type.
///
/// Missing mandatory sources are fatal. Under [`ReadPolicy::Tolerant`] a failed file is
/// reported and skipped; under [`ReadPolicy::Strict`] it aborts the load.
pub fn load_source(input_dir: &Path, spec: &SourceSpec, policy: ReadPolicy) -> Result<SourceLoad> {
    let paths = discover_files(input_dir, spec)?;

    if paths.is_empty() {
        if spec.kind.is_mandatory() {
            return Err(PipelineError::MissingInput {
                kind: spec.kind,
                directory: input_dir.to_path_buf(),
                pattern: spec.pattern.clone(),
            });
        }
        info!(source = %spec.kind, pattern = %spec.pattern, "no files matched, source treated as absent");
        return Ok(SourceLoad {
            kind: spec.kind,
            table: None,
            reports: Vec::new(),
        });
    }

    let mut frames = Vec::with_capacity(paths.len());
    let mut reports = Vec::with_capacity(paths.len());

    for path in paths {
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(err) => {
                let failure = FileFailure::new(err.to_string());
                reject_or_report(spec.kind, policy, &path, &failure)?;
                reports.push(FileReport::failed(&path, None, &failure));
                continue;
            }
        };
        let hash = compute_hash(&contents);

        match load_file(&contents, spec, policy) {
            Ok(loaded) => {
                debug!(
                    source = %spec.kind,
                    path = %path.display(),
                    rows = loaded.df.height(),
                    delimiter = %loaded.delimiter,
                    encoding = %loaded.encoding,
                    "file loaded"
                );
                if !loaded.issues.is_empty() {
                    warn!(
                        source = %spec.kind,
                        path = %path.display(),
                        skipped = loaded.issues.len(),
                        "skipped malformed rows"
                    );
                }
                reports.push(FileReport::loaded(&path, hash, &loaded));
                frames.push(loaded.df);
            }
            Err(failure) => {
                reject_or_report(spec.kind, policy, &path, &failure)?;
                reports.push(FileReport::failed(&path, Some(hash), &failure));
            }
        }
    }

    if frames.is_empty() {
        if spec.kind.is_mandatory() {
            return Err(PipelineError::UnreadableSource {
                kind: spec.kind,
                failures: reports
                    .iter()
                    .map(|report| {
                        format!(
                            "{}: {}",
                            report.path,
                            report.error.as_deref().unwrap_or("unknown error")
                        )
                    })
                    .collect(),
            });
        }
        warn!(source = %spec.kind, files = reports.len(), "no file could be loaded, source treated as absent");
        return Ok(SourceLoad {
            kind: spec.kind,
            table: None,
            reports,
        });
    }

    let table = stack_frames(frames)?;
    let load = SourceLoad {
        kind: spec.kind,
        table: Some(table),
        reports,
    };
    info!(
        source = %spec.kind,
        files = load.reports.len(),
        failed_files = load.failed_files(),
        rows = load.rows_loaded(),
        skipped_rows = load.rows_skipped(),
        "source loaded"
    );
    Ok(load)
}

fn reject_or_report(
    kind: SourceKind,
    policy: ReadPolicy,
    path: &Path,
    failure: &FileFailure,
) -> Result<()> {
    if policy == ReadPolicy::Strict {
        return Err(PipelineError::ReadFailure {
            kind,
            path: path.to_path_buf(),
            reason: failure.reason.clone(),
        });
    }
    warn!(source = %kind, path = %path.display(), reason = %failure, "file skipped");
    Ok(())
}

/// Parses one file and brings it to the canonical shape: normalized labels, a validated
/// [`KEY_COLUMN`] and, for sources that have one, an `Int64` value column.
pub fn load_file(
    contents: &[u8],
    spec: &SourceSpec,
    policy: ReadPolicy,
) -> std::result::Result<LoadedFile, FileFailure> {
    let ParsedTable {
        mut df,
        delimiter,
        encoding,
        row_lines,
        mut issues,
    } = read_delimited(contents, policy.row_policy())?;

    normalize_columns(&mut df)?;

    let key_source = resolve_column(&df, &spec.key_columns).ok_or_else(|| {
        FileFailure::new(format!(
            "no municipality code column; looked for {:?}",
            spec.key_columns
        ))
    })?;
    if key_source != KEY_COLUMN {
        df.rename(&key_source, KEY_COLUMN.into())?;
    }

    let mut df = canonicalize_keys(df, &row_lines, &mut issues, policy)?;

    if let Some(value_column) = spec.kind.value_column() {
        let value_source = resolve_column(&df, &spec.value_columns).ok_or_else(|| {
            FileFailure::new(format!(
                "no {value_column} column; looked for {:?}",
                spec.value_columns
            ))
        })?;
        if value_source != value_column {
            df.rename(&value_source, value_column.into())?;
        }
        let counts: Vec<Option<i64>> = df
            .column(value_column)?
            .str()?
            .into_iter()
            .map(|value| value.and_then(parse_count))
            .collect();
        df.with_column(Series::new(value_column.into(), counts))?;
    }

    issues.sort_by_key(|issue| issue.line);

    Ok(LoadedFile {
        df,
        delimiter,
        encoding,
        issues,
    })
}

/// First candidate (after normalization) that names a column of `df`.
fn resolve_column(df: &DataFrame, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .map(|candidate| normalize_column_name(candidate))
        .find(|candidate| df.column(candidate).is_ok())
}

/// Replaces raw key values with canonical municipality codes and drops rows whose key
/// does not parse.
fn canonicalize_keys(
    df: DataFrame,
    row_lines: &[u64],
    issues: &mut Vec<RowIssue>,
    policy: ReadPolicy,
) -> std::result::Result<DataFrame, FileFailure> {
    let keys = df.column(KEY_COLUMN)?.str()?;

    let mut keep = Vec::with_capacity(df.height());
    let mut canonical: Vec<Option<String>> = Vec::with_capacity(df.height());

    for (idx, value) in keys.into_iter().enumerate() {
        let parsed = match value {
            Some(raw) => MunicipalityCode::parse(raw),
            None => Err(KeyError::Missing),
        };
        match parsed {
            Ok(code) => {
                keep.push(true);
                canonical.push(Some(code.into_string()));
            }
            Err(err) => {
                let line = row_lines.get(idx).copied().unwrap_or_default();
                if policy == ReadPolicy::Strict {
                    return Err(FileFailure::new(format!("line {line}: {err}")));
                }
                keep.push(false);
                issues.push(RowIssue::new(line, err.to_string()));
            }
        }
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let mut filtered = df.filter(&mask)?;
    filtered.with_column(Series::new(KEY_COLUMN.into(), canonical))?;
    Ok(filtered)
}

/// Parses vehicle and population counts: plain integers, `1.234.567` thousands
/// groups as written by pt-BR exports, or float-formatted integers (`1234.0`).
pub fn parse_count(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }

    let groups: Vec<&str> = trimmed.split('.').collect();
    let is_grouped = groups.len() > 1
        && (1..=3).contains(&groups[0].len())
        && groups[1..].iter().all(|group| group.len() == 3)
        && groups
            .iter()
            .all(|group| group.chars().all(|ch| ch.is_ascii_digit()));
    if is_grouped {
        return groups.concat().parse().ok();
    }

    trimmed
        .strip_suffix(".0")
        .and_then(|integer| integer.parse().ok())
}

/// Stacks frames on the union of their columns (first-seen order), filling columns a
/// frame lacks with nulls. Every row of every frame is kept.
pub fn stack_frames(frames: Vec<DataFrame>) -> PolarsResult<DataFrame> {
    let mut names: Vec<PlSmallStr> = Vec::new();
    let mut dtypes: HashMap<PlSmallStr, DataType> = HashMap::new();

    for frame in &frames {
        for column in frame.get_columns() {
            if !dtypes.contains_key(column.name()) {
                names.push(column.name().clone());
                dtypes.insert(column.name().clone(), column.dtype().clone());
            }
        }
    }

    let mut combined: Option<DataFrame> = None;
    for mut frame in frames {
        let height = frame.height();
        for name in &names {
            if frame.column(name.as_str()).is_err() {
                let dtype = dtypes.get(name).cloned().unwrap_or(DataType::String);
                frame.with_column(Series::full_null(name.clone(), height, &dtype))?;
            }
        }
        let aligned = frame.select(names.iter().cloned())?;
        match combined.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&aligned)?;
            }
            None => combined = Some(aligned),
        }
    }

    Ok(combined.unwrap_or_default())
}

fn compute_hash(contents: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(contents);
    let hash = hasher.finalize();
    hash.to_hex().to_string()
}
