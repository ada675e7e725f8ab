use std::borrow::Cow;

use csv::{ReaderBuilder, StringRecord};
use polars::prelude::*;

use crate::errors::{ParserError, RowIssue};
use crate::model::{ParsedTable, RowPolicy, TextEncoding};
use crate::sniff::sniff_delimiter;

const UTF8_BOM: char = '\u{feff}';

/// Decodes raw bytes as UTF-8, falling back to Latin-1 when they are not valid UTF-8.
pub fn decode_text(bytes: &[u8]) -> (Cow<'_, str>, TextEncoding) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (
            Cow::Borrowed(text.strip_prefix(UTF8_BOM).unwrap_or(text)),
            TextEncoding::Utf8,
        ),
        Err(_) => (
            Cow::Owned(bytes.iter().map(|&byte| char::from(byte)).collect()),
            TextEncoding::Latin1,
        ),
    }
}

/// Reads a delimited file with a header row into a frame of nullable `String` columns.
///
/// Rows whose field count differs from the header are either recorded as [`RowIssue`]s
/// and dropped (`RowPolicy::Skip`) or fail the whole read (`RowPolicy::Reject`).
pub fn read_delimited(bytes: &[u8], policy: RowPolicy) -> Result<ParsedTable, ParserError> {
    let (text, encoding) = decode_text(bytes);
    let Some(header_line) = text.lines().find(|line| !line.trim().is_empty()) else {
        return Err(ParserError::EmptyInput);
    };
    let delimiter = sniff_delimiter(header_line);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = header_names(reader.headers()?)?;
    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    let mut row_lines = Vec::new();
    let mut issues = Vec::new();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|pos| pos.line()).unwrap_or_default();
                handle_issue(policy, &mut issues, RowIssue::new(line, err.to_string()))?;
                continue;
            }
        };

        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        if record.len() != headers.len() {
            let message = format!(
                "expected {} fields, found {}",
                headers.len(),
                record.len()
            );
            handle_issue(policy, &mut issues, RowIssue::new(line, message))?;
            continue;
        }

        row_lines.push(line);
        for (column, field) in values.iter_mut().zip(record.iter()) {
            if field.trim().is_empty() {
                column.push(None);
            } else {
                column.push(Some(field.to_string()));
            }
        }
    }

    let columns: Vec<Column> = headers
        .iter()
        .zip(values)
        .map(|(name, column)| Series::new(name.as_str().into(), column).into())
        .collect();

    Ok(ParsedTable {
        df: DataFrame::new(columns)?,
        delimiter,
        encoding,
        row_lines,
        issues,
    })
}

fn header_names(record: &StringRecord) -> Result<Vec<String>, ParserError> {
    if record.is_empty() {
        return Err(ParserError::EmptyInput);
    }

    let mut names: Vec<String> = Vec::with_capacity(record.len());
    for (idx, raw) in record.iter().enumerate() {
        let name = if raw.trim().is_empty() {
            format!("column_{}", idx + 1)
        } else {
            raw.to_string()
        };
        if names.contains(&name) {
            return Err(ParserError::InvalidHeader {
                index: idx + 1,
                message: format!("duplicate column name '{name}'"),
            });
        }
        names.push(name);
    }
    Ok(names)
}

fn handle_issue(
    policy: RowPolicy,
    issues: &mut Vec<RowIssue>,
    issue: RowIssue,
) -> Result<(), ParserError> {
    match policy {
        RowPolicy::Skip => {
            issues.push(issue);
            Ok(())
        }
        RowPolicy::Reject => Err(ParserError::DataRow {
            line: issue.line,
            message: issue.message,
        }),
    }
}
