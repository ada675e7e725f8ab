use std::collections::HashMap;

use polars::prelude::{DataFrame, PolarsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("columns '{first}' and '{second}' both normalize to '{normalized}'")]
    Collision {
        first: String,
        second: String,
        normalized: String,
    },
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Trims, lowercases and joins internal whitespace runs with a single underscore.
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Renames every column of `df` to its normalized label. Row data is untouched.
pub fn normalize_columns(df: &mut DataFrame) -> Result<(), NormalizeError> {
    let originals: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut seen: HashMap<String, &str> = HashMap::with_capacity(originals.len());
    let mut normalized = Vec::with_capacity(originals.len());

    for original in &originals {
        let label = normalize_column_name(original);
        if let Some(first) = seen.get(&label) {
            return Err(NormalizeError::Collision {
                first: first.to_string(),
                second: original.clone(),
                normalized: label,
            });
        }
        seen.insert(label.clone(), original);
        normalized.push(label);
    }

    df.set_column_names(normalized)?;
    Ok(())
}
