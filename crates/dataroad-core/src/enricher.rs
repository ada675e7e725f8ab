use std::collections::HashMap;

use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::mortality::MortalityAggregate;
use crate::schema::{TRANSPORT_DEATHS_COLUMN, YEAR_COLUMN};
use crate::types::Year;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("polars operation failed: {0}")]
    Polars(#[from] PolarsError),
    #[error("{table} table has no '{column}' column")]
    MissingColumn {
        table: &'static str,
        column: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    pub left_rows: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    /// Right-side rows ignored because an earlier row had the same key.
    pub duplicate_keys: usize,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub df: DataFrame,
    pub stats: JoinStats,
    /// Right-side columns that were suffixed to avoid a name collision.
    pub renamed: Vec<String>,
    /// `(right column, output column)` for every carried column.
    pub carried: Vec<(String, String)>,
}

impl JoinOutcome {
    /// Output name of a right-side column, after any suffixing.
    pub fn output_name(&self, right_column: &str) -> Option<&str> {
        self.carried
            .iter()
            .find(|(original, _)| original == right_column)
            .map(|(_, output)| output.as_str())
    }
}

/// Left joins `right` onto `left` on `key`. Every left row is kept in order and
/// matched at most once; the first right row wins for duplicated keys.
pub fn left_join_on_key(
    left: &DataFrame,
    right: &DataFrame,
    key: &str,
    suffix: &str,
) -> Result<JoinOutcome, EnrichmentError> {
    let left_keys = key_column(left, key, "left")?;
    let right_keys = key_column(right, key, "right")?;

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(right.height());
    let mut duplicate_keys = 0;
    for (row, value) in right_keys.into_iter().enumerate() {
        let Some(value) = value else { continue };
        if index.contains_key(value) {
            duplicate_keys += 1;
        } else {
            index.insert(value, row);
        }
    }
    if duplicate_keys > 0 {
        warn!(
            key,
            duplicates = duplicate_keys,
            "duplicate keys on the right side of the join, first occurrence kept"
        );
    }

    let positions: Vec<Option<usize>> = left_keys
        .into_iter()
        .map(|value| value.and_then(|value| index.get(value).copied()))
        .collect();
    let matched_rows = positions.iter().filter(|position| position.is_some()).count();

    let mut df = left.clone();
    let mut renamed = Vec::new();
    let mut carried: Vec<(String, String)> = Vec::with_capacity(right.width().saturating_sub(1));
    let mut gathered = Vec::with_capacity(right.width().saturating_sub(1));

    for column in right.get_columns() {
        if column.name().as_str() == key {
            continue;
        }
        let original = column.name().to_string();
        let mut name = original.clone();
        // suffix until the name is free on both sides
        while left.column(&name).is_ok() || carried.iter().any(|(_, taken)| *taken == name) {
            name = format!("{name}{suffix}");
        }
        if name != original {
            renamed.push(name.clone());
        }
        gathered.push(gather(column, &positions, &name)?);
        carried.push((original, name));
    }
    df.hstack_mut(&gathered)?;

    let stats = JoinStats {
        left_rows: left.height(),
        matched_rows,
        unmatched_rows: left.height() - matched_rows,
        duplicate_keys,
    };

    Ok(JoinOutcome {
        df,
        stats,
        renamed,
        carried,
    })
}

/// Adds [`TRANSPORT_DEATHS_COLUMN`]; rows with no aggregate entry stay null.
pub fn attach_transport_deaths(
    df: &DataFrame,
    key: &str,
    aggregate: &MortalityAggregate,
) -> Result<(DataFrame, JoinStats), EnrichmentError> {
    let keys = key_column(df, key, "fleet")?;
    let years: Option<Vec<Option<i32>>> = if aggregate.by_year {
        let column = df
            .column(YEAR_COLUMN)
            .map_err(|_| EnrichmentError::MissingColumn {
                table: "fleet",
                column: YEAR_COLUMN.to_string(),
            })?
            .cast(&DataType::String)?;
        Some(
            column
                .str()?
                .into_iter()
                .map(|value| value.and_then(|raw| Year::parse(raw).ok()).map(|year| year.0))
                .collect(),
        )
    } else {
        None
    };

    let deaths: Vec<Option<i64>> = keys
        .into_iter()
        .enumerate()
        .map(|(row, code)| {
            let year = years.as_ref().and_then(|years| years[row]);
            code.and_then(|code| aggregate.deaths(code, year))
        })
        .collect();

    let matched_rows = deaths.iter().filter(|value| value.is_some()).count();
    let stats = JoinStats {
        left_rows: df.height(),
        matched_rows,
        unmatched_rows: df.height() - matched_rows,
        duplicate_keys: 0,
    };

    let mut df = df.clone();
    df.with_column(Series::new(TRANSPORT_DEATHS_COLUMN.into(), deaths))?;
    Ok((df, stats))
}

fn key_column<'a>(
    df: &'a DataFrame,
    key: &str,
    table: &'static str,
) -> Result<&'a StringChunked, EnrichmentError> {
    let column = df.column(key).map_err(|_| EnrichmentError::MissingColumn {
        table,
        column: key.to_string(),
    })?;
    Ok(column.str()?)
}

fn gather(column: &Column, positions: &[Option<usize>], name: &str) -> PolarsResult<Column> {
    let series = match column.dtype() {
        DataType::Int64 => {
            let values = column.i64()?;
            let picked: Vec<Option<i64>> = positions
                .iter()
                .map(|position| position.and_then(|row| values.get(row)))
                .collect();
            Series::new(name.into(), picked)
        }
        DataType::Float64 => {
            let values = column.f64()?;
            let picked: Vec<Option<f64>> = positions
                .iter()
                .map(|position| position.and_then(|row| values.get(row)))
                .collect();
            Series::new(name.into(), picked)
        }
        _ => {
            let as_text = column.cast(&DataType::String)?;
            let values = as_text.str()?;
            let picked: Vec<Option<&str>> = positions
                .iter()
                .map(|position| position.and_then(|row| values.get(row)))
                .collect();
            Series::new(name.into(), picked)
        }
    };
    Ok(series.into())
}
