use std::collections::HashMap;

use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MortalitySource;
use crate::normalize::normalize_column_name;
use crate::schema::KEY_COLUMN;
use crate::types::Year;

/// CID-10 chapter XX transport accidents: `V` followed by two digits (V01-V99).
pub fn is_transport_cause(cause: &str) -> bool {
    let mut chars = cause.trim().chars();
    matches!(chars.next(), Some('V') | Some('v'))
        && chars.next().is_some_and(|ch| ch.is_ascii_digit())
        && chars.next().is_some_and(|ch| ch.is_ascii_digit())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MortalitySummary {
    pub records: usize,
    pub transport_records: usize,
    pub excluded_by_cause: usize,
    pub rows_without_year: usize,
    pub keys: usize,
    pub by_year: bool,
}

/// Transport deaths counted per municipality, or per (municipality, year).
#[derive(Debug, Clone)]
pub struct MortalityAggregate {
    pub by_year: bool,
    pub counts: HashMap<(String, Option<i32>), i64>,
    pub summary: MortalitySummary,
}

impl MortalityAggregate {
    pub fn deaths(&self, code: &str, year: Option<i32>) -> Option<i64> {
        let year = if self.by_year { Some(year?) } else { None };
        self.counts.get(&(code.to_string(), year)).copied()
    }
}

/// Whether a year can be derived for mortality rows, either directly or from the
/// date of death.
pub fn has_year_information(df: &DataFrame, source: &MortalitySource) -> bool {
    df.column(&normalize_column_name(&source.year_column)).is_ok()
        || df.column(&normalize_column_name(&source.date_column)).is_ok()
}

pub fn aggregate_transport_deaths(
    df: &DataFrame,
    source: &MortalitySource,
    by_year: bool,
) -> PolarsResult<MortalityAggregate> {
    let keys = df.column(KEY_COLUMN)?.str()?;
    let causes = optional_str_column(df, &source.cause_column)?;
    let years = optional_str_column(df, &source.year_column)?;
    let dates = optional_str_column(df, &source.date_column)?;

    if causes.is_none() {
        warn!(
            column = %source.cause_column,
            "mortality records have no cause column, assuming they are pre-filtered"
        );
    }

    let mut summary = MortalitySummary {
        records: df.height(),
        by_year,
        ..MortalitySummary::default()
    };
    let mut counts: HashMap<(String, Option<i32>), i64> = HashMap::new();

    for idx in 0..df.height() {
        if let Some(causes) = &causes {
            if !causes.get(idx).is_some_and(is_transport_cause) {
                summary.excluded_by_cause += 1;
                continue;
            }
        }
        summary.transport_records += 1;

        let Some(code) = keys.get(idx) else {
            continue;
        };

        let year = if by_year {
            let year = years
                .as_ref()
                .and_then(|years| years.get(idx))
                .and_then(|raw| Year::parse(raw).ok())
                .or_else(|| {
                    dates
                        .as_ref()
                        .and_then(|dates| dates.get(idx))
                        .and_then(Year::from_ddmmyyyy)
                });
            match year {
                Some(year) => Some(year.0),
                None => {
                    summary.rows_without_year += 1;
                    continue;
                }
            }
        } else {
            None
        };

        *counts.entry((code.to_string(), year)).or_insert(0) += 1;
    }

    summary.keys = counts.len();
    if summary.rows_without_year > 0 {
        warn!(
            rows = summary.rows_without_year,
            "transport deaths without a derivable year were not aggregated"
        );
    }
    info!(
        records = summary.records,
        transport_records = summary.transport_records,
        keys = summary.keys,
        by_year,
        "mortality aggregated"
    );

    Ok(MortalityAggregate {
        by_year,
        counts,
        summary,
    })
}

fn optional_str_column(df: &DataFrame, configured: &str) -> PolarsResult<Option<StringChunked>> {
    let name = normalize_column_name(configured);
    match df.column(&name) {
        Ok(column) => {
            let column = column.cast(&DataType::String)?;
            Ok(Some(column.str()?.clone()))
        }
        Err(_) => Ok(None),
    }
}
