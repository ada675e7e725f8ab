use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use dataroad_parser::{read_delimited, ParserError, RowPolicy};
use polars::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::ingestion::parse_count;
use crate::schema::{
    KEY_COLUMN, PER_CAPITA_COLUMN, POPULATION_COLUMN, STATE_COLUMN, TOTAL_VEHICLES_COLUMN,
    YEAR_COLUMN,
};

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error("analytic table has no '{0}' column")]
    MissingColumn(String),
    #[error("no rows for year {0}")]
    NoRows(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSummary {
    pub uf: String,
    pub rows: usize,
    pub municipalities: usize,
    /// Mean over rows with a defined per-capita value.
    pub mean_per_capita: Option<f64>,
    pub total_vehicles: i64,
    /// Each municipality counted once, however many fleet rows it has.
    pub population: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSummary {
    pub year: String,
    pub states: Vec<StateSummary>,
}

#[derive(Default)]
struct Accumulator {
    rows: usize,
    per_capita_sum: f64,
    per_capita_rows: usize,
    total_vehicles: i64,
    population: i64,
    municipalities: HashSet<String>,
    populated: HashSet<String>,
}

/// Mean fleet per capita by state for one year of the analytic table; the latest
/// year present when `year` is `None`.
pub fn summarize_table(df: &DataFrame, year: Option<&str>) -> Result<YearSummary, SummaryError> {
    let keys = text_column(df, KEY_COLUMN)?;
    let years = text_column(df, YEAR_COLUMN)?;
    let states = text_column(df, STATE_COLUMN)?;
    let per_capita = text_column(df, PER_CAPITA_COLUMN)?;
    let totals = text_column(df, TOTAL_VEHICLES_COLUMN)?;
    let population = text_column(df, POPULATION_COLUMN)?;

    let selected = match year {
        Some(year) => year.trim().to_string(),
        None => latest_year(&years).ok_or_else(|| SummaryError::NoRows("any".to_string()))?,
    };

    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
    for idx in 0..df.height() {
        if years.get(idx).map(str::trim) != Some(selected.as_str()) {
            continue;
        }
        let state = states.get(idx).unwrap_or_default().trim().to_string();
        let entry = groups.entry(state).or_default();
        entry.rows += 1;
        if let Some(value) = per_capita.get(idx).and_then(|raw| raw.trim().parse::<f64>().ok()) {
            if value.is_finite() {
                entry.per_capita_sum += value;
                entry.per_capita_rows += 1;
            }
        }
        entry.total_vehicles += totals.get(idx).and_then(parse_count).unwrap_or(0);

        let Some(code) = keys.get(idx).map(str::trim) else {
            continue;
        };
        entry.municipalities.insert(code.to_string());
        if let Some(value) = population.get(idx).and_then(parse_count) {
            if entry.populated.insert(code.to_string()) {
                entry.population += value;
            }
        }
    }

    if groups.is_empty() {
        return Err(SummaryError::NoRows(selected));
    }

    let states = groups
        .into_iter()
        .map(|(uf, acc)| StateSummary {
            uf,
            rows: acc.rows,
            municipalities: acc.municipalities.len(),
            mean_per_capita: (acc.per_capita_rows > 0)
                .then(|| acc.per_capita_sum / acc.per_capita_rows as f64),
            total_vehicles: acc.total_vehicles,
            population: acc.population,
        })
        .collect();

    Ok(YearSummary {
        year: selected,
        states,
    })
}

pub fn summarize_file(path: &Path, year: Option<&str>) -> Result<YearSummary, SummaryError> {
    let contents = fs::read(path).map_err(|source| SummaryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed = read_delimited(&contents, RowPolicy::Skip)?;
    summarize_table(&parsed.df, year)
}

fn text_column(df: &DataFrame, name: &str) -> Result<StringChunked, SummaryError> {
    let column = df
        .column(name)
        .map_err(|_| SummaryError::MissingColumn(name.to_string()))?
        .cast(&DataType::String)?;
    Ok(column.str()?.clone())
}

/// Numerically largest year, falling back to text order for non-numeric labels.
fn latest_year(years: &StringChunked) -> Option<String> {
    years
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|year| !year.is_empty())
        .max_by_key(|year| (year.parse::<i64>().ok(), year.to_string()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PolarsResult<DataFrame> {
        df!(
            "cod_municipio" => &["355030", "355030", "350950", "330455", "330490"],
            "ano" => &["2022", "2023", "2023", "2023", "2023"],
            "uf" => &["SP", "SP", "SP", "RJ", "RJ"],
            "frota_per_capita" => &[Some("0.9"), Some("0.5"), Some("0.7"), Some("0.4"), None],
            "total_veiculos" => &["9", "5", "7", "4", "3"],
            "populacao" => &[Some("10"), Some("10"), Some("10"), Some("10"), None],
        )
    }

    #[test]
    fn defaults_to_latest_year_grouped_by_state() -> Result<(), SummaryError> {
        let summary = summarize_table(&table()?, None)?;

        assert_eq!(summary.year, "2023");
        let states: Vec<&str> = summary.states.iter().map(|state| state.uf.as_str()).collect();
        assert_eq!(states, vec!["RJ", "SP"]);

        let rj = &summary.states[0];
        assert_eq!(rj.rows, 2);
        assert_eq!(rj.municipalities, 2);
        assert_eq!(rj.mean_per_capita, Some(0.4));
        assert_eq!(rj.total_vehicles, 7);
        assert_eq!(rj.population, 10);

        let sp = &summary.states[1];
        let mean = sp.mean_per_capita.unwrap();
        assert!((mean - 0.6).abs() < 1e-9);
        assert_eq!(sp.population, 20);
        Ok(())
    }

    #[test]
    fn population_counts_each_municipality_once() -> Result<(), SummaryError> {
        let df = df!(
            "cod_municipio" => &["355030", "355030", "355030", "350950"],
            "ano" => &["2023", "2023", "2023", "2023"],
            "uf" => &["SP", "SP", "SP", "SP"],
            "frota_per_capita" => &["0.1", "0.2", "0.3", "0.5"],
            "total_veiculos" => &["100", "200", "300", "50"],
            "populacao" => &["1000", "1000", "1000", "100"],
        )?;

        let summary = summarize_table(&df, Some("2023"))?;

        let sp = &summary.states[0];
        assert_eq!(sp.rows, 4);
        assert_eq!(sp.municipalities, 2);
        assert_eq!(sp.population, 1100);
        assert_eq!(sp.total_vehicles, 650);
        Ok(())
    }

    #[test]
    fn explicit_year_without_rows_is_an_error() -> Result<(), SummaryError> {
        assert!(matches!(
            summarize_table(&table()?, Some("1999")),
            Err(SummaryError::NoRows(year)) if year == "1999"
        ));
        Ok(())
    }

    #[test]
    fn missing_dashboard_column_is_an_error() -> Result<(), SummaryError> {
        let df = table()?.drop("uf")?;
        assert!(matches!(
            summarize_table(&df, None),
            Err(SummaryError::MissingColumn(column)) if column == "uf"
        ));
        Ok(())
    }
}
