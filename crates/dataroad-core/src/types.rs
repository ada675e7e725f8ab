use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("municipality code is missing")]
    Missing,
    #[error("municipality code '{0}' must contain only digits")]
    NonNumeric(String),
    #[error("'{0}' is not a four-digit year")]
    InvalidYear(String),
}

/// Municipality identifier in canonical form: a non-empty run of digits.
///
/// IBGE publishes seven-digit codes (six digits plus a check digit) while DATASUS
/// uses the six-digit prefix. Seven-digit codes lose the check digit so both parse
/// to the same value; other lengths are kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MunicipalityCode(String);

impl MunicipalityCode {
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let trimmed = raw.trim();
        // spreadsheet exports sometimes write integer codes as floats
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(KeyError::Missing);
        }
        if !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(KeyError::NonNumeric(trimmed.to_string()));
        }
        if digits.len() == 7 {
            return Ok(Self(digits[..6].to_string()));
        }
        Ok(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for MunicipalityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MunicipalityCode {
    type Err = KeyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Year(pub i32);

impl Year {
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        if digits.len() != 4 || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(KeyError::InvalidYear(trimmed.to_string()));
        }
        digits
            .parse()
            .map(Year)
            .map_err(|_| KeyError::InvalidYear(trimmed.to_string()))
    }

    /// Year of a `ddmmyyyy` date as written in SIM death records.
    /// Dates that lost their leading zero (`1012021`) are padded back.
    pub fn from_ddmmyyyy(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let padded = format!("{trimmed:0>8}");
        NaiveDate::parse_from_str(&padded, "%d%m%Y")
            .ok()
            .map(|date| Year(date.year()))
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
