use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dataroad_parser::RowPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{POPULATION_COLUMN, TOTAL_VEHICLES_COLUMN};

pub const DEFAULT_RAW_ROOT: &str = "data/raw";
pub const DEFAULT_OUTPUT_PATH: &str = "data/processed/base_analitica.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown environment '{0}' (expected dev or prod)")]
    UnknownEnvironment(String),
    #[error("unknown read policy '{0}' (expected tolerant or strict)")]
    UnknownReadPolicy(String),
}

/// Selects the `data/raw/<env>` input directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(ConfigError::UnknownEnvironment(value.to_string())),
        }
    }
}

/// How the loader reacts to malformed rows and unreadable files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPolicy {
    /// Skip and count malformed rows, report failed files, keep going.
    #[default]
    Tolerant,
    /// The first malformed row or failed file aborts the run.
    Strict,
}

impl ReadPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPolicy::Tolerant => "tolerant",
            ReadPolicy::Strict => "strict",
        }
    }

    pub fn row_policy(&self) -> RowPolicy {
        match self {
            ReadPolicy::Tolerant => RowPolicy::Skip,
            ReadPolicy::Strict => RowPolicy::Reject,
        }
    }
}

impl fmt::Display for ReadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tolerant" => Ok(ReadPolicy::Tolerant),
            "strict" => Ok(ReadPolicy::Strict),
            _ => Err(ConfigError::UnknownReadPolicy(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Fleet,
    Population,
    Mortality,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Fleet,
        SourceKind::Population,
        SourceKind::Mortality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Fleet => "fleet",
            SourceKind::Population => "population",
            SourceKind::Mortality => "mortality",
        }
    }

    /// Fleet and population must be present for a run to produce output.
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, SourceKind::Mortality)
    }

    /// Canonical name of the numeric column the source contributes, if any.
    pub fn value_column(&self) -> Option<&'static str> {
        match self {
            SourceKind::Fleet => Some(TOTAL_VEHICLES_COLUMN),
            SourceKind::Population => Some(POPULATION_COLUMN),
            SourceKind::Mortality => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSource {
    pub pattern: String,
    pub key_columns: Vec<String>,
    pub total_columns: Vec<String>,
}

impl Default for FleetSource {
    fn default() -> Self {
        Self {
            pattern: "Frota de veículos - Mensal - *.csv".to_string(),
            key_columns: strings(&[
                "cod_municipio",
                "codigo_municipio",
                "código_município",
                "codigo_ibge",
                "código_ibge",
            ]),
            total_columns: strings(&["total_veiculos", "total"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationSource {
    pub pattern: String,
    pub key_columns: Vec<String>,
    pub population_columns: Vec<String>,
}

impl Default for PopulationSource {
    fn default() -> Self {
        Self {
            pattern: "ibge_population/*.csv".to_string(),
            key_columns: strings(&["cod_municipio", "d3c", "codigo_municipio", "código_município"]),
            population_columns: strings(&["populacao", "v"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MortalitySource {
    pub pattern: String,
    pub key_columns: Vec<String>,
    /// CID-10 underlying cause; rows outside V01-V99 are dropped when present.
    pub cause_column: String,
    pub year_column: String,
    /// Date of death as `ddmmyyyy`, used when `year_column` is absent.
    pub date_column: String,
}

impl Default for MortalitySource {
    fn default() -> Self {
        Self {
            pattern: "datasus_sim/*.csv".to_string(),
            key_columns: strings(&["cod_municipio", "codmunres"]),
            cause_column: "causabas".to_string(),
            year_column: "ano".to_string(),
            date_column: "dtobito".to_string(),
        }
    }
}

/// Source settings the loader needs, independent of the source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub kind: SourceKind,
    pub pattern: String,
    pub key_columns: Vec<String>,
    /// Candidates for `kind.value_column()`; empty when the source has none.
    pub value_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_root: PathBuf,
    pub environment: Environment,
    pub output_path: PathBuf,
    pub read_policy: ReadPolicy,
    pub write_manifest: bool,
    pub fleet: FleetSource,
    pub population: PopulationSource,
    pub mortality: MortalitySource,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_root: PathBuf::from(DEFAULT_RAW_ROOT),
            environment: Environment::default(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            read_policy: ReadPolicy::default(),
            write_manifest: true,
            fleet: FleetSource::default(),
            population: PopulationSource::default(),
            mortality: MortalitySource::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `DATAROAD_ENV` (or `ENV`), `DATAROAD_RAW_ROOT` and `DATAROAD_OUTPUT`
    /// as read through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("DATAROAD_ENV").or_else(|| lookup("ENV")) {
            self.environment = env.parse()?;
        }
        if let Some(root) = lookup("DATAROAD_RAW_ROOT") {
            self.raw_root = PathBuf::from(root);
        }
        if let Some(output) = lookup("DATAROAD_OUTPUT") {
            self.output_path = PathBuf::from(output);
        }
        Ok(self)
    }

    pub fn input_dir(&self) -> PathBuf {
        self.raw_root.join(self.environment.as_str())
    }

    /// `base_analitica.csv` -> `base_analitica.manifest.json`.
    pub fn manifest_path(&self) -> PathBuf {
        self.output_path.with_extension("manifest.json")
    }

    pub fn source_spec(&self, kind: SourceKind) -> SourceSpec {
        match kind {
            SourceKind::Fleet => SourceSpec {
                kind,
                pattern: self.fleet.pattern.clone(),
                key_columns: self.fleet.key_columns.clone(),
                value_columns: self.fleet.total_columns.clone(),
            },
            SourceKind::Population => SourceSpec {
                kind,
                pattern: self.population.pattern.clone(),
                key_columns: self.population.key_columns.clone(),
                value_columns: self.population.population_columns.clone(),
            },
            SourceKind::Mortality => SourceSpec {
                kind,
                pattern: self.mortality.pattern.clone(),
                key_columns: self.mortality.key_columns.clone(),
                value_columns: Vec::new(),
            },
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_follow_directory_convention() {
        let config = PipelineConfig::default();
        assert_eq!(config.environment, Environment::Dev);
        assert_eq!(config.input_dir(), PathBuf::from("data/raw/dev"));
        assert_eq!(
            config.manifest_path(),
            PathBuf::from("data/processed/base_analitica.manifest.json")
        );
        assert_eq!(config.read_policy, ReadPolicy::Tolerant);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_fields() {
        let config = PipelineConfig::from_toml_str(
            r#"
                environment = "prod"
                read_policy = "strict"

                [fleet]
                pattern = "frota/*.csv"
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.environment, Environment::Prod);
        assert_eq!(config.read_policy, ReadPolicy::Strict);
        assert_eq!(config.fleet.pattern, "frota/*.csv");
        assert_eq!(config.fleet.total_columns, FleetSource::default().total_columns);
        assert_eq!(config.population, PopulationSource::default());
        assert_eq!(config.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
    }

    #[test]
    fn unknown_environment_in_toml_is_rejected() {
        assert!(PipelineConfig::from_toml_str("environment = \"staging\"").is_err());
    }

    #[test]
    fn environment_variables_override_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ENV", "prod"),
            ("DATAROAD_RAW_ROOT", "/srv/raw"),
        ]);
        let config = PipelineConfig::default()
            .apply_env(|key| vars.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.environment, Environment::Prod);
        assert_eq!(config.input_dir(), PathBuf::from("/srv/raw/prod"));
        assert_eq!(config.output_path, PathBuf::from(DEFAULT_OUTPUT_PATH));
    }

    #[test]
    fn dataroad_env_wins_over_generic_env() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("ENV", "prod"), ("DATAROAD_ENV", "dev")]);
        let config = PipelineConfig::default()
            .apply_env(|key| vars.get(key).map(|value| value.to_string()))
            .unwrap();
        assert_eq!(config.environment, Environment::Dev);
    }

    #[test]
    fn invalid_environment_variable_is_an_error() {
        let result = PipelineConfig::default().apply_env(|key| {
            (key == "DATAROAD_ENV").then(|| "qa".to_string())
        });
        assert!(matches!(result, Err(ConfigError::UnknownEnvironment(_))));
    }

    #[test]
    fn mortality_has_no_value_column() {
        let spec = PipelineConfig::default().source_spec(SourceKind::Mortality);
        assert!(spec.value_columns.is_empty());
        assert_eq!(SourceKind::Mortality.value_column(), None);
        assert!(!SourceKind::Mortality.is_mandatory());
        assert!(SourceKind::Fleet.is_mandatory());
        assert!(SourceKind::Population.is_mandatory());
    }
}
