use std::path::PathBuf;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    calculator,
    config::{Environment, MortalitySource, PipelineConfig, ReadPolicy, SourceKind},
    enricher::{self, JoinStats},
    error::{PipelineError, Result},
    ingestion::{self, FileReport, SourceLoad},
    mortality::{self, MortalitySummary},
    outputs,
    schema::{
        DASHBOARD_COLUMNS, KEY_COLUMN, PER_CAPITA_COLUMN, POPULATION_COLUMN, POPULATION_SUFFIX,
        TOTAL_VEHICLES_COLUMN, YEAR_COLUMN,
    },
};

#[derive(Debug, Clone, Serialize)]
pub struct SourceManifest {
    pub kind: SourceKind,
    pub pattern: String,
    pub absent: bool,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
    pub failed_files: usize,
    pub files: Vec<FileReport>,
}

impl SourceManifest {
    fn from_load(load: &SourceLoad, pattern: &str) -> Self {
        Self {
            kind: load.kind,
            pattern: pattern.to_string(),
            absent: load.is_absent(),
            rows_loaded: load.rows_loaded(),
            rows_skipped: load.rows_skipped(),
            failed_files: load.failed_files(),
            files: load.reports.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MortalityManifest {
    pub aggregation: MortalitySummary,
    pub join: JoinStats,
}

/// What a run read and produced. Serialized as the run manifest; it holds no
/// timestamps so identical inputs give an identical manifest.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub environment: Environment,
    pub read_policy: ReadPolicy,
    pub input_dir: String,
    pub output_path: String,
    pub sources: Vec<SourceManifest>,
    pub population_join: JoinStats,
    pub renamed_columns: Vec<String>,
    pub mortality: Option<MortalityManifest>,
    pub per_capita_missing: usize,
    pub output_rows: usize,
    pub columns: Vec<String>,
    pub missing_dashboard_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AnalyticTable {
    pub df: DataFrame,
    pub population_join: JoinStats,
    pub renamed_columns: Vec<String>,
    pub mortality: Option<MortalityManifest>,
    pub per_capita_missing: usize,
}

/// Joins population (and transport deaths, when present) onto the fleet table and
/// derives `frota_per_capita`. The result has exactly one row per fleet row.
pub fn build_analytic_table(
    fleet: &DataFrame,
    population: &DataFrame,
    mortality: Option<(&DataFrame, &MortalitySource)>,
) -> Result<AnalyticTable> {
    let joined = enricher::left_join_on_key(fleet, population, KEY_COLUMN, POPULATION_SUFFIX)?;
    info!(
        rows = joined.stats.left_rows,
        matched = joined.stats.matched_rows,
        unmatched = joined.stats.unmatched_rows,
        "population joined"
    );
    if joined.stats.unmatched_rows > 0 {
        warn!(
            rows = joined.stats.unmatched_rows,
            "fleet rows without a population match keep null population"
        );
    }

    let population_column = joined
        .output_name(POPULATION_COLUMN)
        .unwrap_or(POPULATION_COLUMN)
        .to_string();

    let mut df = joined.df;
    let mut mortality_manifest = None;

    if let Some((records, source)) = mortality {
        let by_year = fleet.column(YEAR_COLUMN).is_ok()
            && mortality::has_year_information(records, source);
        let aggregate = mortality::aggregate_transport_deaths(records, source, by_year)?;
        let (with_deaths, join) = enricher::attach_transport_deaths(&df, KEY_COLUMN, &aggregate)?;
        info!(
            matched = join.matched_rows,
            unmatched = join.unmatched_rows,
            by_year,
            "transport deaths joined"
        );
        df = with_deaths;
        mortality_manifest = Some(MortalityManifest {
            aggregation: aggregate.summary,
            join,
        });
    }

    let df = calculator::apply_fleet_per_capita(&df, TOTAL_VEHICLES_COLUMN, &population_column)?;
    let per_capita_missing = df.column(PER_CAPITA_COLUMN)?.null_count();
    info!(
        rows = df.height(),
        missing = per_capita_missing,
        "fleet per capita computed"
    );

    Ok(AnalyticTable {
        df,
        population_join: joined.stats,
        renamed_columns: joined.renamed,
        mortality: mortality_manifest,
        per_capita_missing,
    })
}

/// Loads every source, builds the analytic table and writes it (plus the manifest)
/// to the configured output path. Both files are staged before either is renamed
/// into place, so the table is not replaced when a fatal error occurs.
pub fn run(config: &PipelineConfig) -> Result<PipelineSummary> {
    let input_dir = config.input_dir();
    info!(
        environment = %config.environment,
        input_dir = %input_dir.display(),
        read_policy = %config.read_policy,
        "pipeline run started"
    );

    let fleet_spec = config.source_spec(SourceKind::Fleet);
    let population_spec = config.source_spec(SourceKind::Population);
    let mortality_spec = config.source_spec(SourceKind::Mortality);

    let fleet = ingestion::load_source(&input_dir, &fleet_spec, config.read_policy)?;
    let population = ingestion::load_source(&input_dir, &population_spec, config.read_policy)?;
    let mortality = ingestion::load_source(&input_dir, &mortality_spec, config.read_policy)?;

    let Some(fleet_table) = fleet.table.as_ref() else {
        return Err(PipelineError::MissingInput {
            kind: SourceKind::Fleet,
            directory: input_dir,
            pattern: fleet_spec.pattern,
        });
    };
    let Some(population_table) = population.table.as_ref() else {
        return Err(PipelineError::MissingInput {
            kind: SourceKind::Population,
            directory: input_dir,
            pattern: population_spec.pattern,
        });
    };
    let mortality_input = mortality
        .table
        .as_ref()
        .map(|table| (table, &config.mortality));

    let AnalyticTable {
        mut df,
        population_join,
        renamed_columns,
        mortality: mortality_manifest,
        per_capita_missing,
    } = build_analytic_table(fleet_table, population_table, mortality_input)?;

    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let missing_dashboard_columns: Vec<String> = DASHBOARD_COLUMNS
        .iter()
        .filter(|column| !columns.iter().any(|name| name.as_str() == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing_dashboard_columns.is_empty() {
        warn!(
            missing = ?missing_dashboard_columns,
            "output lacks columns the dashboard reads"
        );
    }

    let staged_table = outputs::stage_table(&mut df, &config.output_path)?;

    let summary = PipelineSummary {
        environment: config.environment,
        read_policy: config.read_policy,
        input_dir: input_dir.display().to_string(),
        output_path: config.output_path.display().to_string(),
        sources: vec![
            SourceManifest::from_load(&fleet, &fleet_spec.pattern),
            SourceManifest::from_load(&population, &population_spec.pattern),
            SourceManifest::from_load(&mortality, &mortality_spec.pattern),
        ],
        population_join,
        renamed_columns,
        mortality: mortality_manifest,
        per_capita_missing,
        output_rows: df.height(),
        columns,
        missing_dashboard_columns,
    };

    // manifest first, the table is only replaced once everything else is in place
    let mut staged = Vec::with_capacity(2);
    if config.write_manifest {
        staged.push(outputs::stage_manifest(&summary, &config.manifest_path())?);
    }
    staged.push(staged_table);
    outputs::commit_all(staged)?;

    info!(
        rows = summary.output_rows,
        output = %summary.output_path,
        "pipeline run finished"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredSource {
    pub kind: SourceKind,
    pub pattern: String,
    pub files: Vec<PathBuf>,
}

/// Lists the files each source would read, without opening them.
pub fn discover(config: &PipelineConfig) -> Result<Vec<DiscoveredSource>> {
    let input_dir = config.input_dir();
    SourceKind::ALL
        .iter()
        .map(|kind| {
            let spec = config.source_spec(*kind);
            let files = ingestion::discover_files(&input_dir, &spec)?;
            Ok(DiscoveredSource {
                kind: *kind,
                pattern: spec.pattern,
                files,
            })
        })
        .collect()
}
