use std::fs;
use std::path::{Path, PathBuf};

use dataroad_core::config::{PipelineConfig, ReadPolicy, SourceKind};
use dataroad_core::error::PipelineError;
use dataroad_core::pipelines::{discover, run};
use dataroad_core::summary::summarize_file;
use tempfile::TempDir;

const FLEET: &str = "UF;Codigo Municipio;Ano;Total Veiculos\n\
SP;3550308;2023;1.000\n\
RJ;3304557;2023;500\n\
MG;3106200;2023;300\n";

const POPULATION: &str = "nivel,cod_municipio,municipio,populacao\n\
MU,3550308,São Paulo,2000\n\
MU,3304557,Rio de Janeiro,0\n";

const MORTALITY: &str = "CODMUNRES,CAUSABAS,DTOBITO\n\
355030,V031,01012023\n\
355030,V892,15062023\n\
330455,W19,01012023\n\
355030,V234,02022022\n";

struct Workspace {
    _dir: TempDir,
    config: PipelineConfig,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let config = PipelineConfig {
            raw_root: dir.path().join("raw"),
            output_path: dir.path().join("processed").join("base_analitica.csv"),
            ..PipelineConfig::default()
        };
        Self { _dir: dir, config }
    }

    fn input(&self, relative: &str, contents: &str) -> &Self {
        let path = self.config.input_dir().join(relative);
        fs::create_dir_all(path.parent().expect("fixture path has a parent"))
            .expect("failed to create input directory");
        fs::write(path, contents).expect("failed to write input");
        self
    }

    fn with_all_sources(self) -> Self {
        self.input("Frota de veículos - Mensal - 2023-12.csv", FLEET)
            .input("ibge_population/ibge_population.csv", POPULATION)
            .input("datasus_sim/sim_2023.csv", MORTALITY);
        self
    }

    fn output(&self) -> &Path {
        &self.config.output_path
    }
}

fn output_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .expect("output written")
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn run_writes_one_row_per_fleet_row() {
    let workspace = Workspace::new().with_all_sources();

    let summary = run(&workspace.config).expect("run succeeds");

    assert_eq!(summary.output_rows, 3);
    assert_eq!(summary.population_join.matched_rows, 2);
    assert_eq!(summary.population_join.unmatched_rows, 1);
    assert_eq!(summary.per_capita_missing, 2);
    assert!(summary.missing_dashboard_columns.is_empty());

    let mortality = summary.mortality.as_ref().expect("mortality joined");
    assert!(mortality.aggregation.by_year);
    assert_eq!(mortality.aggregation.excluded_by_cause, 1);
    assert_eq!(mortality.join.matched_rows, 1);

    let lines = output_lines(workspace.output());
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "uf,cod_municipio,ano,total_veiculos,nivel,municipio,populacao,obitos_transporte,frota_per_capita"
    );
    assert_eq!(lines[1], "SP,355030,2023,1000,MU,São Paulo,2000,2,0.5");
    assert_eq!(lines[2], "RJ,330455,2023,500,MU,Rio de Janeiro,0,,");
    assert_eq!(lines[3], "MG,310620,2023,300,,,,,");
}

#[test]
fn repeated_runs_produce_identical_bytes() {
    let workspace = Workspace::new().with_all_sources();

    run(&workspace.config).expect("first run");
    let first = fs::read(workspace.output()).unwrap();
    let first_manifest = fs::read(workspace.config.manifest_path()).unwrap();

    run(&workspace.config).expect("second run");
    let second = fs::read(workspace.output()).unwrap();
    let second_manifest = fs::read(workspace.config.manifest_path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_manifest, second_manifest);
}

#[test]
fn manifest_describes_sources_and_joins() {
    let workspace = Workspace::new().with_all_sources();
    run(&workspace.config).expect("run succeeds");

    let manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(workspace.config.manifest_path()).unwrap()).unwrap();

    assert_eq!(manifest["environment"], "dev");
    assert_eq!(manifest["read_policy"], "tolerant");
    assert_eq!(manifest["output_rows"], 3);
    let sources = manifest["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 3);
    assert_eq!(sources[0]["kind"], "fleet");
    assert_eq!(sources[0]["files"][0]["status"], "loaded");
    assert_eq!(sources[0]["files"][0]["delimiter"], "semicolon");
}

#[test]
fn run_without_mortality_omits_the_deaths_column() {
    let workspace = Workspace::new();
    workspace
        .input("Frota de veículos - Mensal - 2023-12.csv", FLEET)
        .input("ibge_population/ibge_population.csv", POPULATION);

    let summary = run(&workspace.config).expect("run succeeds");

    assert!(summary.mortality.is_none());
    assert!(!summary.columns.iter().any(|name| name == "obitos_transporte"));
    assert!(summary.sources[2].absent);
}

#[test]
fn missing_population_aborts_before_writing() {
    let workspace = Workspace::new();
    workspace.input("Frota de veículos - Mensal - 2023-12.csv", FLEET);

    match run(&workspace.config) {
        Err(PipelineError::MissingInput { kind, .. }) => assert_eq!(kind, SourceKind::Population),
        other => panic!("expected missing input, got {other:?}"),
    }
    assert!(!workspace.output().exists());
    assert!(!workspace.config.manifest_path().exists());
}

#[test]
fn strict_policy_aborts_on_malformed_rows_while_tolerant_skips_them() {
    let mut workspace = Workspace::new();
    workspace
        .input(
            "Frota de veículos - Mensal - 2023-12.csv",
            "UF;Codigo Municipio;Ano;Total Veiculos\nSP;3550308;2023;10\nXX;35A03;2023;1\n",
        )
        .input("ibge_population/ibge_population.csv", POPULATION);

    let summary = run(&workspace.config).expect("tolerant run succeeds");
    assert_eq!(summary.output_rows, 1);
    assert_eq!(summary.sources[0].rows_skipped, 1);

    fs::remove_file(workspace.output()).unwrap();
    workspace.config.read_policy = ReadPolicy::Strict;
    assert!(matches!(
        run(&workspace.config),
        Err(PipelineError::ReadFailure { kind: SourceKind::Fleet, .. })
    ));
    assert!(!workspace.output().exists());
}

#[test]
fn summarize_reads_the_written_table() {
    let workspace = Workspace::new().with_all_sources();
    run(&workspace.config).expect("run succeeds");

    let summary = summarize_file(workspace.output(), None).expect("summary");

    assert_eq!(summary.year, "2023");
    let states: Vec<&str> = summary.states.iter().map(|state| state.uf.as_str()).collect();
    assert_eq!(states, vec!["MG", "RJ", "SP"]);
    assert_eq!(summary.states[2].mean_per_capita, Some(0.5));
    assert_eq!(summary.states[0].mean_per_capita, None);
    assert_eq!(summary.states[2].total_vehicles, 1000);
}

#[test]
fn discover_lists_files_per_source() {
    let workspace = Workspace::new().with_all_sources();

    let sources = discover(&workspace.config).unwrap();

    assert_eq!(sources.len(), 3);
    let counts: Vec<usize> = sources.iter().map(|source| source.files.len()).collect();
    assert_eq!(counts, vec![1, 1, 1]);
    let expected: PathBuf = workspace
        .config
        .input_dir()
        .join("datasus_sim")
        .join("sim_2023.csv");
    assert_eq!(sources[2].files[0], expected);
}

#[test]
fn short_codes_join_and_unmatched_rows_are_kept() {
    let workspace = Workspace::new();
    workspace
        .input(
            "Frota de veículos - Mensal - 2023-12.csv",
            "cod_municipio,total_veiculos\n001,100\n002,10\n",
        )
        .input(
            "ibge_population/ibge_population.csv",
            "cod_municipio,populacao\n001,50\n",
        );

    let summary = run(&workspace.config).expect("run succeeds");

    assert_eq!(summary.output_rows, 2);
    assert_eq!(summary.sources[0].rows_skipped, 0);
    assert_eq!(summary.population_join.matched_rows, 1);

    let lines = output_lines(workspace.output());
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "cod_municipio,total_veiculos,populacao,frota_per_capita");

    let first: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(&first[..3], &["001", "100", "50"]);
    assert_eq!(first[3].parse::<f64>().unwrap(), 2.0);
    assert_eq!(lines[2], "002,10,,");
}

#[test]
fn failed_manifest_leaves_no_output_table() {
    let workspace = Workspace::new().with_all_sources();
    fs::create_dir_all(workspace.config.manifest_path()).unwrap();

    assert!(matches!(
        run(&workspace.config),
        Err(PipelineError::DestinationIsDirectory(_))
    ));
    assert!(!workspace.output().exists());
    let leftovers = fs::read_dir(workspace.output().parent().unwrap())
        .unwrap()
        .count();
    assert_eq!(leftovers, 1);
}
