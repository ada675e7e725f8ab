use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use dataroad_core::config::{Environment, PipelineConfig, ReadPolicy, DEFAULT_OUTPUT_PATH};
use dataroad_core::{pipelines, summary};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Builds the municipal fleet analytic table", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load fleet, population and mortality extracts and write the analytic table
    Run(RunArgs),
    /// List the files each source would read
    Discover(SourceArgs),
    /// Mean fleet per capita by state for one year of the analytic table
    Summarize(SummarizeArgs),
}

#[derive(Args, Debug, Default)]
struct SourceArgs {
    /// TOML file overriding the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Input environment (dev or prod)
    #[arg(long)]
    env: Option<Environment>,
    /// Directory holding one sub-directory per environment
    #[arg(long)]
    raw_root: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Path of the analytic table to write
    #[arg(long)]
    output: Option<PathBuf>,
    /// Abort on the first malformed row or unreadable file
    #[arg(long)]
    strict: bool,
    /// Do not write the run manifest next to the output
    #[arg(long)]
    no_manifest: bool,
}

#[derive(Args, Debug, Default)]
struct SummarizeArgs {
    /// Analytic table to read
    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    input: PathBuf,
    /// Year to summarize (latest present when omitted)
    #[arg(long)]
    year: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Discover(args) => handle_discover(args),
        Command::Summarize(args) => handle_summarize(args),
    }
}

fn load_config(args: &SourceArgs) -> Result<PipelineConfig> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    let mut config = config
        .apply_env(|key| std::env::var(key).ok())
        .context("invalid environment configuration")?;

    if let Some(env) = args.env {
        config.environment = env;
    }
    if let Some(root) = &args.raw_root {
        config.raw_root = root.clone();
    }
    Ok(config)
}

fn handle_run(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.source)?;
    if let Some(output) = args.output {
        config.output_path = output;
    }
    if args.strict {
        config.read_policy = ReadPolicy::Strict;
    }
    if args.no_manifest {
        config.write_manifest = false;
    }

    let summary = pipelines::run(&config).with_context(|| {
        format!(
            "pipeline run failed for input {}",
            config.input_dir().display()
        )
    })?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["source", "files", "failed", "rows", "skipped"]);
    for source in &summary.sources {
        table.add_row(vec![
            source.kind.to_string(),
            source.files.len().to_string(),
            source.failed_files.to_string(),
            source.rows_loaded.to_string(),
            source.rows_skipped.to_string(),
        ]);
    }
    println!("{table}");
    println!(
        "wrote {} rows to {} ({} without fleet per capita)",
        summary.output_rows, summary.output_path, summary.per_capita_missing
    );
    Ok(())
}

fn handle_discover(args: SourceArgs) -> Result<()> {
    let config = load_config(&args)?;
    let sources = pipelines::discover(&config).context("failed to list input files")?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["source", "pattern", "file"]);
    for source in &sources {
        if source.files.is_empty() {
            table.add_row(vec![
                source.kind.to_string(),
                source.pattern.clone(),
                "(none)".to_string(),
            ]);
        }
        for file in &source.files {
            table.add_row(vec![
                source.kind.to_string(),
                source.pattern.clone(),
                display_relative(file, &config.input_dir()),
            ]);
        }
    }
    info!(input_dir = %config.input_dir().display(), "discovery finished");
    println!("{table}");
    Ok(())
}

fn handle_summarize(args: SummarizeArgs) -> Result<()> {
    let summary = summary::summarize_file(&args.input, args.year.as_deref())
        .with_context(|| format!("failed to summarize {}", args.input.display()))?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "uf",
        "rows",
        "municipios",
        "mean frota_per_capita",
        "total_veiculos",
        "populacao",
    ]);
    for state in &summary.states {
        table.add_row(vec![
            state.uf.clone(),
            state.rows.to_string(),
            state.municipalities.to_string(),
            state
                .mean_per_capita
                .map(|mean| format!("{mean:.4}"))
                .unwrap_or_else(|| "-".to_string()),
            state.total_vehicles.to_string(),
            state.population.to_string(),
        ]);
    }
    println!("year {}", summary.year);
    println!("{table}");
    Ok(())
}

fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
