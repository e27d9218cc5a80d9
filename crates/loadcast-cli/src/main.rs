use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use loadcast_core::partition::{self, PartitionLayout, PartitionSummary};
use loadcast_core::pipeline::{BuildRequest, LoadFeaturePipeline};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Load forecasting feature pipeline CLI", long_about = None)]
struct Cli {
    /// Optional TOML settings file; command-line flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize raw demand and weather partitions onto the hourly grid
    Preprocess(StageArgs),
    /// Build feature tables from preprocessed partitions
    BuildFeatures(BuildArgs),
    /// Preprocess and build features in one pass
    Run(BuildArgs),
    /// Convert a fetched upstream payload into a raw parquet partition
    Import(ImportArgs),
}

#[derive(Args, Debug)]
struct StageArgs {
    /// Country code, repeatable (e.g. --country FR --country DE)
    #[arg(long = "country", required = true)]
    countries: Vec<String>,

    /// Years to process, as a list with ranges (e.g. 2019,2021-2023)
    #[arg(long)]
    years: String,

    /// Root directory holding raw/ and processed/ partitions
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Longest run of missing hours the normalizer will interpolate
    #[arg(long)]
    gap_limit: Option<usize>,
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    stage: StageArgs,

    /// Forecast horizon in hours for the target column
    #[arg(long)]
    horizon: Option<usize>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Path to the fetched payload (ENTSO-E XML or Open-Meteo JSON)
    payload: PathBuf,

    /// Payload format
    #[arg(long)]
    kind: PayloadKind,

    #[arg(long)]
    country: String,

    #[arg(long)]
    year: i32,

    #[arg(long)]
    data_root: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum PayloadKind {
    /// ENTSO-E "Actual Total Load" GL_MarketDocument XML
    EntsoeLoad,
    /// Open-Meteo archive API hourly JSON
    OpenmeteoWeather,
}

/// Settings from the optional TOML file. Every field has a default, so the
/// file itself is optional and may be partial.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct Settings {
    data_root: Option<PathBuf>,
    gap_limit: Option<usize>,
    forecast_horizon: Option<usize>,
}

impl Settings {
    fn load(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("reading settings file {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("parsing settings file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    fn data_root(&self, flag: Option<&PathBuf>) -> PathBuf {
        flag.or(self.data_root.as_ref())
            .cloned()
            .unwrap_or_else(|| PathBuf::from("data"))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_ref())?;

    match cli.command {
        Command::Preprocess(args) => {
            let pipeline = make_pipeline(&settings, &args)?;
            let years = parse_years(&args.years)?;
            for country in &args.countries {
                let summaries = pipeline.preprocess(country, &years)?;
                report(country, "preprocessed", &summaries);
            }
            Ok(())
        }
        Command::BuildFeatures(args) => {
            let pipeline = make_pipeline(&settings, &args.stage)?;
            for request in build_requests(&settings, &args)? {
                let summaries = pipeline.build(&request)?;
                report(&request.country, "built features for", &summaries);
            }
            Ok(())
        }
        Command::Run(args) => {
            let pipeline = make_pipeline(&settings, &args.stage)?;
            for request in build_requests(&settings, &args)? {
                let summaries = pipeline.run(&request)?;
                report(&request.country, "ran full pipeline for", &summaries);
            }
            Ok(())
        }
        Command::Import(args) => import_payload(&settings, &args),
    }
}

fn make_pipeline(settings: &Settings, args: &StageArgs) -> Result<LoadFeaturePipeline> {
    let layout = PartitionLayout::new(settings.data_root(args.data_root.as_ref()));
    let mut pipeline = LoadFeaturePipeline::new(layout);
    if let Some(gap_limit) = args.gap_limit.or(settings.gap_limit) {
        pipeline = pipeline.with_gap_limit(gap_limit);
    }
    Ok(pipeline)
}

fn build_requests(settings: &Settings, args: &BuildArgs) -> Result<Vec<BuildRequest>> {
    let years = parse_years(&args.stage.years)?;
    let horizon = args
        .horizon
        .or(settings.forecast_horizon)
        .unwrap_or(loadcast_core::features::DEFAULT_FORECAST_HORIZON);
    Ok(args
        .stage
        .countries
        .iter()
        .map(|country| BuildRequest {
            country: country.clone(),
            years: years.clone(),
            forecast_horizon: horizon,
        })
        .collect())
}

fn import_payload(settings: &Settings, args: &ImportArgs) -> Result<()> {
    let content = fs::read_to_string(&args.payload)
        .with_context(|| format!("reading payload {}", args.payload.display()))?;
    let layout = PartitionLayout::new(settings.data_root(args.data_root.as_ref()));

    let (df, path) = match args.kind {
        PayloadKind::EntsoeLoad => {
            let df = loadcast_ingest::parse_load_document(&content, &args.country)?;
            (df, layout.raw_demand(&args.country, args.year))
        }
        PayloadKind::OpenmeteoWeather => {
            let df = loadcast_ingest::parse_archive_response(&content)?;
            (df, layout.raw_weather(&args.country, args.year))
        }
    };

    partition::write_parquet(&df, &path)?;
    info!(
        country = %args.country,
        year = args.year,
        rows = df.height(),
        path = %path.display(),
        "imported raw partition"
    );
    Ok(())
}

fn report(country: &str, action: &str, summaries: &[PartitionSummary]) {
    let rows: usize = summaries.iter().map(|s| s.rows).sum();
    info!(
        country,
        partitions = summaries.len(),
        rows,
        "{action} {country}"
    );
}

/// Parses a year list such as `2019,2021-2023` into sorted distinct years.
fn parse_years(spec: &str) -> Result<Vec<i32>> {
    let mut years = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((start, end)) => {
                let start: i32 = start.trim().parse().context("invalid year range start")?;
                let end: i32 = end.trim().parse().context("invalid year range end")?;
                if end < start {
                    bail!("year range {part} runs backwards");
                }
                years.extend(start..=end);
            }
            None => years.push(part.parse().context("invalid year")?),
        }
    }
    if years.is_empty() {
        bail!("no years given");
    }
    years.sort_unstable();
    years.dedup();
    Ok(years)
}
