use polars::prelude::*;
use serde::Deserialize;
use tracing::{info, warn};

use crate::align::align_series;
use crate::error::{PipelineError, Result};
use crate::features::{build_feature_table, DEFAULT_FORECAST_HORIZON};
use crate::holidays;
use crate::partition::{self, PartitionLayout, PartitionSummary};
use crate::timeline::{normalize_hourly, DEFAULT_GAP_LIMIT};

pub const DEMAND_VALUE_COLUMNS: [&str; 1] = ["load_mw"];
pub const WEATHER_VALUE_COLUMNS: [&str; 4] = [
    "temperature_2m",
    "relative_humidity_2m",
    "wind_speed_10m",
    "shortwave_radiation_wm2",
];

/// One feature-build unit: a single country over a list of years.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildRequest {
    pub country: String,
    pub years: Vec<i32>,
    #[serde(default = "default_horizon")]
    pub forecast_horizon: usize,
}

fn default_horizon() -> usize {
    DEFAULT_FORECAST_HORIZON
}

/// Two-stage pipeline over a partitioned data root: `preprocess` turns raw
/// demand/weather partitions into aligned hourly partitions, `build` turns
/// aligned partitions into feature partitions. Units are independent, so a
/// caller may run many (country, year-range) units in parallel processes
/// without coordination.
pub struct LoadFeaturePipeline {
    layout: PartitionLayout,
    gap_limit: usize,
}

impl LoadFeaturePipeline {
    pub fn new(layout: PartitionLayout) -> Self {
        Self {
            layout,
            gap_limit: DEFAULT_GAP_LIMIT,
        }
    }

    pub fn with_gap_limit(mut self, gap_limit: usize) -> Self {
        self.gap_limit = gap_limit;
        self
    }

    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    /// Normalizes and aligns raw partitions into one `load_weather.parquet`
    /// per requested year. Years with missing raw partitions are skipped with
    /// a warning; gaps beyond the interpolation limit abort that year's unit.
    pub fn preprocess(&self, country: &str, years: &[i32]) -> Result<Vec<PartitionSummary>> {
        let mut summaries = Vec::new();
        for &year in years {
            let demand_path = self.layout.raw_demand(country, year);
            let weather_path = self.layout.raw_weather(country, year);
            if !demand_path.exists() || !weather_path.exists() {
                warn!(country, year, "missing raw partition, skipping year");
                continue;
            }

            info!(country, year, "preprocessing raw partitions");
            let demand = partition::read_parquet(&demand_path)?;
            let weather = partition::read_parquet(&weather_path)?;
            let aligned = self.preprocess_frames(&demand, &weather)?;

            let path = self.layout.aligned(country, year);
            partition::write_parquet(&aligned, &path)?;
            info!(
                country,
                year,
                rows = aligned.height(),
                path = %path.display(),
                "wrote aligned partition"
            );
            summaries.push(PartitionSummary {
                country: country.to_string(),
                year,
                rows: aligned.height(),
                path,
            });
        }
        Ok(summaries)
    }

    /// The pure preprocess step: normalize both raw series onto the hourly
    /// grid and inner-join them. The country label rides on the demand side
    /// only, so the merge carries a single source of truth for it.
    pub fn preprocess_frames(&self, demand: &DataFrame, weather: &DataFrame) -> Result<DataFrame> {
        let demand_labels: &[&str] = if demand.column("country").is_ok() {
            &["country"]
        } else {
            &[]
        };
        let demand = normalize_hourly(demand, &DEMAND_VALUE_COLUMNS, demand_labels, self.gap_limit)?;

        let weather_input = match weather.column("country") {
            Ok(_) => weather.drop("country")?,
            Err(_) => weather.clone(),
        };
        let weather = normalize_hourly(&weather_input, &WEATHER_VALUE_COLUMNS, &[], self.gap_limit)?;

        align_series(&[demand, weather])
    }

    /// Concatenates the preprocessed years in timestamp order, builds the
    /// feature table across the whole span, and partitions it back out by
    /// year.
    pub fn build(&self, request: &BuildRequest) -> Result<Vec<PartitionSummary>> {
        let mut frames = Vec::new();
        for &year in &request.years {
            let path = self.layout.aligned(&request.country, year);
            if !path.exists() {
                warn!(
                    country = %request.country,
                    year,
                    "no preprocessed partition, skipping year"
                );
                continue;
            }
            frames.push(partition::read_parquet(&path)?.lazy());
        }
        if frames.is_empty() {
            return Err(PipelineError::InsufficientData {
                country: request.country.clone(),
                years: request.years.clone(),
            });
        }

        let aligned = concat(&frames, UnionArgs::default())?
            .sort(["timestamp"], Default::default())
            .collect()?;

        let calendar = holidays::for_country(&request.country);
        let features = build_feature_table(&aligned, calendar.as_ref(), request.forecast_horizon)?;
        partition::write_feature_partitions(&features, &request.country, &self.layout)
    }

    /// Both stages back to back for one unit.
    pub fn run(&self, request: &BuildRequest) -> Result<Vec<PartitionSummary>> {
        self.preprocess(&request.country, &request.years)?;
        self.build(request)
    }
}
