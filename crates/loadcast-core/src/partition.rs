use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Datelike;
use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::features::verify_feature_table;
use crate::time::datetime_from_micros;

pub const DEMAND_FILE_NAME: &str = "demand.parquet";
pub const WEATHER_FILE_NAME: &str = "weather.parquet";
pub const ALIGNED_FILE_NAME: &str = "load_weather.parquet";
pub const FEATURE_FILE_NAME: &str = "load_forecasting_features.parquet";

/// Physical layout of raw and processed partitions under one data root. The
/// key scheme is country first, then year: the feature builder relies on it to
/// assemble multi-year continuity before splitting.
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    raw_dir: PathBuf,
    processed_dir: PathBuf,
}

impl PartitionLayout {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        let root = data_root.into();
        Self {
            raw_dir: root.join("raw"),
            processed_dir: root.join("processed"),
        }
    }

    fn key(country: &str, year: i32) -> PathBuf {
        PathBuf::from(format!("country={country}")).join(format!("year={year}"))
    }

    pub fn raw_demand(&self, country: &str, year: i32) -> PathBuf {
        self.raw_dir
            .join("electricity_demand")
            .join(Self::key(country, year))
            .join(DEMAND_FILE_NAME)
    }

    pub fn raw_weather(&self, country: &str, year: i32) -> PathBuf {
        self.raw_dir
            .join("weather")
            .join(Self::key(country, year))
            .join(WEATHER_FILE_NAME)
    }

    pub fn aligned(&self, country: &str, year: i32) -> PathBuf {
        self.processed_dir
            .join(Self::key(country, year))
            .join(ALIGNED_FILE_NAME)
    }

    pub fn features(&self, country: &str, year: i32) -> PathBuf {
        self.processed_dir
            .join(Self::key(country, year))
            .join(FEATURE_FILE_NAME)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    pub country: String,
    pub year: i32,
    pub rows: usize,
    pub path: PathBuf,
}

/// Splits a finished feature table by calendar year and writes one parquet
/// artifact per (country, year).
///
/// Partitioning happens strictly after all cross-year computation, so a
/// January row correctly carries lag values drawn from the previous December
/// even though it lands in its own year's file. Index invariants are verified
/// once more before anything touches disk; partition files are regenerable
/// and simply overwritten on rebuild.
pub fn write_feature_partitions(
    df: &DataFrame,
    country: &str,
    layout: &PartitionLayout,
) -> Result<Vec<PartitionSummary>> {
    verify_feature_table(df)?;

    let mut summaries = Vec::new();
    for (year, part) in split_by_year(df)? {
        let path = layout.features(country, year);
        write_parquet(&part, &path)?;
        info!(
            country,
            year,
            rows = part.height(),
            path = %path.display(),
            "wrote feature partition"
        );
        summaries.push(PartitionSummary {
            country: country.to_string(),
            year,
            rows: part.height(),
            path,
        });
    }
    Ok(summaries)
}

/// Splits a timestamp-sorted frame into contiguous per-year slices.
pub fn split_by_year(df: &DataFrame) -> Result<Vec<(i32, DataFrame)>> {
    let timestamps = df.column("timestamp")?.datetime()?;

    let mut parts = Vec::new();
    let mut slice_start = 0usize;
    let mut active: Option<i32> = None;
    for idx in 0..df.height() {
        let ts = timestamps.get(idx).ok_or_else(|| {
            PipelineError::FeatureIntegrity(format!("null timestamp at row {idx} while partitioning"))
        })?;
        let year = datetime_from_micros(ts)?.year();
        match active {
            None => active = Some(year),
            Some(current) if current != year => {
                parts.push((current, df.slice(slice_start as i64, idx - slice_start)));
                slice_start = idx;
                active = Some(year);
            }
            _ => {}
        }
    }
    if let Some(current) = active {
        parts.push((current, df.slice(slice_start as i64, df.height() - slice_start)));
    }
    Ok(parts)
}

pub fn write_parquet(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut frame = df.clone();
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .with_statistics(StatisticsOptions::default())
        .finish(&mut frame)?;
    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    use crate::time::{cast_timestamp_to_utc, micros_from_datetime, HOUR_MICROS};

    fn feature_like_frame(start: &str, hours: usize) -> DataFrame {
        let base = micros_from_datetime(start.parse::<DateTime<Utc>>().expect("valid timestamp"));
        let timestamps: Vec<i64> = (0..hours).map(|step| base + step as i64 * HOUR_MICROS).collect();
        let load: Vec<f64> = (0..hours).map(|idx| idx as f64).collect();
        let df = DataFrame::new(vec![
            Series::new("timestamp".into(), timestamps).into(),
            Series::new("load_t".into(), load).into(),
        ])
        .expect("frame construction");
        cast_timestamp_to_utc(df).expect("timestamp cast")
    }

    #[test]
    fn splits_on_year_boundary() {
        // 2022-12-30T00:00 plus 96 hours crosses into 2023.
        let df = feature_like_frame("2022-12-30T00:00:00Z", 96);
        let parts = split_by_year(&df).expect("split succeeds");

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].0, 2022);
        assert_eq!(parts[0].1.height(), 48);
        assert_eq!(parts[1].0, 2023);
        assert_eq!(parts[1].1.height(), 48);

        let first_2023 = parts[1].1.column("timestamp").unwrap().datetime().unwrap().get(0);
        let expected = micros_from_datetime(
            "2023-01-01T00:00:00Z".parse::<DateTime<Utc>>().expect("valid timestamp"),
        );
        assert_eq!(first_2023, Some(expected));
    }

    #[test]
    fn single_year_yields_one_partition() {
        let df = feature_like_frame("2023-06-01T00:00:00Z", 48);
        let parts = split_by_year(&df).expect("split succeeds");
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].0, 2023);
        assert_eq!(parts[0].1.height(), 48);
    }

    #[test]
    fn writes_one_file_per_country_year() {
        let scratch = tempfile::tempdir().expect("temp dir");
        let layout = PartitionLayout::new(scratch.path());
        let df = feature_like_frame("2022-12-30T00:00:00Z", 96);

        let summaries = write_feature_partitions(&df, "FR", &layout).expect("write succeeds");

        assert_eq!(summaries.len(), 2);
        for summary in &summaries {
            assert!(summary.path.exists(), "missing {}", summary.path.display());
            let read_back = read_parquet(&summary.path).expect("read back");
            assert_eq!(read_back.height(), summary.rows);
        }
        assert!(layout.features("FR", 2022).exists());
        assert!(layout.features("FR", 2023).exists());
    }

    #[test]
    fn refuses_to_write_a_table_with_nulls() {
        let scratch = tempfile::tempdir().expect("temp dir");
        let layout = PartitionLayout::new(scratch.path());
        let base = micros_from_datetime(
            "2023-01-01T00:00:00Z".parse::<DateTime<Utc>>().expect("valid timestamp"),
        );
        let timestamps: Vec<i64> = (0..3).map(|step| base + step * HOUR_MICROS).collect();
        let df = DataFrame::new(vec![
            Series::new("timestamp".into(), timestamps).into(),
            Series::new("load_t".into(), vec![Some(1.0), None, Some(3.0)]).into(),
        ])
        .expect("frame construction");
        let df = cast_timestamp_to_utc(df).expect("timestamp cast");

        let err = write_feature_partitions(&df, "FR", &layout).expect_err("nulls must abort write");
        assert!(matches!(err, PipelineError::FeatureIntegrity(_)));
        assert!(!layout.features("FR", 2023).exists(), "no partial write");
    }
}
