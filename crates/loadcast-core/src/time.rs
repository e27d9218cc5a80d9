use chrono::{DateTime, Utc};
use polars::prelude::*;

use crate::error::{PipelineError, Result};

pub const HOUR_MICROS: i64 = 3_600 * 1_000_000;

pub fn datetime_from_micros(value: i64) -> Result<DateTime<Utc>> {
    let secs = value.div_euclid(1_000_000);
    let micros = value.rem_euclid(1_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, micros * 1_000)
        .ok_or(PipelineError::InvalidTimestamp(value))
}

pub fn micros_from_datetime(value: DateTime<Utc>) -> i64 {
    value.timestamp() * 1_000_000 + i64::from(value.timestamp_subsec_micros())
}

/// Extracts the `timestamp` column of `df` as epoch microseconds, failing on
/// any null entry.
pub fn required_timestamp_micros(df: &DataFrame, context: &str) -> Result<Vec<i64>> {
    let timestamps = df.column("timestamp")?.datetime()?;
    let mut micros = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let value = timestamps
            .get(idx)
            .ok_or_else(|| PipelineError::Alignment(format!("{context}: null timestamp at row {idx}")))?;
        micros.push(value);
    }
    Ok(micros)
}

/// Verifies a sorted run of timestamps steps exactly one hour between rows.
pub fn check_hourly_contiguity(micros: &[i64], context: &str) -> Result<()> {
    for (idx, window) in micros.windows(2).enumerate() {
        let delta = window[1] - window[0];
        if delta != HOUR_MICROS {
            let previous = datetime_from_micros(window[0])?;
            let current = datetime_from_micros(window[1])?;
            return Err(PipelineError::Alignment(format!(
                "{context}: step from {previous} to {current} at row {} is not exactly one hour",
                idx + 1
            )));
        }
    }
    Ok(())
}

/// Casts an integer `timestamp` column to a UTC datetime column.
pub fn cast_timestamp_to_utc(df: DataFrame) -> Result<DataFrame> {
    let cast = df
        .lazy()
        .with_column(
            col("timestamp")
                .cast(DataType::Datetime(
                    TimeUnit::Microseconds,
                    Some(polars::prelude::TimeZone::UTC),
                ))
                .alias("timestamp"),
        )
        .collect()?;
    Ok(cast)
}
