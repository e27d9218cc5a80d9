//! Parser for Open-Meteo archive API responses (JSON). Pure text-to-frame:
//! fetching, retry and caching live with the caller.

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::Deserialize;

use crate::errors::IngestError;
use crate::cast_timestamp_to_utc;

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    hourly: HourlyBlock,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    shortwave_radiation_instant: Vec<Option<f64>>,
}

/// Parses an archive response into a raw weather frame with columns
/// `timestamp`, `temperature_2m`, `relative_humidity_2m`, `wind_speed_10m`
/// and `shortwave_radiation_wm2`. Nulls in the hourly arrays are preserved
/// for the normalizer to repair or reject.
pub fn parse_archive_response(json: &str) -> Result<DataFrame, IngestError> {
    let response: ArchiveResponse = serde_json::from_str(json)?;
    let hourly = response.hourly;

    if hourly.time.is_empty() {
        return Err(IngestError::EmptyDocument);
    }
    let expected = hourly.time.len();
    check_length("temperature_2m", expected, hourly.temperature_2m.len())?;
    check_length(
        "relative_humidity_2m",
        expected,
        hourly.relative_humidity_2m.len(),
    )?;
    check_length("wind_speed_10m", expected, hourly.wind_speed_10m.len())?;
    check_length(
        "shortwave_radiation_instant",
        expected,
        hourly.shortwave_radiation_instant.len(),
    )?;

    let mut timestamps = Vec::with_capacity(expected);
    for value in &hourly.time {
        timestamps.push(parse_openmeteo_instant(value)?);
    }

    let df = DataFrame::new(vec![
        Series::new("timestamp".into(), timestamps).into(),
        Series::new("temperature_2m".into(), hourly.temperature_2m).into(),
        Series::new("relative_humidity_2m".into(), hourly.relative_humidity_2m).into(),
        Series::new("wind_speed_10m".into(), hourly.wind_speed_10m).into(),
        Series::new("shortwave_radiation_wm2".into(), hourly.shortwave_radiation_instant).into(),
    ])?;
    cast_timestamp_to_utc(df)
}

/// Open-Meteo returns UTC wall-clock instants without a zone suffix, e.g.
/// `2023-01-01T00:00`.
fn parse_openmeteo_instant(value: &str) -> Result<i64, IngestError> {
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc().timestamp_micros());
        }
    }
    Err(IngestError::InvalidTimestamp {
        value: value.to_string(),
        message: "expected an ISO-8601 instant without zone suffix".to_string(),
    })
}

fn check_length(field: &'static str, expected: usize, actual: usize) -> Result<(), IngestError> {
    if actual != expected {
        return Err(IngestError::MismatchedLengths {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}
