use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Timelike};
use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::holidays::HolidayCalendar;
use crate::time::{
    cast_timestamp_to_utc, check_hourly_contiguity, datetime_from_micros,
    required_timestamp_micros,
};

/// Backward lag offsets of the load signal, in grid steps: previous hour,
/// same hour yesterday, same hour last week.
pub const LAG_HOURS: [usize; 3] = [1, 24, 168];

pub const MAX_LAG_HOURS: usize = 168;

pub const DEFAULT_FORECAST_HORIZON: usize = 1;

pub fn target_column_name(horizon: usize) -> String {
    format!("target_load_t+{horizon}")
}

/// Derives the feature/target table from an aligned multi-year frame.
///
/// The order of operations is significant for leakage safety: the target and
/// lag shifts are computed over the full concatenated span before any row is
/// dropped, so the boundary between adjacent years never creates a false gap.
/// Shifts are exact grid-step offsets on the UTC hourly grid, never
/// calendar-relative arithmetic. Rows whose lags or target cannot be computed
/// are dropped, never filled.
pub fn build_feature_table(
    df: &DataFrame,
    calendar: &dyn HolidayCalendar,
    horizon: usize,
) -> Result<DataFrame> {
    if horizon == 0 {
        return Err(PipelineError::FeatureIntegrity(
            "forecast horizon must be at least one hour".to_string(),
        ));
    }

    let micros = required_timestamp_micros(df, "feature input timeline")?;
    check_hourly_contiguity(&micros, "feature input timeline")?;

    for name in ["load_mw", "temperature_2m"] {
        let nulls = df.column(name)?.null_count();
        if nulls > 0 {
            return Err(PipelineError::FeatureIntegrity(format!(
                "source column '{name}' has {nulls} null value(s) before feature build"
            )));
        }
    }
    let load: Vec<f64> = df.column("load_mw")?.f64()?.into_no_null_iter().collect();
    let temperature: Vec<f64> = df
        .column("temperature_2m")?
        .f64()?
        .into_no_null_iter()
        .collect();
    let len = load.len();

    // Target first, over the full concatenation, before any row is dropped.
    let target: Vec<Option<f64>> = (0..len).map(|idx| load.get(idx + horizon).copied()).collect();
    let lag_columns: Vec<Vec<Option<f64>>> = LAG_HOURS
        .iter()
        .map(|&lag| {
            (0..len)
                .map(|idx| idx.checked_sub(lag).map(|src| load[src]))
                .collect()
        })
        .collect();

    let holiday_dates = holiday_dates_for_span(calendar, &micros)?;

    let mut out_ts = Vec::with_capacity(len);
    let mut out_load = Vec::with_capacity(len);
    let mut out_lag_1 = Vec::with_capacity(len);
    let mut out_lag_24 = Vec::with_capacity(len);
    let mut out_lag_168 = Vec::with_capacity(len);
    let mut out_temperature = Vec::with_capacity(len);
    let mut out_hour = Vec::with_capacity(len);
    let mut out_weekday = Vec::with_capacity(len);
    let mut out_week = Vec::with_capacity(len);
    let mut out_target = Vec::with_capacity(len);

    for idx in 0..len {
        let (Some(lag_1), Some(lag_24), Some(lag_168), Some(target_value)) = (
            lag_columns[0][idx],
            lag_columns[1][idx],
            lag_columns[2][idx],
            target[idx],
        ) else {
            continue;
        };

        let instant = datetime_from_micros(micros[idx])?;
        let date = instant.date_naive();
        let is_weekday =
            date.weekday().num_days_from_monday() < 5 && !holiday_dates.contains(&date);
        let week = date.iso_week().week();

        out_ts.push(micros[idx]);
        out_load.push(load[idx]);
        out_lag_1.push(lag_1);
        out_lag_24.push(lag_24);
        out_lag_168.push(lag_168);
        out_temperature.push(temperature[idx]);
        out_hour.push(instant.hour() as i32);
        out_weekday.push(is_weekday as i32);
        out_week.push(if week == 53 { 52 } else { week as i32 });
        out_target.push(target_value);
    }

    let columns: Vec<Column> = vec![
        Series::new("timestamp".into(), out_ts).into(),
        Series::new("load_t".into(), out_load).into(),
        Series::new("load_t-1".into(), out_lag_1).into(),
        Series::new("load_t-24".into(), out_lag_24).into(),
        Series::new("load_t-168".into(), out_lag_168).into(),
        Series::new("temperature_t".into(), out_temperature).into(),
        Series::new("hour".into(), out_hour).into(),
        Series::new("is_weekday".into(), out_weekday).into(),
        Series::new("week_of_year".into(), out_week).into(),
        Series::new(target_column_name(horizon).into(), out_target).into(),
    ];
    let table = cast_timestamp_to_utc(DataFrame::new(columns)?)?;

    verify_feature_table(&table)?;
    Ok(table)
}

/// Final integrity gate: zero nulls anywhere, timestamp index strictly
/// increasing (which also implies uniqueness). Runs again before every write.
pub fn verify_feature_table(df: &DataFrame) -> Result<()> {
    for column in df.get_columns() {
        let nulls = column.null_count();
        if nulls > 0 {
            return Err(PipelineError::FeatureIntegrity(format!(
                "column '{}' contains {} null value(s)",
                column.name(),
                nulls
            )));
        }
    }

    let timestamps = df.column("timestamp")?.datetime()?;
    let mut previous: Option<i64> = None;
    for idx in 0..df.height() {
        let ts = timestamps.get(idx).ok_or_else(|| {
            PipelineError::FeatureIntegrity(format!("null timestamp at row {idx}"))
        })?;
        if let Some(prev) = previous {
            if ts <= prev {
                return Err(PipelineError::FeatureIntegrity(format!(
                    "timestamp index not strictly increasing at row {idx}"
                )));
            }
        }
        previous = Some(ts);
    }
    Ok(())
}

fn holiday_dates_for_span(
    calendar: &dyn HolidayCalendar,
    micros: &[i64],
) -> Result<HashSet<NaiveDate>> {
    let mut dates = HashSet::new();
    let (Some(&first), Some(&last)) = (micros.first(), micros.last()) else {
        return Ok(dates);
    };
    let start_year = datetime_from_micros(first)?.year();
    let end_year = datetime_from_micros(last)?.year();
    for year in start_year..=end_year {
        dates.extend(calendar.holidays_for_year(year));
    }
    Ok(dates)
}
