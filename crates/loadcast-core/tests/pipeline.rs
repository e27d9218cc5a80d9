//! End-to-end run over a two-year synthetic dataset, through parquet on disk,
//! proving cross-year lag correctness despite per-year output files.

use chrono::{DateTime, Utc};
use polars::prelude::*;

use loadcast_core::partition::{self, PartitionLayout};
use loadcast_core::pipeline::{BuildRequest, LoadFeaturePipeline};
use loadcast_core::time::{cast_timestamp_to_utc, micros_from_datetime, HOUR_MICROS};

const HOURS_2022: usize = 365 * 24;
const HOURS_2023: usize = 365 * 24;

fn instant(ts: &str) -> i64 {
    micros_from_datetime(ts.parse::<DateTime<Utc>>().expect("valid timestamp"))
}

/// Load value for hour index `i` counted from 2022-01-01T00:00Z.
fn load_at(i: usize) -> f64 {
    1000.0 + (i % 500) as f64
}

fn demand_frame(start: &str, first_index: usize, hours: usize) -> DataFrame {
    let base = instant(start);
    let timestamps: Vec<i64> = (0..hours).map(|step| base + step as i64 * HOUR_MICROS).collect();
    let load: Vec<f64> = (0..hours).map(|step| load_at(first_index + step)).collect();
    let df = DataFrame::new(vec![
        Series::new("timestamp".into(), timestamps).into(),
        Series::new("load_mw".into(), load).into(),
        Series::new("country".into(), vec!["FR"; hours]).into(),
    ])
    .expect("frame construction");
    cast_timestamp_to_utc(df).expect("timestamp cast")
}

fn weather_frame(start: &str, hours: usize) -> DataFrame {
    let base = instant(start);
    let timestamps: Vec<i64> = (0..hours).map(|step| base + step as i64 * HOUR_MICROS).collect();
    let temperature: Vec<f64> = (0..hours).map(|step| 10.0 + (step % 24) as f64).collect();
    let df = DataFrame::new(vec![
        Series::new("timestamp".into(), timestamps).into(),
        Series::new("temperature_2m".into(), temperature).into(),
        Series::new("relative_humidity_2m".into(), vec![65.0; hours]).into(),
        Series::new("wind_speed_10m".into(), vec![3.5; hours]).into(),
        Series::new("shortwave_radiation_wm2".into(), vec![120.0; hours]).into(),
        Series::new("country".into(), vec!["FR"; hours]).into(),
    ])
    .expect("frame construction");
    cast_timestamp_to_utc(df).expect("timestamp cast")
}

fn f64_at(df: &DataFrame, column: &str, idx: usize) -> f64 {
    df.column(column)
        .unwrap_or_else(|_| panic!("missing column {column}"))
        .f64()
        .unwrap()
        .get(idx)
        .unwrap()
}

#[test]
fn two_year_build_preserves_cross_year_lags() {
    let scratch = tempfile::tempdir().expect("temp dir");
    let layout = PartitionLayout::new(scratch.path());

    partition::write_parquet(
        &demand_frame("2022-01-01T00:00:00Z", 0, HOURS_2022),
        &layout.raw_demand("FR", 2022),
    )
    .expect("raw 2022 demand written");
    partition::write_parquet(
        &demand_frame("2023-01-01T00:00:00Z", HOURS_2022, HOURS_2023),
        &layout.raw_demand("FR", 2023),
    )
    .expect("raw 2023 demand written");
    partition::write_parquet(
        &weather_frame("2022-01-01T00:00:00Z", HOURS_2022),
        &layout.raw_weather("FR", 2022),
    )
    .expect("raw 2022 weather written");
    partition::write_parquet(
        &weather_frame("2023-01-01T00:00:00Z", HOURS_2023),
        &layout.raw_weather("FR", 2023),
    )
    .expect("raw 2023 weather written");

    let pipeline = LoadFeaturePipeline::new(layout.clone());
    let request = BuildRequest {
        country: "FR".to_string(),
        years: vec![2022, 2023],
        forecast_horizon: 1,
    };
    let summaries = pipeline.run(&request).expect("pipeline run succeeds");

    // One partition per year; exactly 168 rows lost at the start of the span
    // and 1 at the end, nowhere else.
    assert_eq!(summaries.len(), 2);
    let rows_2022 = summaries.iter().find(|s| s.year == 2022).expect("2022 summary").rows;
    let rows_2023 = summaries.iter().find(|s| s.year == 2023).expect("2023 summary").rows;
    assert_eq!(rows_2022, HOURS_2022 - 168);
    assert_eq!(rows_2023, HOURS_2023 - 1);

    let features_2023 =
        partition::read_parquet(&layout.features("FR", 2023)).expect("2023 features readable");
    assert_eq!(
        features_2023.get_column_names(),
        vec![
            "timestamp",
            "load_t",
            "load_t-1",
            "load_t-24",
            "load_t-168",
            "temperature_t",
            "hour",
            "is_weekday",
            "week_of_year",
            "target_load_t+1",
        ]
    );

    // The first 2023 row exists despite being within 168 hours of the file
    // boundary, and its weekly lag reaches back into 2022-12-25.
    let timestamps = features_2023.column("timestamp").unwrap().datetime().unwrap();
    assert_eq!(timestamps.get(0), Some(instant("2023-01-01T00:00:00Z")));
    assert_eq!(f64_at(&features_2023, "load_t", 0), load_at(HOURS_2022));
    assert_eq!(f64_at(&features_2023, "load_t-168", 0), load_at(HOURS_2022 - 168));
    assert_eq!(f64_at(&features_2023, "load_t-24", 0), load_at(HOURS_2022 - 24));
    assert_eq!(f64_at(&features_2023, "load_t-1", 0), load_at(HOURS_2022 - 1));
    assert_eq!(f64_at(&features_2023, "target_load_t+1", 0), load_at(HOURS_2022 + 1));

    // Last row of 2023 still has a target (the dropped hour is the one after).
    let last = features_2023.height() - 1;
    assert_eq!(
        timestamps.get(last),
        Some(instant("2023-12-31T22:00:00Z"))
    );
    assert_eq!(
        f64_at(&features_2023, "target_load_t+1", last),
        load_at(HOURS_2022 + HOURS_2023 - 1)
    );

    // ISO week 53 never appears.
    let weeks = features_2023.column("week_of_year").unwrap().i32().unwrap();
    for idx in 0..features_2023.height() {
        let week = weeks.get(idx).expect("week present");
        assert!((1..=52).contains(&week));
    }
}
