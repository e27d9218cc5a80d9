use std::collections::HashMap;

use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::time::{cast_timestamp_to_utc, datetime_from_micros, HOUR_MICROS};

/// Longest run of consecutive missing hours the normalizer may interpolate.
pub const DEFAULT_GAP_LIMIT: usize = 3;

/// Reindexes a raw, possibly irregular frame onto the full hourly grid
/// spanning its observed range.
///
/// Rows with null timestamps are dropped, duplicate timestamps keep the first
/// occurrence after sorting, and timestamps off the hourly lattice anchored at
/// the earliest observation become gaps. Numeric columns are linearly
/// interpolated across missing runs no longer than `gap_limit`; label columns
/// take the nearest valid value in either direction. Already-continuous input
/// passes through unchanged.
pub fn normalize_hourly(
    df: &DataFrame,
    numeric_cols: &[&str],
    label_cols: &[&str],
    gap_limit: usize,
) -> Result<DataFrame> {
    let timestamps = df.column("timestamp")?.datetime()?;

    let mut stamped: Vec<(i64, usize)> = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        if let Some(ts) = timestamps.get(idx) {
            stamped.push((ts, idx));
        }
    }
    stamped.sort_by_key(|&(ts, idx)| (ts, idx));

    let (Some(&(min_ts, _)), Some(&(max_ts, _))) = (stamped.first(), stamped.last()) else {
        return Err(PipelineError::Discontinuity {
            series: "timestamp".to_string(),
            detail: "no rows with a usable timestamp".to_string(),
        });
    };

    let mut row_for_hour: HashMap<i64, usize> = HashMap::with_capacity(stamped.len());
    for &(ts, idx) in &stamped {
        if (ts - min_ts) % HOUR_MICROS != 0 {
            continue;
        }
        row_for_hour.entry(ts).or_insert(idx);
    }
    if row_for_hour.len() < 2 {
        return Err(PipelineError::Discontinuity {
            series: "timestamp".to_string(),
            detail: format!(
                "only {} on-grid data point(s); at least 2 are required",
                row_for_hour.len()
            ),
        });
    }

    let grid_len = ((max_ts - min_ts) / HOUR_MICROS + 1) as usize;
    let grid: Vec<i64> = (0..grid_len)
        .map(|step| min_ts + step as i64 * HOUR_MICROS)
        .collect();

    let mut columns: Vec<Column> =
        Vec::with_capacity(1 + numeric_cols.len() + label_cols.len());
    columns.push(Series::new("timestamp".into(), &grid).into());

    for &name in numeric_cols {
        let source = df.column(name)?.f64()?;
        let mut values: Vec<Option<f64>> = grid
            .iter()
            .map(|ts| row_for_hour.get(ts).and_then(|&idx| source.get(idx)))
            .collect();
        interpolate_bounded(name, &grid, &mut values, gap_limit)?;
        columns.push(Series::new(name.into(), values).into());
    }

    for &name in label_cols {
        let source = df.column(name)?.str()?;
        let sparse: Vec<Option<&str>> = grid
            .iter()
            .map(|ts| row_for_hour.get(ts).and_then(|&idx| source.get(idx)))
            .collect();
        let filled = fill_nearest(&sparse);
        columns.push(Series::new(name.into(), filled).into());
    }

    cast_timestamp_to_utc(DataFrame::new(columns)?)
}

/// Linear interpolation over missing runs, bounded by `gap_limit`. Runs at
/// either edge of the grid clamp to the nearest valid value.
fn interpolate_bounded(
    name: &str,
    grid: &[i64],
    values: &mut [Option<f64>],
    gap_limit: usize,
) -> Result<()> {
    let len = values.len();
    let mut idx = 0;
    while idx < len {
        if values[idx].is_some() {
            idx += 1;
            continue;
        }
        let run_start = idx;
        while idx < len && values[idx].is_none() {
            idx += 1;
        }
        let run_len = idx - run_start;
        if run_len > gap_limit {
            return Err(PipelineError::Discontinuity {
                series: name.to_string(),
                detail: format!(
                    "gap of {run_len} consecutive missing hours starting at {} exceeds the interpolation limit of {gap_limit}",
                    datetime_from_micros(grid[run_start])?
                ),
            });
        }

        let before = run_start.checked_sub(1).and_then(|prev| values[prev]);
        let after = values.get(idx).copied().flatten();
        match (before, after) {
            (Some(lo), Some(hi)) => {
                let span = (run_len + 1) as f64;
                for (offset, slot) in values[run_start..idx].iter_mut().enumerate() {
                    let fraction = (offset + 1) as f64 / span;
                    *slot = Some(lo + (hi - lo) * fraction);
                }
            }
            (Some(edge), None) | (None, Some(edge)) => {
                for slot in values[run_start..idx].iter_mut() {
                    *slot = Some(edge);
                }
            }
            (None, None) => {
                return Err(PipelineError::Discontinuity {
                    series: name.to_string(),
                    detail: "no valid values to interpolate from".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Fills each missing slot with the nearest valid value in either direction,
/// preferring the earlier one on ties.
fn fill_nearest<'a>(sparse: &[Option<&'a str>]) -> Vec<Option<&'a str>> {
    let len = sparse.len();
    let mut previous: Vec<Option<(usize, &'a str)>> = Vec::with_capacity(len);
    let mut last_seen: Option<(usize, &'a str)> = None;
    for (idx, slot) in sparse.iter().enumerate() {
        if let Some(value) = slot {
            last_seen = Some((idx, value));
        }
        previous.push(last_seen);
    }

    let mut filled = vec![None; len];
    let mut next_seen: Option<(usize, &'a str)> = None;
    for idx in (0..len).rev() {
        if let Some(value) = sparse[idx] {
            next_seen = Some((idx, value));
            filled[idx] = Some(value);
            continue;
        }
        filled[idx] = match (previous[idx], next_seen) {
            (Some((prev_idx, prev)), Some((next_idx, next))) => {
                if idx - prev_idx <= next_idx - idx {
                    Some(prev)
                } else {
                    Some(next)
                }
            }
            (Some((_, prev)), None) => Some(prev),
            (None, Some((_, next))) => Some(next),
            (None, None) => None,
        };
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    use crate::time::micros_from_datetime;

    fn micros(ts: &str) -> i64 {
        micros_from_datetime(ts.parse::<DateTime<Utc>>().expect("valid timestamp"))
    }

    fn raw_frame(timestamps: Vec<i64>, load: Vec<Option<f64>>) -> DataFrame {
        let df = df![
            "timestamp" => timestamps,
            "load_mw" => load,
        ]
        .expect("frame construction");
        cast_timestamp_to_utc(df).expect("timestamp cast")
    }

    fn hourly_range(start: &str, hours: usize) -> Vec<i64> {
        let base = micros(start);
        (0..hours).map(|step| base + step as i64 * HOUR_MICROS).collect()
    }

    fn load_values(df: &DataFrame) -> Vec<Option<f64>> {
        let chunked = df.column("load_mw").unwrap().f64().unwrap();
        (0..df.height()).map(|idx| chunked.get(idx)).collect()
    }

    #[test]
    fn continuous_input_is_a_no_op() {
        let timestamps = hourly_range("2023-01-01T00:00:00Z", 24);
        let load: Vec<Option<f64>> = (0..24).map(|idx| Some(idx as f64)).collect();
        let df = raw_frame(timestamps, load.clone());

        let normalized = normalize_hourly(&df, &["load_mw"], &[], DEFAULT_GAP_LIMIT)
            .expect("continuous input normalizes");

        assert_eq!(normalized.height(), 24);
        assert_eq!(load_values(&normalized), load);
    }

    #[test]
    fn fills_single_missing_hour_in_constant_series() {
        // 2023-01-01T00:00 through 2023-01-10T00:00, constant 100.0, with
        // 2023-01-05T12:00 missing.
        let missing = micros("2023-01-05T12:00:00Z");
        let timestamps: Vec<i64> = hourly_range("2023-01-01T00:00:00Z", 9 * 24 + 1)
            .into_iter()
            .filter(|&ts| ts != missing)
            .collect();
        let load = vec![Some(100.0); timestamps.len()];
        let df = raw_frame(timestamps, load);

        let normalized =
            normalize_hourly(&df, &["load_mw"], &[], DEFAULT_GAP_LIMIT).expect("gap of one fills");

        assert_eq!(normalized.height(), 9 * 24 + 1);
        assert!(load_values(&normalized)
            .iter()
            .all(|value| *value == Some(100.0)));
    }

    #[test]
    fn rejects_gap_beyond_limit() {
        let hole_start = micros("2023-01-05T10:00:00Z");
        let hole_end = hole_start + 5 * HOUR_MICROS;
        let timestamps: Vec<i64> = hourly_range("2023-01-01T00:00:00Z", 9 * 24 + 1)
            .into_iter()
            .filter(|&ts| ts < hole_start || ts >= hole_end)
            .collect();
        let load = vec![Some(100.0); timestamps.len()];
        let df = raw_frame(timestamps, load);

        let err = normalize_hourly(&df, &["load_mw"], &[], DEFAULT_GAP_LIMIT)
            .expect_err("five missing hours exceed limit 3");
        assert!(matches!(err, PipelineError::Discontinuity { .. }));
    }

    #[test]
    fn interpolates_interior_gap_linearly() {
        let base = micros("2023-01-01T00:00:00Z");
        let timestamps = vec![base, base + 2 * HOUR_MICROS, base + 3 * HOUR_MICROS];
        let df = raw_frame(timestamps, vec![Some(0.0), Some(10.0), Some(10.0)]);

        let normalized =
            normalize_hourly(&df, &["load_mw"], &[], DEFAULT_GAP_LIMIT).expect("normalizes");

        assert_eq!(
            load_values(&normalized),
            vec![Some(0.0), Some(5.0), Some(10.0), Some(10.0)]
        );
    }

    #[test]
    fn sorts_and_keeps_first_duplicate() {
        let base = micros("2023-01-01T00:00:00Z");
        let timestamps = vec![base + HOUR_MICROS, base, base + HOUR_MICROS];
        let df = raw_frame(timestamps, vec![Some(2.0), Some(1.0), Some(99.0)]);

        let normalized =
            normalize_hourly(&df, &["load_mw"], &[], DEFAULT_GAP_LIMIT).expect("normalizes");

        assert_eq!(normalized.height(), 2);
        assert_eq!(load_values(&normalized), vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn off_grid_timestamp_becomes_a_gap() {
        let base = micros("2023-01-01T00:00:00Z");
        let timestamps = vec![base, base + HOUR_MICROS / 2, base + HOUR_MICROS];
        let df = raw_frame(timestamps, vec![Some(1.0), Some(50.0), Some(3.0)]);

        let normalized =
            normalize_hourly(&df, &["load_mw"], &[], DEFAULT_GAP_LIMIT).expect("normalizes");

        // The half-hour reading is not on the grid; only the two hourly points
        // survive.
        assert_eq!(normalized.height(), 2);
        assert_eq!(load_values(&normalized), vec![Some(1.0), Some(3.0)]);
    }

    #[test]
    fn rejects_single_data_point() {
        let df = raw_frame(vec![micros("2023-01-01T00:00:00Z")], vec![Some(1.0)]);
        let err = normalize_hourly(&df, &["load_mw"], &[], DEFAULT_GAP_LIMIT)
            .expect_err("one point is not a series");
        assert!(matches!(err, PipelineError::Discontinuity { .. }));
    }

    #[test]
    fn labels_fill_from_nearest_row() {
        let base = micros("2023-01-01T00:00:00Z");
        let timestamps = vec![base, base + 2 * HOUR_MICROS];
        let df = df![
            "timestamp" => timestamps,
            "load_mw" => vec![Some(1.0), Some(3.0)],
            "country" => vec![Some("FR"), Some("FR")],
        ]
        .expect("frame construction");
        let df = cast_timestamp_to_utc(df).expect("timestamp cast");

        let normalized = normalize_hourly(&df, &["load_mw"], &["country"], DEFAULT_GAP_LIMIT)
            .expect("normalizes");

        let countries = normalized.column("country").unwrap().str().unwrap();
        assert_eq!(normalized.height(), 3);
        for idx in 0..normalized.height() {
            assert_eq!(countries.get(idx), Some("FR"));
        }
    }
}
