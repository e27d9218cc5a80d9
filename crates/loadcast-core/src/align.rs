use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::time::{check_hourly_contiguity, required_timestamp_micros};

/// Inner-joins two or more normalized hourly frames on `timestamp`,
/// restricting the result to the timestamp intersection.
///
/// The intersection is the only span every signal can support; extending any
/// input beyond another's coverage would fabricate data for the forecasting
/// task. The merged timeline is re-checked afterwards: a hole here means an
/// input slipped past the normalizer.
pub fn align_series(frames: &[DataFrame]) -> Result<DataFrame> {
    let mut iter = frames.iter();
    let first = iter
        .next()
        .ok_or_else(|| PipelineError::Alignment("no series to align".to_string()))?;

    let mut lf = first.clone().lazy();
    for frame in iter {
        lf = lf.join(
            frame.clone().lazy(),
            [col("timestamp")],
            [col("timestamp")],
            JoinArgs::new(JoinType::Inner),
        );
    }
    let aligned = lf.sort(["timestamp"], Default::default()).collect()?;

    verify_alignment(&aligned)?;
    Ok(aligned)
}

/// Post-merge invariants: contiguous hourly run, zero nulls in any source
/// column, and a single distinct country label when one is carried.
pub fn verify_alignment(df: &DataFrame) -> Result<()> {
    let micros = required_timestamp_micros(df, "post-merge timeline")?;
    check_hourly_contiguity(&micros, "post-merge timeline")?;

    for column in df.get_columns() {
        let nulls = column.null_count();
        if nulls > 0 {
            return Err(PipelineError::Alignment(format!(
                "column '{}' has {} null value(s) after merge",
                column.name(),
                nulls
            )));
        }
    }

    if let Ok(country_column) = df.column("country") {
        let countries = country_column.str()?;
        let mut expected: Option<&str> = None;
        for idx in 0..countries.len() {
            if let Some(country) = countries.get(idx) {
                match expected {
                    None => expected = Some(country),
                    Some(seen) if seen != country => {
                        return Err(PipelineError::InconsistentPartition {
                            expected: seen.to_string(),
                            found: country.to_string(),
                        });
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}
