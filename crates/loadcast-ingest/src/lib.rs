pub mod entsoe;
pub mod errors;
pub mod openmeteo;

pub use entsoe::parse_load_document;
pub use errors::IngestError;
pub use openmeteo::parse_archive_response;


use polars::prelude::*;

/// Casts an integer `timestamp` column to a UTC datetime column.
pub(crate) fn cast_timestamp_to_utc(df: DataFrame) -> Result<DataFrame, IngestError> {
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
