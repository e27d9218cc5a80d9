// crates/loadcast-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid timestamp micros {0}")]
    InvalidTimestamp(i64),

    #[error("hourly continuity violated in '{series}': {detail}")]
    Discontinuity { series: String, detail: String },

    #[error("aligned timeline check failed: {0}")]
    Alignment(String),

    #[error("mixed countries in a single-country build: expected '{expected}', found '{found}'")]
    InconsistentPartition { expected: String, found: String },

    #[error("feature table integrity violated: {0}")]
    FeatureIntegrity(String),

    #[error("no input data found for {country} in years {years:?}")]
    InsufficientData { country: String, years: Vec<i32> },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
