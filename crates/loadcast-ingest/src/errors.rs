use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("invalid timestamp '{value}': {message}")]
    InvalidTimestamp { value: String, message: String },

    #[error("invalid {field} '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("document contained no data points")]
    EmptyDocument,

    #[error("hourly array '{field}' has {actual} entries, expected {expected}")]
    MismatchedLengths {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}
