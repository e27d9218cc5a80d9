//! Parser for ENTSO-E Transparency Platform "Actual Total Load" documents
//! (GL_MarketDocument XML). Pure text-to-frame: fetching, retry and caching
//! live with the caller.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use polars::prelude::*;
use quick_xml::events::Event;
use quick_xml::name::LocalName;
use quick_xml::Reader;

use crate::errors::IngestError;
use crate::cast_timestamp_to_utc;

/// Parses a load document into a raw demand frame with columns `timestamp`,
/// `load_mw` and `country`.
///
/// Every `<Point>` is placed at `period start + (position - 1) * resolution`.
/// Ordering, duplicates and gaps are passed through untouched; the hourly
/// normalizer downstream owns cleanup.
pub fn parse_load_document(xml: &str, country: &str) -> Result<DataFrame, IngestError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut timestamps: Vec<i64> = Vec::new();
    let mut quantities: Vec<f64> = Vec::new();

    let mut active_tag: Option<String> = None;
    let mut in_period = false;
    let mut in_point = false;
    let mut period_start: Option<DateTime<Utc>> = None;
    let mut resolution_minutes: i64 = 60;
    let mut position: Option<i64> = None;
    let mut quantity: Option<f64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                let tag = local_name_as_str(&name);
                match tag {
                    "Period" => {
                        in_period = true;
                        period_start = None;
                        resolution_minutes = 60;
                    }
                    "Point" => {
                        in_point = true;
                        position = None;
                        quantity = None;
                    }
                    _ => {}
                }
                active_tag = Some(tag.to_string());
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape()?.trim().to_string();
                match active_tag.as_deref() {
                    Some("start") if in_period && !in_point => {
                        period_start = Some(parse_entsoe_instant(&text)?);
                    }
                    Some("resolution") if in_period && !in_point => {
                        resolution_minutes = parse_resolution_minutes(&text)?;
                    }
                    Some("position") if in_point => {
                        position = Some(text.parse::<i64>().map_err(|_| {
                            IngestError::InvalidField {
                                field: "position",
                                value: text.clone(),
                            }
                        })?);
                    }
                    Some("quantity") if in_point => {
                        quantity = Some(text.parse::<f64>().map_err(|_| {
                            IngestError::InvalidField {
                                field: "quantity",
                                value: text.clone(),
                            }
                        })?);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                match local_name_as_str(&name) {
                    "Point" => {
                        if let (Some(start), Some(pos), Some(value)) =
                            (period_start, position, quantity)
                        {
                            let instant =
                                start + Duration::minutes((pos - 1) * resolution_minutes);
                            timestamps.push(instant.timestamp_micros());
                            quantities.push(value);
                        }
                        in_point = false;
                    }
                    "Period" => in_period = false,
                    _ => {}
                }
                active_tag = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(err.into()),
        }
    }

    if timestamps.is_empty() {
        return Err(IngestError::EmptyDocument);
    }

    let height = timestamps.len();
    let df = DataFrame::new(vec![
        Series::new("timestamp".into(), timestamps).into(),
        Series::new("load_mw".into(), quantities).into(),
        Series::new("country".into(), vec![country; height]).into(),
    ])?;
    cast_timestamp_to_utc(df)
}

fn local_name_as_str<'a>(name: &'a LocalName<'a>) -> &'a str {
    std::str::from_utf8(name.as_ref()).unwrap_or("")
}

/// ENTSO-E emits minute-precision instants such as `2023-01-01T00:00Z`;
/// second precision and explicit offsets also occur.
fn parse_entsoe_instant(value: &str) -> Result<DateTime<Utc>, IngestError> {
    for format in ["%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%SZ"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|err| IngestError::InvalidTimestamp {
            value: value.to_string(),
            message: err.to_string(),
        })
}

/// ISO-8601 durations as ENTSO-E uses them: PT60M, PT30M, PT15M, P1D.
fn parse_resolution_minutes(value: &str) -> Result<i64, IngestError> {
    if value == "P1D" {
        return Ok(24 * 60);
    }
    if let Some(minutes) = value
        .strip_prefix("PT")
        .and_then(|rest| rest.strip_suffix('M'))
        .and_then(|digits| digits.parse::<i64>().ok())
    {
        if minutes > 0 {
            return Ok(minutes);
        }
    }
    Err(IngestError::InvalidField {
        field: "resolution",
        value: value.to_string(),
    })
}
