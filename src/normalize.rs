//! Maps raw store documents onto the canonical [`Event`] record.
//!
//! Two document layouts are in circulation:
//!
//! - head count: `{terminal_id, head_count, timestamp, processing_time_ms?}`
//! - picture batch: `{terminal_id, pic_id, num_ppl, timestamp_received,
//!   timestamp_processed, processing_time_ms?}`
//!
//! Documents without a usable occupancy count are dropped here. That is a
//! data-quality filter, so it is logged at debug level and never reported
//! as an error.

use crate::store::RawDocument;
use serde_json::Value;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::debug;

const LOCATION_FIELD: &str = "terminal_id";
const SERVICE_TIME_FIELD: &str = "processing_time_ms";
const DOCUMENT_ID_FIELD: &str = "_id";

/// Epoch values at or above this magnitude are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub location_id: String,
    pub observed_at: OffsetDateTime,
    pub occupancy_count: u32,
    pub service_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    HeadCount,
    PictureBatch,
}

impl SchemaVariant {
    /// Picks the variant by its occupancy field; `num_ppl` wins when both are present.
    pub fn detect(document: &RawDocument) -> Option<Self> {
        [SchemaVariant::PictureBatch, SchemaVariant::HeadCount]
            .into_iter()
            .find(|variant| document.get(variant.occupancy_field()).is_some())
    }

    pub fn occupancy_field(self) -> &'static str {
        match self {
            SchemaVariant::HeadCount => "head_count",
            SchemaVariant::PictureBatch => "num_ppl",
        }
    }

    /// Timestamp fields in order of preference.
    pub fn timestamp_fields(self) -> &'static [&'static str] {
        match self {
            SchemaVariant::HeadCount => &["timestamp"],
            SchemaVariant::PictureBatch => &["timestamp_received", "timestamp_processed"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingOccupancy,
    InvalidOccupancy,
    MissingLocation,
    MissingTimestamp,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DropReason::MissingOccupancy => "missing occupancy",
            DropReason::InvalidOccupancy => "invalid occupancy",
            DropReason::MissingLocation => "missing location",
            DropReason::MissingTimestamp => "missing or unparseable timestamp",
        };
        f.write_str(reason)
    }
}

/// Normalizes every document, silently dropping the ones that cannot form an event.
pub fn normalize(rows: &[RawDocument]) -> Vec<Event> {
    let mut events = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for row in rows {
        match normalize_document(row) {
            Ok(event) => events.push(event),
            Err(reason) => {
                dropped += 1;
                debug!(document_id = %row.id, reason = %reason, "Dropped document");
            }
        }
    }

    if dropped > 0 {
        debug!(kept = events.len(), dropped, "Normalized documents");
    }
    events
}

pub fn normalize_document(document: &RawDocument) -> Result<Event, DropReason> {
    let variant = SchemaVariant::detect(document).ok_or(DropReason::MissingOccupancy)?;

    let occupancy_count = document
        .get(variant.occupancy_field())
        .and_then(parse_count)
        .ok_or(DropReason::InvalidOccupancy)?;

    let location_id = document
        .get(LOCATION_FIELD)
        .and_then(parse_location)
        .ok_or(DropReason::MissingLocation)?;

    let observed_at = variant
        .timestamp_fields()
        .iter()
        .find_map(|field| document.get(field).and_then(parse_timestamp))
        .ok_or(DropReason::MissingTimestamp)?;

    let service_time_ms = document.get(SERVICE_TIME_FIELD).and_then(parse_service_time);

    let id = document
        .get(DOCUMENT_ID_FIELD)
        .and_then(Value::as_str)
        .unwrap_or(document.id.as_str())
        .to_string();

    Ok(Event {
        id,
        location_id,
        observed_at,
        occupancy_count,
        service_time_ms,
    })
}

fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

fn parse_count(value: &Value) -> Option<u32> {
    if let Some(count) = value.as_u64() {
        return u32::try_from(count).ok();
    }
    let number = parse_number(value)?;
    if number < 0.0 || number.fract() != 0.0 || number > f64::from(u32::MAX) {
        return None;
    }
    Some(number as u32)
}

fn parse_service_time(value: &Value) -> Option<f64> {
    parse_number(value).filter(|ms| *ms >= 0.0)
}

fn parse_location(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339, naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` (as UTC) and Unix
/// epoch seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::Number(_) => parse_number(value).and_then(from_epoch),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = OffsetDateTime::parse(text, &Rfc3339) {
                return Some(parsed);
            }
            if let Ok(epoch) = text.parse::<f64>() {
                return from_epoch(epoch);
            }
            parse_naive(text)
        }
        _ => None,
    }
}

fn parse_naive(text: &str) -> Option<OffsetDateTime> {
    let format = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    let normalized = text.replacen('T', " ", 1);
    PrimitiveDateTime::parse(&normalized, &format)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn from_epoch(epoch: f64) -> Option<OffsetDateTime> {
    if !epoch.is_finite() {
        return None;
    }
    let seconds = if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
        epoch / 1_000.0
    } else {
        epoch
    };
    let nanos = (seconds * 1e9).round() as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}
