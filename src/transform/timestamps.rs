//! Timestamp parsing and normalization.
//!
//! Timestamps arrive in whatever layout the sensor gateway produced. They are
//! parsed as ISO-8601 first, then as the US `MM/DD/YYYY hh:mm AM|PM` layout,
//! and rewritten as `YYYY-MM-DDTHH:MM:SS`. The parsed wall-clock time is taken
//! as-is (no zone conversion).
//!
//! `timestamp_ist` is the same instant shifted by a fixed +05:30. This is a
//! civil-time offset, not a timezone conversion: there is no DST handling and
//! no lookup in a timezone database.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use crate::error::ParseFailure;
use crate::models::CleanReading;

/// Canonical output layout for both timestamp columns.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Layout tried once every ISO-8601 layout has failed.
pub const FALLBACK_FORMAT: &str = "%m/%d/%Y %I:%M %p";

/// Fixed shift applied for `timestamp_ist` (+05:30).
pub const IST_OFFSET_MINUTES: i64 = 5 * 60 + 30;

const ISO_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// ---

/// A cleaned reading whose timestamp has been parsed and rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    pub reading: CleanReading,
    pub instant: NaiveDateTime,
    pub timestamp_ist: String,
}

/// Parse a strict ISO-8601 timestamp.
///
/// Accepts offset-qualified RFC 3339 (the written wall-clock time is kept),
/// naive date-times with `T` or space separators, optional seconds and
/// fractional seconds, and bare dates (midnight).
pub fn parse_iso(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    ISO_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse with the ISO layouts first, then the `MM/DD/YYYY hh:mm AM|PM` fallback.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ParseFailure> {
    parse_iso(raw)
        .or_else(|| NaiveDateTime::parse_from_str(raw.trim(), FALLBACK_FORMAT).ok())
        .ok_or_else(|| ParseFailure(raw.to_string()))
}

pub fn format_canonical(instant: NaiveDateTime) -> String {
    instant.format(CANONICAL_FORMAT).to_string()
}

/// Shift to +05:30. `None` when the result is past the representable range.
pub fn to_ist(instant: NaiveDateTime) -> Option<NaiveDateTime> {
    instant.checked_add_signed(Duration::minutes(IST_OFFSET_MINUTES))
}

/// Parse `raw` and compute its IST counterpart; both must be representable.
fn normalize(raw: &str) -> Result<(NaiveDateTime, NaiveDateTime), ParseFailure> {
    let instant = parse_timestamp(raw)?;
    let ist = to_ist(instant).ok_or_else(|| ParseFailure(raw.to_string()))?;
    Ok((instant, ist))
}

#[derive(Debug, Default)]
pub struct TimestampNormalizer;

impl TimestampNormalizer {
    // ---
    pub fn new() -> Self {
        TimestampNormalizer
    }

    /// Normalize every row, dropping the ones whose timestamp cannot be
    /// parsed. Returns the surviving rows and the number dropped.
    pub fn process(&self, rows: Vec<CleanReading>) -> (Vec<NormalizedReading>, usize) {
        // ---
        let total = rows.len();
        let mut normalized = Vec::with_capacity(total);

        for mut reading in rows {
            match normalize(&reading.timestamp) {
                Ok((instant, ist)) => {
                    reading.timestamp = format_canonical(instant);
                    normalized.push(NormalizedReading {
                        reading,
                        instant,
                        timestamp_ist: format_canonical(ist),
                    });
                }
                Err(e) => tracing::trace!("Dropping row for sensor {}: {}", reading.sensor_id, e),
            }
        }

        let dropped = total - normalized.len();
        if dropped > 0 {
            tracing::warn!("Dropping {} rows with invalid timestamps", dropped);
        }
        tracing::debug!("{} valid timestamps normalized", normalized.len());

        (normalized, dropped)
    }
}
