//! Data models for the transformation pipeline.
//!
//! A batch moves through progressively stronger types: raw [`Reading`]s as
//! decoded from the ingestion payload, [`CleanReading`]s once identity fields
//! are guaranteed, and finally [`TransformedRecord`]s carrying the derived
//! features that are persisted for analytics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchemaViolation;

// ---

/// Columns every ingested record must carry (values may be null).
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "sensor_id",
    "timestamp",
    "reading_type",
    "value",
    "battery_level",
];

/// One raw row of a batch, exactly as ingested.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reading {
    // ---
    pub sensor_id: Option<String>,
    pub timestamp: Option<String>,
    pub reading_type: Option<String>,
    pub value: Option<f64>,
    pub battery_level: Option<f64>,
}

/// All readings from one ingestion unit.
#[derive(Debug, Clone)]
pub struct Batch {
    // ---
    pub name: String,
    pub readings: Vec<Reading>,
}

impl Batch {
    // ---
    pub fn new(name: impl Into<String>, readings: Vec<Reading>) -> Self {
        Batch {
            name: name.into(),
            readings,
        }
    }

    /// Decode a batch from JSON records, checking the required columns.
    ///
    /// Every record must be an object holding all of [`REQUIRED_COLUMNS`];
    /// identity columns must be strings or null and numeric columns numbers
    /// or null. The first violation rejects the whole batch.
    pub fn from_json_records(
        name: impl Into<String>,
        records: &[Value],
    ) -> Result<Self, SchemaViolation> {
        // ---
        let readings = records
            .iter()
            .enumerate()
            .map(|(row, record)| Reading::from_json(row, record))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Batch::new(name, readings))
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }
}

impl Reading {
    // ---
    fn from_json(row: usize, record: &Value) -> Result<Self, SchemaViolation> {
        let obj = record
            .as_object()
            .ok_or(SchemaViolation::MalformedRow { row })?;

        if let Some(column) = REQUIRED_COLUMNS
            .iter()
            .copied()
            .find(|c| !obj.contains_key(*c))
        {
            return Err(SchemaViolation::MissingColumn { column, row });
        }

        Ok(Reading {
            sensor_id: text_field(obj, "sensor_id", row)?,
            timestamp: text_field(obj, "timestamp", row)?,
            reading_type: text_field(obj, "reading_type", row)?,
            value: number_field(obj, "value", row)?,
            battery_level: number_field(obj, "battery_level", row)?,
        })
    }
}

pub(crate) fn text_field(
    obj: &Map<String, Value>,
    column: &'static str,
    row: usize,
) -> Result<Option<String>, SchemaViolation> {
    match obj.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(SchemaViolation::ColumnType {
            column,
            row,
            expected: "a string or null",
        }),
    }
}

fn number_field(
    obj: &Map<String, Value>,
    column: &'static str,
    row: usize,
) -> Result<Option<f64>, SchemaViolation> {
    match obj.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(_) => Err(SchemaViolation::ColumnType {
            column,
            row,
            expected: "a number or null",
        }),
    }
}

/// A reading that survived cleaning.
///
/// `value` and `battery_level` are only `None` when the batch held no
/// observation at all for that column, leaving nothing to impute from.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanReading {
    // ---
    pub sensor_id: String,
    pub timestamp: String,
    pub reading_type: String,
    pub value: Option<f64>,
    pub battery_level: Option<f64>,
}

/// Fully transformed reading, ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedRecord {
    // ---
    pub sensor_id: String,
    pub timestamp: String,
    pub timestamp_ist: String,
    pub date: NaiveDate,
    pub reading_type: String,
    pub value: Option<f64>,
    pub battery_level: Option<f64>,
    pub daily_avg: Option<f64>,
    pub rolling_7d_avg: Option<f64>,
    pub anomalous_reading: bool,
}
