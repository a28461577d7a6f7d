//! Post-hoc data quality audit of transformed batches.
//!
//! The auditor runs over batches that have already been transformed and
//! persisted, independently of the transform pipeline. Each batch yields one
//! [`AuditRecord`]: a full [`QualityReport`], or an error-only record when
//! the audit itself fails. A failing batch never stops the others.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuditError, SchemaViolation};
use crate::models::text_field;
use crate::sensor_config::SensorConfig;
use crate::transform::timestamps::parse_iso;

mod coverage;

use coverage::hourly_gaps;

/// Columns an audited record must carry.
pub const AUDIT_COLUMNS: [&str; 4] = ["sensor_id", "timestamp", "reading_type", "value"];

// ---

/// The `value` cell of an audited row.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditValue {
    Missing,
    Number(f64),
    /// Present but not a finite floating-point number
    Malformed,
}

impl From<Option<f64>> for AuditValue {
    fn from(v: Option<f64>) -> Self {
        match v {
            None => AuditValue::Missing,
            Some(n) if n.is_finite() => AuditValue::Number(n),
            Some(_) => AuditValue::Malformed,
        }
    }
}

/// One loosely typed row of a persisted, transformed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub sensor_id: Option<String>,
    pub timestamp: Option<String>,
    pub reading_type: Option<String>,
    pub value: AuditValue,
}

impl AuditRow {
    // ---
    /// Decode a JSON record. The audit columns must be present; a `value`
    /// of the wrong type is kept and counted rather than rejected.
    pub fn from_json(row: usize, record: &Value) -> Result<Self, SchemaViolation> {
        let obj = record
            .as_object()
            .ok_or(SchemaViolation::MalformedRow { row })?;

        if let Some(column) = AUDIT_COLUMNS
            .iter()
            .copied()
            .find(|c| !obj.contains_key(*c))
        {
            return Err(SchemaViolation::MissingColumn { column, row });
        }

        let value = match obj.get("value") {
            None | Some(Value::Null) => AuditValue::Missing,
            Some(Value::Number(n)) => n.as_f64().into(),
            Some(_) => AuditValue::Malformed,
        };

        Ok(AuditRow {
            sensor_id: text_field(obj, "sensor_id", row)?,
            timestamp: text_field(obj, "timestamp", row)?,
            reading_type: text_field(obj, "reading_type", row)?,
            value,
        })
    }

    pub fn from_json_records(records: &[Value]) -> Result<Vec<Self>, SchemaViolation> {
        records
            .iter()
            .enumerate()
            .map(|(row, record)| Self::from_json(row, record))
            .collect()
    }
}

/// Quality audit outcome for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub batch: String,
    pub total_records: usize,
    pub invalid_value_type: usize,
    pub invalid_timestamp: usize,
    #[serde(rename = "outlier_%")]
    pub outlier_pct: BTreeMap<String, f64>,
    #[serde(rename = "missing_%")]
    pub missing_pct: BTreeMap<String, f64>,
    pub sensors_with_gaps: usize,
    pub total_missing_hours: usize,
}

/// One entry of an audit run: a report, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditRecord {
    Report(QualityReport),
    Failed { batch: String, error: String },
}

impl AuditRecord {
    // ---
    pub fn from_result(batch: &str, result: Result<QualityReport, AuditError>) -> Self {
        match result {
            Ok(report) => AuditRecord::Report(report),
            Err(e) => {
                tracing::error!("Validation failed for {}: {}", batch, e);
                AuditRecord::Failed {
                    batch: batch.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    pub fn batch(&self) -> &str {
        match self {
            AuditRecord::Report(r) => &r.batch,
            AuditRecord::Failed { batch, .. } => batch,
        }
    }
}

#[derive(Default)]
struct TypeTally {
    rows: usize,
    out_of_range: usize,
    missing: usize,
}

pub struct QualityAuditor<'a> {
    sensors: &'a SensorConfig,
    max_coverage_hours: i64,
}

impl<'a> QualityAuditor<'a> {
    // ---
    pub fn new(sensors: &'a SensorConfig, max_coverage_hours: i64) -> Self {
        QualityAuditor {
            sensors,
            max_coverage_hours,
        }
    }

    /// Audit one transformed batch.
    ///
    /// Range and missing-value percentages cover only the reading types
    /// present in the batch. Rows without a reading type count towards the
    /// totals but not towards any per-type figure.
    pub fn validate_batch(&self, batch: &str, rows: &[AuditRow]) -> Result<QualityReport, AuditError> {
        // ---
        let mut invalid_value_type = 0;
        let mut invalid_timestamp = 0;
        let mut tallies: BTreeMap<&str, TypeTally> = BTreeMap::new();
        let mut samples = Vec::with_capacity(rows.len());

        for row in rows {
            if row.value == AuditValue::Malformed {
                invalid_value_type += 1;
            }

            match row.timestamp.as_deref().and_then(parse_iso) {
                Some(ts) => {
                    if let Some(sensor_id) = row.sensor_id.as_deref() {
                        samples.push((sensor_id, ts));
                    }
                }
                None => invalid_timestamp += 1,
            }

            if let Some(reading_type) = row.reading_type.as_deref() {
                let tally = tallies.entry(reading_type).or_default();
                tally.rows += 1;
                match row.value {
                    AuditValue::Missing => tally.missing += 1,
                    AuditValue::Number(v) if !self.sensors.bounds(reading_type).contains(v) => {
                        tally.out_of_range += 1
                    }
                    _ => {}
                }
            }
        }

        let gaps = hourly_gaps(samples, self.max_coverage_hours)?;

        let report = QualityReport {
            batch: batch.to_string(),
            total_records: rows.len(),
            invalid_value_type,
            invalid_timestamp,
            outlier_pct: tallies
                .iter()
                .map(|(rt, t)| (rt.to_string(), crate::stats::pct(t.out_of_range, t.rows)))
                .collect(),
            missing_pct: tallies
                .iter()
                .map(|(rt, t)| (rt.to_string(), crate::stats::pct(t.missing, t.rows)))
                .collect(),
            sensors_with_gaps: gaps.sensors_with_gaps,
            total_missing_hours: gaps.total_missing_hours,
        };

        tracing::info!(
            "Validation summary for {}: {} records, {} invalid values, {} invalid timestamps, \
             {} sensors with gaps ({} missing hours)",
            batch,
            report.total_records,
            report.invalid_value_type,
            report.invalid_timestamp,
            report.sensors_with_gaps,
            report.total_missing_hours
        );
        Ok(report)
    }

    /// Audit each batch independently, one record per input batch.
    pub fn audit_all<I>(&self, batches: I) -> Vec<AuditRecord>
    where
        I: IntoIterator<Item = (String, Result<Vec<AuditRow>, AuditError>)>,
    {
        batches
            .into_iter()
            .map(|(batch, rows)| {
                let result = rows.and_then(|rows| self.validate_batch(&batch, &rows));
                AuditRecord::from_result(&batch, result)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::sensor_config::{Calibration, ReadingTypeConfig};
    use serde_json::json;

    fn config() -> SensorConfig {
        SensorConfig::from_entries([(
            "temperature",
            ReadingTypeConfig {
                min: -40.0,
                max: 85.0,
                calibration: Calibration::IDENTITY,
            },
        )])
    }

    fn row(sensor: &str, ts: &str, rt: &str, value: AuditValue) -> AuditRow {
        AuditRow {
            sensor_id: Some(sensor.to_string()),
            timestamp: Some(ts.to_string()),
            reading_type: Some(rt.to_string()),
            value,
        }
    }

    fn num(v: f64) -> AuditValue {
        AuditValue::Number(v)
    }

    #[test]
    fn test_gap_detection() {
        // ---
        let cfg = config();
        let rows = vec![
            // s1 is missing 01:00
            row("s1", "2025-06-05T00:00:00", "temperature", num(20.0)),
            row("s1", "2025-06-05T02:00:00", "temperature", num(21.0)),
            row("s1", "2025-06-05T03:00:00", "temperature", num(22.0)),
            // s2 is complete
            row("s2", "2025-06-05T00:00:00", "temperature", num(20.0)),
            row("s2", "2025-06-05T01:00:00", "temperature", num(20.0)),
            row("s2", "2025-06-05T02:00:00", "temperature", num(20.0)),
        ];

        let report = QualityAuditor::new(&cfg, 1000)
            .validate_batch("b1", &rows)
            .unwrap();

        assert_eq!(report.total_records, 6);
        assert_eq!(report.sensors_with_gaps, 1);
        assert_eq!(report.total_missing_hours, 1);
    }

    #[test]
    fn test_range_and_missing_percentages() {
        // ---
        let cfg = config();
        let rows = vec![
            row("s1", "2025-06-05T00:00:00", "temperature", num(20.0)),
            row("s1", "2025-06-05T01:00:00", "temperature", num(90.0)),
            row("s1", "2025-06-05T02:00:00", "temperature", AuditValue::Missing),
            row("s2", "2025-06-05T00:00:00", "humidity", num(1e6)),
        ];

        let report = QualityAuditor::new(&cfg, 1000)
            .validate_batch("b1", &rows)
            .unwrap();

        assert_eq!(report.outlier_pct["temperature"], 33.33);
        assert_eq!(report.missing_pct["temperature"], 33.33);
        // Unconfigured type is unrestricted
        assert_eq!(report.outlier_pct["humidity"], 0.0);
        assert_eq!(report.missing_pct["humidity"], 0.0);
        assert_eq!(report.outlier_pct.len(), 2);
    }

    #[test]
    fn test_invalid_types_and_timestamps() {
        // ---
        let cfg = config();
        let mut no_ts = row("s1", "x", "temperature", num(1.0));
        no_ts.timestamp = None;
        let rows = vec![
            row("s1", "2025-06-05T00:00:00", "temperature", AuditValue::Malformed),
            row("s1", "not a time", "temperature", num(1.0)),
            no_ts,
        ];

        let report = QualityAuditor::new(&cfg, 1000)
            .validate_batch("b1", &rows)
            .unwrap();

        assert_eq!(report.invalid_value_type, 1);
        assert_eq!(report.invalid_timestamp, 2);
        // Malformed values are neither missing nor out of range
        assert_eq!(report.outlier_pct["temperature"], 0.0);
        assert_eq!(report.missing_pct["temperature"], 0.0);
    }

    #[test]
    fn test_empty_batch_report() {
        // ---
        let cfg = config();
        let report = QualityAuditor::new(&cfg, 1000)
            .validate_batch("empty", &[])
            .unwrap();

        assert_eq!(report.total_records, 0);
        assert!(report.outlier_pct.is_empty());
        assert_eq!(report.sensors_with_gaps, 0);
    }

    #[test]
    fn test_audit_all_isolates_failures() {
        // ---
        let cfg = config();
        let good = vec![row("s1", "2025-06-05T00:00:00", "temperature", num(1.0))];
        let too_long = vec![
            row("s1", "2025-01-01T00:00:00", "temperature", num(1.0)),
            row("s1", "2025-06-05T00:00:00", "temperature", num(1.0)),
        ];

        let records = QualityAuditor::new(&cfg, 100).audit_all(vec![
            ("a".to_string(), Ok(good.clone())),
            ("b".to_string(), Err(AuditError::BatchNotFound("b".to_string()))),
            ("c".to_string(), Ok(too_long)),
            ("d".to_string(), Ok(good)),
        ]);

        assert_eq!(records.len(), 4);
        assert!(matches!(records[0], AuditRecord::Report(_)));
        assert!(matches!(&records[1], AuditRecord::Failed { batch, .. } if batch == "b"));
        assert!(matches!(records[2], AuditRecord::Failed { .. }));
        assert!(matches!(records[3], AuditRecord::Report(_)));
        assert_eq!(records[2].batch(), "c");
    }

    #[test]
    fn test_decode_audit_rows() {
        // ---
        let records = vec![
            json!({"sensor_id": "s1", "timestamp": "2025-06-05T00:00:00",
                   "reading_type": "temperature", "value": 21.5}),
            json!({"sensor_id": "s1", "timestamp": "2025-06-05T01:00:00",
                   "reading_type": "temperature", "value": "n/a"}),
            json!({"sensor_id": "s1", "timestamp": null,
                   "reading_type": "temperature", "value": null}),
        ];

        let rows = AuditRow::from_json_records(&records).unwrap();

        assert_eq!(rows[0].value, AuditValue::Number(21.5));
        assert_eq!(rows[1].value, AuditValue::Malformed);
        assert_eq!(rows[2].value, AuditValue::Missing);
        assert_eq!(rows[2].timestamp, None);
    }

    #[test]
    fn test_decode_missing_column_fails() {
        // ---
        let records = vec![json!({"sensor_id": "s1", "timestamp": "2025-06-05T00:00:00",
                                  "value": 1.0})];

        let err = AuditRow::from_json_records(&records).unwrap_err();
        assert_eq!(
            err,
            SchemaViolation::MissingColumn {
                column: "reading_type",
                row: 0
            }
        );
    }

    #[test]
    fn test_non_finite_value_is_malformed() {
        // ---
        assert_eq!(AuditValue::from(Some(f64::NAN)), AuditValue::Malformed);
        assert_eq!(AuditValue::from(Some(f64::INFINITY)), AuditValue::Malformed);
        assert_eq!(AuditValue::from(None), AuditValue::Missing);
    }

    #[test]
    fn test_report_serializes_with_percent_keys() {
        // ---
        let cfg = config();
        let rows = vec![row("s1", "2025-06-05T00:00:00", "temperature", num(100.0))];
        let report = QualityAuditor::new(&cfg, 1000)
            .validate_batch("b1", &rows)
            .unwrap();

        let v = serde_json::to_value(AuditRecord::Report(report)).unwrap();
        assert_eq!(v["outlier_%"]["temperature"], 100.0);
        assert_eq!(v["batch"], "b1");

        let failed = AuditRecord::Failed {
            batch: "b2".to_string(),
            error: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(failed).unwrap(),
            json!({"batch": "b2", "error": "boom"})
        );
    }
}
