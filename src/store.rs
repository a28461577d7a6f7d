//! PostgreSQL persistence for transformed batches and the audit log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::audit::{AuditRecord, AuditRow};
use crate::error::AuditError;
use crate::models::TransformedRecord;

// ---

/// A persisted transformed row, as re-read by the auditor.
#[derive(Debug, sqlx::FromRow)]
pub struct StoredRow {
    // ---
    pub sensor_id: Option<String>,
    pub timestamp: Option<String>,
    pub reading_type: Option<String>,
    pub value: Option<f64>,
}

impl From<StoredRow> for AuditRow {
    fn from(row: StoredRow) -> Self {
        AuditRow {
            sensor_id: row.sensor_id,
            timestamp: row.timestamp,
            reading_type: row.reading_type,
            value: row.value.into(),
        }
    }
}

/// One entry of the `quality_report` audit log.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StoredReport {
    // ---
    pub id: i32,
    pub batch_name: String,
    pub audited_at: DateTime<Utc>,
    pub total_records: Option<i64>,
    pub invalid_value_type: Option<i64>,
    pub invalid_timestamp: Option<i64>,
    pub outlier_pct: Option<String>,
    pub missing_pct: Option<String>,
    pub sensors_with_gaps: Option<i64>,
    pub total_missing_hours: Option<i64>,
    pub error: Option<String>,
}

/// Store a transformed batch, replacing any rows previously stored under the
/// same batch name. The batch is registered even when `records` is empty.
/// Returns the number of rows written.
pub async fn replace_batch(
    pool: &PgPool,
    batch: &str,
    records: &[TransformedRecord],
) -> Result<u64, sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM sensor_data WHERE batch_name = $1")
        .bind(batch)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if removed > 0 {
        tracing::debug!("Replacing {} stored rows of batch {}", removed, batch);
    }

    let mut written = 0;
    for r in records {
        written += sqlx::query(
            r#"
            INSERT INTO sensor_data (
                batch_name, sensor_id, reading_ts, reading_ts_ist, reading_date,
                reading_type, value, battery_level, daily_avg, rolling_7d_avg,
                anomalous_reading
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(batch)
        .bind(&r.sensor_id)
        .bind(&r.timestamp)
        .bind(&r.timestamp_ist)
        .bind(r.date)
        .bind(&r.reading_type)
        .bind(r.value)
        .bind(r.battery_level)
        .bind(r.daily_avg)
        .bind(r.rolling_7d_avg)
        .bind(r.anomalous_reading)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    sqlx::query(
        r#"
        INSERT INTO batch (name, row_count) VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE
            SET row_count = EXCLUDED.row_count, transformed_at = now()
        "#,
    )
    .bind(batch)
    .bind(written as i64)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(written)
}

/// Names of all stored batches.
pub async fn list_batches(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    // ---
    sqlx::query_scalar::<_, String>("SELECT name FROM batch ORDER BY name")
        .fetch_all(pool)
        .await
}

/// Re-read one stored batch in insertion order; `None` if the batch was
/// never stored.
pub async fn load_batch(
    pool: &PgPool,
    batch: &str,
) -> Result<Option<Vec<StoredRow>>, sqlx::Error> {
    // ---
    let known =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM batch WHERE name = $1)")
            .bind(batch)
            .fetch_one(pool)
            .await?;
    if !known {
        return Ok(None);
    }

    let rows = sqlx::query_as::<_, StoredRow>(
        r#"
        SELECT sensor_id, reading_ts AS timestamp, reading_type, value
        FROM sensor_data
        WHERE batch_name = $1
        ORDER BY id
        "#,
    )
    .bind(batch)
    .fetch_all(pool)
    .await?;

    Ok(Some(rows))
}

/// Audit rows for a batch as returned by [`load_batch`].
pub fn audit_rows(
    batch: &str,
    loaded: Result<Option<Vec<StoredRow>>, sqlx::Error>,
) -> Result<Vec<AuditRow>, AuditError> {
    match loaded? {
        Some(rows) => Ok(rows.into_iter().map(AuditRow::from).collect()),
        None => Err(AuditError::BatchNotFound(batch.to_string())),
    }
}

/// Serialize a per-type percentage map for the audit log.
fn encode_pct(pct: &BTreeMap<String, f64>) -> Result<String, sqlx::Error> {
    serde_json::to_string(pct).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Append one audit outcome to the audit log.
pub async fn append_report(pool: &PgPool, record: &AuditRecord) -> Result<(), sqlx::Error> {
    // ---
    match record {
        AuditRecord::Report(r) => {
            let outlier_pct = encode_pct(&r.outlier_pct)?;
            let missing_pct = encode_pct(&r.missing_pct)?;
            sqlx::query(
                r#"
                INSERT INTO quality_report (
                    batch_name, total_records, invalid_value_type, invalid_timestamp,
                    outlier_pct, missing_pct, sensors_with_gaps, total_missing_hours
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&r.batch)
            .bind(r.total_records as i64)
            .bind(r.invalid_value_type as i64)
            .bind(r.invalid_timestamp as i64)
            .bind(outlier_pct)
            .bind(missing_pct)
            .bind(r.sensors_with_gaps as i64)
            .bind(r.total_missing_hours as i64)
            .execute(pool)
            .await?;
        }
        AuditRecord::Failed { batch, error } => {
            sqlx::query("INSERT INTO quality_report (batch_name, error) VALUES ($1, $2)")
                .bind(batch)
                .bind(error)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

/// Read the audit log, newest first, optionally for one batch.
pub async fn list_reports(
    pool: &PgPool,
    batch: Option<&str>,
    limit: i64,
) -> Result<Vec<StoredReport>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, StoredReport>(
        r#"
        SELECT id, batch_name, audited_at, total_records, invalid_value_type,
               invalid_timestamp, outlier_pct, missing_pct, sensors_with_gaps,
               total_missing_hours, error
        FROM quality_report
        WHERE $1::TEXT IS NULL OR batch_name = $1
        ORDER BY id DESC
        LIMIT $2
        "#,
    )
    .bind(batch)
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::audit::AuditValue;

    #[test]
    fn test_stored_row_to_audit_row() {
        // ---
        let row = StoredRow {
            sensor_id: Some("s1".to_string()),
            timestamp: Some("2025-06-05T10:00:00".to_string()),
            reading_type: Some("temperature".to_string()),
            value: Some(f64::NAN),
        };

        let audit: AuditRow = row.into();

        assert_eq!(audit.sensor_id.as_deref(), Some("s1"));
        assert_eq!(audit.value, AuditValue::Malformed);
    }

    #[test]
    fn test_registered_empty_batch_audits_as_empty() {
        // ---
        let rows = audit_rows("all-dropped", Ok(Some(Vec::new()))).unwrap();
        assert!(rows.is_empty());

        let cfg = crate::SensorConfig::default();
        let report = crate::audit::QualityAuditor::new(&cfg, 100)
            .validate_batch("all-dropped", &rows)
            .unwrap();
        assert_eq!(report.total_records, 0);
        assert_eq!(report.sensors_with_gaps, 0);
    }

    #[test]
    fn test_unregistered_batch_is_not_found() {
        // ---
        let err = audit_rows("nope", Ok(None)).unwrap_err();
        assert!(matches!(err, AuditError::BatchNotFound(name) if name == "nope"));

        let err = audit_rows("b", Err(sqlx::Error::RowNotFound)).unwrap_err();
        assert!(matches!(err, AuditError::Storage(_)));
    }

    #[test]
    fn test_encode_pct() {
        // ---
        let pct = BTreeMap::from([("humidity".to_string(), 12.5), ("temp".to_string(), 0.0)]);
        assert_eq!(encode_pct(&pct).unwrap(), r#"{"humidity":12.5,"temp":0.0}"#);
    }
}
