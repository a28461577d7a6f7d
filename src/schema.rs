//! Database schema management for `sensorflow-quality`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `batch` registry, the `sensor_data` table for transformed
/// batches and the append-only `quality_report` audit log. Safe to call on every startup;
/// no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per stored batch, present even when the batch kept no readings
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batch (
            name           TEXT        PRIMARY KEY,
            row_count      BIGINT      NOT NULL,
            transformed_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Transformed readings, one batch per `batch_name`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_data (
            id                SERIAL PRIMARY KEY,
            batch_name        TEXT             NOT NULL,
            sensor_id         TEXT             NOT NULL,
            reading_ts        TEXT             NOT NULL,
            reading_ts_ist    TEXT             NOT NULL,
            reading_date      DATE             NOT NULL,
            reading_type      TEXT             NOT NULL,
            value             DOUBLE PRECISION,
            battery_level     DOUBLE PRECISION,
            daily_avg         DOUBLE PRECISION,
            rolling_7d_avg    DOUBLE PRECISION,
            anomalous_reading BOOLEAN          NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Audit log; rows are only ever appended
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quality_report (
            id                  SERIAL PRIMARY KEY,
            batch_name          TEXT        NOT NULL,
            audited_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
            total_records       BIGINT,
            invalid_value_type  BIGINT,
            invalid_timestamp   BIGINT,
            outlier_pct         TEXT,
            missing_pct         TEXT,
            sensors_with_gaps   BIGINT,
            total_missing_hours BIGINT,
            error               TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_data_batch_name
            ON sensor_data (batch_name);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_data_sensor_date
            ON sensor_data (sensor_id, reading_date);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_quality_report_batch_name
            ON quality_report (batch_name);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
