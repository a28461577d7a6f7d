//! Error types for the transformation and audit engine.
//!
//! Row-level faults (unparseable timestamps) are absorbed and counted by the
//! stage that meets them; batch-level faults are surfaced here so the caller
//! can record them against the one batch without halting the others.

use thiserror::Error;

/// A batch does not carry the columns (or column types) the engine requires.
///
/// Fatal to the batch being decoded, never to the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaViolation {
    /// Record is not a JSON object
    #[error("row {row} is not an object")]
    MalformedRow { row: usize },

    /// Required column absent from a record
    #[error("required column `{column}` missing at row {row}")]
    MissingColumn { column: &'static str, row: usize },

    /// Column present with a value of the wrong type
    #[error("column `{column}` at row {row} must be {expected}")]
    ColumnType {
        column: &'static str,
        row: usize,
        expected: &'static str,
    },
}

/// A timestamp matched none of the accepted layouts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable timestamp `{0}`")]
pub struct ParseFailure(pub String);

/// Failure while auditing one transformed batch.
///
/// Converted into an error-only report for that batch.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Persisted batch could not be read back
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// No persisted rows under this batch name
    #[error("batch `{0}` has no persisted rows")]
    BatchNotFound(String),

    /// Audited rows are missing a column or are not records
    #[error("malformed batch: {0}")]
    Schema(#[from] SchemaViolation),

    /// Hourly grid for one sensor would exceed the configured limit
    #[error("sensor `{sensor_id}` spans {hours} hours, above the {limit} hour audit limit")]
    CoverageSpan {
        sensor_id: String,
        hours: i64,
        limit: i64,
    },
}
