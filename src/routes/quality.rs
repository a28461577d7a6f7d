use std::sync::Arc;

use axum::{
    extract::Query,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::batches::{named_batches, BatchPayload};
use super::AppState;
use crate::audit::{AuditRecord, AuditRow, QualityAuditor};
use crate::error::AuditError;
use crate::store;
use crate::SensorConfig;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/quality/audit", post(audit_handler))
        .route("/quality/validate", post(validate_handler))
        .route("/quality/reports", get(reports_handler))
}

#[derive(Debug, Default, Deserialize)]
struct AuditRequest {
    /// Stored batches to audit; all of them when absent
    #[serde(default)]
    batches: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    batches: Vec<BatchPayload>,
}

/// Query parameters for the audit log
#[derive(Debug, Deserialize)]
struct ReportsQuery {
    batch: Option<String>,
    limit: Option<u32>,
}

type LoadedBatch = (String, Result<Vec<AuditRow>, AuditError>);

/// An audit outcome as returned by `POST /quality/audit`.
#[derive(Debug, Serialize)]
struct LoggedRecord {
    #[serde(flatten)]
    record: AuditRecord,
    /// Whether the outcome was appended to the audit log
    logged: bool,
}

/// Audit loaded batches on the blocking pool.
async fn run_audit(
    sensors: Arc<SensorConfig>,
    max_coverage_hours: u32,
    batches: Vec<LoadedBatch>,
) -> Result<Vec<AuditRecord>, tokio::task::JoinError> {
    // ---
    tokio::task::spawn_blocking(move || {
        QualityAuditor::new(&sensors, i64::from(max_coverage_hours)).audit_all(batches)
    })
    .await
}

/// Audit a single loaded batch on the blocking pool.
async fn audit_one(
    sensors: Arc<SensorConfig>,
    max_coverage_hours: u32,
    (batch, rows): LoadedBatch,
) -> Result<AuditRecord, tokio::task::JoinError> {
    // ---
    tokio::task::spawn_blocking(move || {
        let auditor = QualityAuditor::new(&sensors, i64::from(max_coverage_hours));
        let result = rows.and_then(|rows| auditor.validate_batch(&batch, &rows));
        AuditRecord::from_result(&batch, result)
    })
    .await
}

/// Handle `POST /quality/audit`: re-read persisted batches and audit them one
/// at a time, appending each outcome to the audit log before loading the next.
async fn audit_handler(
    State((pool, config, sensors)): State<AppState>,
    Json(req): Json<AuditRequest>,
) -> impl IntoResponse {
    // ---
    info!("POST /quality/audit - Starting data quality validation");

    // Step 1: Resolve which batches to audit
    debug!("POST /quality/audit - Step 1");

    let names = match req.batches {
        Some(names) => names,
        None => match store::list_batches(&pool).await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list stored batches: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json("Failed to list batches"),
                )
                    .into_response();
            }
        },
    };
    if names.is_empty() {
        info!("No transformed batches found, nothing to audit");
    }

    // Step 2: Load, audit and log each batch in turn
    debug!("POST /quality/audit - Step 2");

    let mut results = Vec::with_capacity(names.len());
    for name in names {
        let rows = store::audit_rows(&name, store::load_batch(&pool, &name).await);

        let audited = audit_one(
            Arc::clone(&sensors),
            config.audit_max_coverage_hours,
            (name, rows),
        )
        .await;
        let record = match audited {
            Ok(record) => record,
            Err(e) => {
                error!("Audit worker failed: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, Json("Audit worker failed"))
                    .into_response();
            }
        };

        let logged = match store::append_report(&pool, &record).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to append report for {}: {}", record.batch(), e);
                false
            }
        };
        results.push(LoggedRecord { record, logged });
    }

    info!("Data quality validation complete: {} reports", results.len());
    (StatusCode::OK, Json(results)).into_response()
}

/// Handle `POST /quality/validate`: audit records supplied in the request,
/// without touching storage.
async fn validate_handler(
    State((_pool, config, sensors)): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> impl IntoResponse {
    // ---
    info!("POST /quality/validate - {} batches", req.batches.len());

    let loaded: Vec<LoadedBatch> = named_batches(req.batches)
        .into_iter()
        .map(|(name, records)| {
            let rows = AuditRow::from_json_records(&records).map_err(AuditError::from);
            (name, rows)
        })
        .collect();

    match run_audit(sensors, config.audit_max_coverage_hours, loaded).await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => {
            error!("Audit worker failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json("Audit worker failed")).into_response()
        }
    }
}

/// Handle `GET /quality/reports`: the audit log, newest first.
async fn reports_handler(
    Query(params): Query<ReportsQuery>,
    State((pool, _config, _sensors)): State<AppState>,
) -> impl IntoResponse {
    // ---
    let limit = i64::from(params.limit.unwrap_or(100));

    match store::list_reports(&pool, params.batch.as_deref(), limit).await {
        Ok(reports) => (StatusCode::OK, Json(reports)).into_response(),
        Err(e) => {
            error!("Failed to read quality reports: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Failed to read reports"),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_logged_record_flattens_outcome() {
        // ---
        let entry = LoggedRecord {
            record: AuditRecord::Failed {
                batch: "b1".to_string(),
                error: "storage error".to_string(),
            },
            logged: false,
        };

        let v = serde_json::to_value(&entry).unwrap();

        assert_eq!(v["batch"], "b1");
        assert_eq!(v["error"], "storage error");
        assert_eq!(v["logged"], false);
    }
}
