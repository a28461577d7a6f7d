use std::sync::Arc;

use axum::{
    extract::Query, extract::State, http::StatusCode, response::IntoResponse, routing::post, Json,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::AppState;
use crate::models::TransformedRecord;
use crate::store;
use crate::transform::{transform_records, BatchProfile, TransformSummary};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/batches/transform", post(handler))
}

/// One ingestion unit in a request body.
#[derive(Debug, Deserialize)]
pub(super) struct BatchPayload {
    /// Batch identifier; a UUID is assigned when absent
    pub name: Option<String>,
    pub records: Vec<Value>,
}

/// Resolve batch names, assigning a fresh UUID to unnamed batches.
pub(super) fn named_batches(batches: Vec<BatchPayload>) -> Vec<(String, Vec<Value>)> {
    batches
        .into_iter()
        .map(|b| {
            let name = b.name.unwrap_or_else(|| Uuid::new_v4().to_string());
            (name, b.records)
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct TransformRequest {
    batches: Vec<BatchPayload>,
}

/// Query parameters for the transform endpoint
#[derive(Debug, Deserialize)]
struct TransformQuery {
    /// Echo transformed records in the response (default: true)
    include_records: Option<bool>,
}

/// Outcome of one batch, in request order.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum BatchResult {
    Transformed {
        batch: String,
        persisted: u64,
        summary: TransformSummary,
        profile: BatchProfile,
        #[serde(skip_serializing_if = "Option::is_none")]
        records: Option<Vec<TransformedRecord>>,
    },
    Failed {
        batch: String,
        error: String,
    },
}

async fn handler(
    Query(params): Query<TransformQuery>,
    State((pool, _config, sensors)): State<AppState>,
    Json(req): Json<TransformRequest>,
) -> impl IntoResponse {
    // ---
    info!("POST /batches/transform - {} batches", req.batches.len());
    let include_records = params.include_records.unwrap_or(true);

    // Step 1: Run the engine off the async runtime
    debug!("POST /batches/transform - Step 1");

    let batches = named_batches(req.batches);
    let engine_sensors = Arc::clone(&sensors);
    let outcomes = match tokio::task::spawn_blocking(move || {
        batches
            .into_iter()
            .map(|(name, records)| {
                let span = tracing::info_span!("transform", batch = %name);
                let _guard = span.enter();
                let outcome = transform_records(&name, &records, &engine_sensors);
                (name, outcome)
            })
            .collect::<Vec<_>>()
    })
    .await
    {
        Ok(outcomes) => outcomes,
        Err(e) => {
            error!("Transform worker failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json("Transform worker failed"),
            )
                .into_response();
        }
    };

    // Step 2: Persist each transformed batch
    debug!("POST /batches/transform - Step 2");

    let mut results = Vec::with_capacity(outcomes.len());
    for (name, outcome) in outcomes {
        let result = match outcome {
            Ok(out) => match store::replace_batch(&pool, &out.batch, &out.records).await {
                Ok(persisted) => BatchResult::Transformed {
                    batch: out.batch,
                    persisted,
                    summary: out.summary,
                    profile: out.profile,
                    records: include_records.then_some(out.records),
                },
                Err(e) => {
                    error!("Failed to store batch {}: {}", name, e);
                    BatchResult::Failed {
                        batch: name,
                        error: format!("storage error: {}", e),
                    }
                }
            },
            Err(e) => BatchResult::Failed {
                batch: name,
                error: e.to_string(),
            },
        };
        results.push(result);
    }

    let failed = results
        .iter()
        .filter(|r| matches!(r, BatchResult::Failed { .. }))
        .count();
    info!(
        "Transform complete: {} batches, {} failed",
        results.len(),
        failed
    );
    (StatusCode::OK, Json(results)).into_response()
}
