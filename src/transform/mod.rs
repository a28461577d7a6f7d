//! Transformation pipeline gateway.
//!
//! A batch runs Cleaner → Calibrator → TimestampNormalizer → FeatureDeriver,
//! strictly in that order; each stage depends on the shape the previous one
//! produced. Batches share nothing but the read-only [`SensorConfig`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::SchemaViolation;
use crate::models::{Batch, TransformedRecord};
use crate::sensor_config::{Calibration, SensorConfig};

mod calibrator;
mod cleaner;
mod features;
mod profile;
pub mod timestamps;

use calibrator::Calibrator;
use cleaner::{Cleaner, CleaningSummary};
use features::FeatureDeriver;
use profile::profile_batch;
use timestamps::TimestampNormalizer;

pub use profile::BatchProfile;

// ---

/// Per-stage counts for one transformed batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformSummary {
    pub input_rows: usize,
    #[serde(flatten)]
    pub cleaning: CleaningSummary,
    pub calibration: BTreeMap<String, Calibration>,
    pub invalid_timestamps: usize,
    pub output_rows: usize,
    pub anomalous_rows: usize,
}

#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub batch: String,
    pub records: Vec<TransformedRecord>,
    pub summary: TransformSummary,
    /// Ingest profile of the batch as decoded, before cleaning
    pub profile: BatchProfile,
}

/// Run one decoded batch through every stage.
pub fn transform_batch(batch: Batch, sensors: &SensorConfig) -> TransformOutcome {
    // ---
    let input_rows = batch.len();
    let profile = profile_batch(&batch.readings, sensors);
    let Batch { name, readings } = batch;

    let cleaned = Cleaner::new(sensors).clean(readings);
    let mut rows = cleaned.readings;

    let calibration = Calibrator::new(sensors).apply_calibration(&mut rows);

    let (normalized, invalid_timestamps) = TimestampNormalizer::new().process(rows);

    let records = FeatureDeriver::new(sensors).derive_features(normalized);

    let summary = TransformSummary {
        input_rows,
        cleaning: cleaned.summary,
        calibration,
        invalid_timestamps,
        output_rows: records.len(),
        anomalous_rows: records.iter().filter(|r| r.anomalous_reading).count(),
    };

    tracing::info!(
        "Batch {} transformed: {} -> {} rows ({} invalid timestamps, {} anomalous)",
        name,
        summary.input_rows,
        summary.output_rows,
        summary.invalid_timestamps,
        summary.anomalous_rows
    );

    TransformOutcome {
        batch: name,
        records,
        summary,
        profile,
    }
}

/// Decode and transform a batch of JSON records.
///
/// Schema violations reject only this batch; callers running several batches
/// record the error against it and carry on with the rest.
pub fn transform_records(
    name: &str,
    records: &[Value],
    sensors: &SensorConfig,
) -> Result<TransformOutcome, SchemaViolation> {
    // ---
    let batch = Batch::from_json_records(name, records).inspect_err(|e| {
        tracing::error!("Batch {} rejected: {}", name, e);
    })?;
    Ok(transform_batch(batch, sensors))
}
