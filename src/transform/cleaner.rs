//! Deduplication, imputation and outlier correction.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::models::{CleanReading, Reading};
use crate::sensor_config::SensorConfig;
use crate::stats::{mean, median, stddev};

/// Groups smaller than this fall back to range clamping.
pub const MIN_ZSCORE_SAMPLE: usize = 5;

/// `|z|` above which a value is replaced by the group median.
pub const ZSCORE_LIMIT: f64 = 3.0;

// ---

/// Which correction policy a reading-type group went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Small sample: values clamped into configured bounds
    RangeClamp,
    /// Values with `|z| > 3` replaced by the group median
    ZscoreMedian,
    /// Zero spread: nothing can be an outlier
    ZeroVariance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierCorrection {
    pub policy: OutlierPolicy,
    pub corrected: usize,
}

/// What the cleaner changed in one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningSummary {
    pub duplicates_dropped: usize,
    pub incomplete_dropped: usize,
    pub values_imputed: usize,
    pub battery_imputed: usize,
    pub outliers: BTreeMap<String, OutlierCorrection>,
}

#[derive(Debug, Clone)]
pub struct CleanedBatch {
    pub readings: Vec<CleanReading>,
    pub summary: CleaningSummary,
}

pub struct Cleaner<'a> {
    sensors: &'a SensorConfig,
}

impl<'a> Cleaner<'a> {
    // ---
    pub fn new(sensors: &'a SensorConfig) -> Self {
        Cleaner { sensors }
    }

    /// Dedup, drop incomplete rows, impute gaps, then correct outliers per
    /// reading type. Input order is preserved for surviving rows.
    pub fn clean(&self, readings: Vec<Reading>) -> CleanedBatch {
        // ---
        let mut summary = CleaningSummary::default();
        let input = readings.len();

        let mut seen = HashSet::new();
        let unique: Vec<Reading> = readings
            .into_iter()
            .filter(|r| {
                seen.insert((
                    r.sensor_id.clone(),
                    r.timestamp.clone(),
                    r.reading_type.clone(),
                ))
            })
            .collect();
        summary.duplicates_dropped = input - unique.len();

        let deduped = unique.len();
        let mut rows: Vec<CleanReading> = unique
            .into_iter()
            .filter_map(|r| match (r.sensor_id, r.timestamp, r.reading_type) {
                (Some(sensor_id), Some(timestamp), Some(reading_type)) => Some(CleanReading {
                    sensor_id,
                    timestamp,
                    reading_type,
                    value: r.value,
                    battery_level: r.battery_level,
                }),
                _ => None,
            })
            .collect();
        summary.incomplete_dropped = deduped - rows.len();

        summary.values_imputed = impute(&mut rows, |r| &mut r.value);
        summary.battery_imputed = impute(&mut rows, |r| &mut r.battery_level);

        for (reading_type, indices) in group_by_type(&rows) {
            let correction = self.correct_group(&reading_type, &indices, &mut rows);
            if correction.corrected > 0 {
                tracing::warn!(
                    "{}: corrected {} values ({:?})",
                    reading_type,
                    correction.corrected,
                    correction.policy
                );
            }
            summary.outliers.insert(reading_type, correction);
        }

        tracing::debug!(
            "Cleaning complete: {} -> {} rows ({} duplicates, {} incomplete)",
            input,
            rows.len(),
            summary.duplicates_dropped,
            summary.incomplete_dropped
        );

        CleanedBatch {
            readings: rows,
            summary,
        }
    }

    fn correct_group(
        &self,
        reading_type: &str,
        indices: &[usize],
        rows: &mut [CleanReading],
    ) -> OutlierCorrection {
        // ---
        if indices.len() < MIN_ZSCORE_SAMPLE {
            let bounds = self.sensors.bounds(reading_type);
            let mut corrected = 0;
            for &i in indices {
                if let Some(v) = rows[i].value {
                    if !bounds.contains(v) {
                        rows[i].value = Some(bounds.clamp(v));
                        corrected += 1;
                    }
                }
            }
            return OutlierCorrection {
                policy: OutlierPolicy::RangeClamp,
                corrected,
            };
        }

        let values: Vec<f64> = indices.iter().filter_map(|&i| rows[i].value).collect();
        let (Some(mu), Some(med)) = (mean(&values), median(&values)) else {
            return OutlierCorrection {
                policy: OutlierPolicy::ZeroVariance,
                corrected: 0,
            };
        };
        let sigma = stddev(&values, mu);

        if sigma == 0.0 {
            return OutlierCorrection {
                policy: OutlierPolicy::ZeroVariance,
                corrected: 0,
            };
        }

        let mut corrected = 0;
        for &i in indices {
            if let Some(v) = rows[i].value {
                if (v - mu).abs() / sigma > ZSCORE_LIMIT {
                    rows[i].value = Some(med);
                    corrected += 1;
                }
            }
        }

        OutlierCorrection {
            policy: OutlierPolicy::ZscoreMedian,
            corrected,
        }
    }
}

/// Replace nulls in one column with the mean of its non-null entries.
/// Returns how many entries were filled.
fn impute<F>(rows: &mut [CleanReading], column: F) -> usize
where
    F: Fn(&mut CleanReading) -> &mut Option<f64>,
{
    let observed: Vec<f64> = rows.iter_mut().filter_map(|r| *column(r)).collect();
    let Some(fill) = mean(&observed) else {
        return 0;
    };

    let mut filled = 0;
    for row in rows.iter_mut() {
        let slot = column(row);
        if slot.is_none() {
            *slot = Some(fill);
            filled += 1;
        }
    }
    filled
}

/// Row indices per reading type.
fn group_by_type(rows: &[CleanReading]) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        groups.entry(row.reading_type.clone()).or_default().push(i);
    }
    groups
}
