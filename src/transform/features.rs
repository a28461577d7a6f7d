//! Daily and rolling aggregates plus the config-driven anomaly flag.

use std::collections::{HashMap, VecDeque};

use chrono::NaiveDate;

use crate::models::TransformedRecord;
use crate::sensor_config::SensorConfig;
use crate::transform::timestamps::NormalizedReading;

/// Trailing window size for `rolling_7d_avg`, in samples.
pub const ROLLING_WINDOW: usize = 7;

// ---

pub struct FeatureDeriver<'a> {
    sensors: &'a SensorConfig,
}

impl<'a> FeatureDeriver<'a> {
    // ---
    pub fn new(sensors: &'a SensorConfig) -> Self {
        FeatureDeriver { sensors }
    }

    /// Enrich normalized rows with `date`, `daily_avg`, `rolling_7d_avg` and
    /// `anomalous_reading`.
    ///
    /// Output is ordered by `(sensor_id, timestamp)`; ties keep input order.
    /// The rolling average is count based: the mean of the current row and up
    /// to six preceding rows of the same sensor and reading type, whatever
    /// their spacing in time.
    pub fn derive_features(&self, mut rows: Vec<NormalizedReading>) -> Vec<TransformedRecord> {
        // ---
        let mut daily: HashMap<(&str, &str, NaiveDate), (f64, usize)> = HashMap::new();
        for row in &rows {
            let key = (
                row.reading.sensor_id.as_str(),
                row.reading.reading_type.as_str(),
                row.instant.date(),
            );
            let acc = daily.entry(key).or_insert((0.0, 0));
            if let Some(v) = row.reading.value {
                acc.0 += v;
                acc.1 += 1;
            }
        }
        let daily: HashMap<(String, String, NaiveDate), Option<f64>> = daily
            .into_iter()
            .map(|((s, t, d), (sum, n))| {
                let avg = (n > 0).then(|| sum / n as f64);
                ((s.to_string(), t.to_string(), d), avg)
            })
            .collect();

        rows.sort_by(|a, b| {
            a.reading
                .sensor_id
                .cmp(&b.reading.sensor_id)
                .then(a.instant.cmp(&b.instant))
        });

        let mut windows: HashMap<(String, String), VecDeque<Option<f64>>> = HashMap::new();
        let mut anomalous = 0;
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let NormalizedReading {
                reading,
                instant,
                timestamp_ist,
            } = row;
            let date = instant.date();

            let window = windows
                .entry((reading.sensor_id.clone(), reading.reading_type.clone()))
                .or_default();
            window.push_back(reading.value);
            if window.len() > ROLLING_WINDOW {
                window.pop_front();
            }
            let observed: Vec<f64> = window.iter().flatten().copied().collect();
            let rolling_7d_avg = crate::stats::mean(&observed);

            let daily_avg = daily
                .get(&(reading.sensor_id.clone(), reading.reading_type.clone(), date))
                .copied()
                .flatten();

            let bounds = self.sensors.bounds(&reading.reading_type);
            let anomalous_reading = !reading.value.is_some_and(|v| bounds.contains(v));
            if anomalous_reading {
                anomalous += 1;
            }

            records.push(TransformedRecord {
                sensor_id: reading.sensor_id,
                timestamp: reading.timestamp,
                timestamp_ist,
                date,
                reading_type: reading.reading_type,
                value: reading.value,
                battery_level: reading.battery_level,
                daily_avg,
                rolling_7d_avg,
                anomalous_reading,
            });
        }

        tracing::debug!(
            "Derived features for {} rows ({} anomalous)",
            records.len(),
            anomalous
        );
        records
    }
}
