//! Ingest profile of a decoded batch, taken before any cleaning.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::models::Reading;
use crate::sensor_config::{Bounds, SensorConfig};
use crate::stats::{mean, ratio, round2};

/// Battery level is a percentage.
const BATTERY_BOUNDS: Bounds = Bounds {
    min: 0.0,
    max: 100.0,
};

// ---

/// Avg/min/max of the non-null observations of one column, to two decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ColumnSpread {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnSpread {
    fn of(values: &[f64]) -> Self {
        // ---
        let min = values.iter().copied().reduce(f64::min);
        let max = values.iter().copied().reduce(f64::max);
        ColumnSpread {
            avg: mean(values).map(round2),
            min: min.map(round2),
            max: max.map(round2),
        }
    }
}

/// Raw figures for one reading type; `reading_type` is `None` for the rows
/// that carry none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeProfile {
    pub reading_type: Option<String>,
    pub record_count: usize,
    pub value: ColumnSpread,
    pub battery_level: ColumnSpread,
}

/// Share of null cells per required column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MissingRatios {
    pub sensor_id: f64,
    pub timestamp: f64,
    pub reading_type: f64,
    pub value: f64,
    pub battery_level: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchProfile {
    pub reading_summary: Vec<TypeProfile>,
    pub missing_data_ratio: MissingRatios,
    pub distinct_sensors: usize,
    pub distinct_reading_types: usize,
    /// Values outside their reading type's configured bounds
    pub value_out_of_range: usize,
    /// Battery levels outside 0..=100
    pub battery_out_of_range: usize,
}

/// Profile raw readings as ingested. Nulls are excluded from the spreads
/// and distinct counts but counted in the missing ratios.
pub fn profile_batch(readings: &[Reading], sensors: &SensorConfig) -> BatchProfile {
    // ---
    let total = readings.len();
    let mut groups: BTreeMap<Option<&str>, (usize, Vec<f64>, Vec<f64>)> = BTreeMap::new();
    let mut sensors_seen = HashSet::new();
    let mut missing = [0usize; 5];
    let mut value_out_of_range = 0;
    let mut battery_out_of_range = 0;

    for r in readings {
        let reading_type = r.reading_type.as_deref();
        let (count, values, batteries) = groups.entry(reading_type).or_default();
        *count += 1;

        if let Some(v) = r.value {
            values.push(v);
            let bounds = reading_type.map_or(Bounds::UNRESTRICTED, |rt| sensors.bounds(rt));
            if !bounds.contains(v) {
                value_out_of_range += 1;
            }
        }
        if let Some(b) = r.battery_level {
            batteries.push(b);
            if !BATTERY_BOUNDS.contains(b) {
                battery_out_of_range += 1;
            }
        }
        if let Some(sensor_id) = r.sensor_id.as_deref() {
            sensors_seen.insert(sensor_id);
        }

        let nulls = [
            r.sensor_id.is_none(),
            r.timestamp.is_none(),
            r.reading_type.is_none(),
            r.value.is_none(),
            r.battery_level.is_none(),
        ];
        for (slot, is_null) in missing.iter_mut().zip(nulls) {
            *slot += usize::from(is_null);
        }
    }

    let distinct_reading_types = groups.keys().filter(|k| k.is_some()).count();
    let reading_summary = groups
        .into_iter()
        .map(|(reading_type, (record_count, values, batteries))| TypeProfile {
            reading_type: reading_type.map(str::to_string),
            record_count,
            value: ColumnSpread::of(&values),
            battery_level: ColumnSpread::of(&batteries),
        })
        .collect();

    let [sensor_id, timestamp, reading_type, value, battery_level] =
        missing.map(|n| ratio(n, total));

    BatchProfile {
        reading_summary,
        missing_data_ratio: MissingRatios {
            sensor_id,
            timestamp,
            reading_type,
            value,
            battery_level,
        },
        distinct_sensors: sensors_seen.len(),
        distinct_reading_types,
        value_out_of_range,
        battery_out_of_range,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::sensor_config::{Calibration, ReadingTypeConfig};

    fn reading(
        sensor: Option<&str>,
        rt: Option<&str>,
        value: Option<f64>,
        battery: Option<f64>,
    ) -> Reading {
        Reading {
            sensor_id: sensor.map(str::to_string),
            timestamp: Some("2025-06-05T10:00:00".to_string()),
            reading_type: rt.map(str::to_string),
            value,
            battery_level: battery,
        }
    }

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

    #[test]
    fn test_profile_per_type_and_ratios() {
        // ---
        let rows = vec![
            reading(Some("s1"), Some("temperature"), Some(20.0), Some(90.0)),
            reading(Some("s1"), Some("temperature"), Some(25.56), Some(80.0)),
            reading(Some("s2"), Some("temperature"), Some(120.0), None),
            reading(Some("s2"), Some("humidity"), None, Some(150.0)),
            reading(None, None, Some(1.0), Some(50.0)),
        ];

        let p = profile_batch(&rows, &config());

        assert_eq!(p.distinct_sensors, 2);
        assert_eq!(p.distinct_reading_types, 2);
        assert_eq!(p.reading_summary.len(), 3);

        // Null reading type sorts first
        assert_eq!(p.reading_summary[0].reading_type, None);
        assert_eq!(p.reading_summary[0].record_count, 1);

        let humidity = &p.reading_summary[1];
        assert_eq!(humidity.reading_type.as_deref(), Some("humidity"));
        assert_eq!(humidity.value, ColumnSpread::default());
        assert_eq!(humidity.battery_level.max, Some(150.0));

        let temp = &p.reading_summary[2];
        assert_eq!(temp.record_count, 3);
        assert_eq!(temp.value.min, Some(20.0));
        assert_eq!(temp.value.max, Some(120.0));
        assert_eq!(temp.value.avg, Some(55.19));
        assert_eq!(temp.battery_level.avg, Some(85.0));

        assert_eq!(p.missing_data_ratio.sensor_id, 0.2);
        assert_eq!(p.missing_data_ratio.timestamp, 0.0);
        assert_eq!(p.missing_data_ratio.value, 0.2);
        assert_eq!(p.missing_data_ratio.battery_level, 0.2);

        assert_eq!(p.value_out_of_range, 1);
        assert_eq!(p.battery_out_of_range, 1);
    }

    #[test]
    fn test_profile_empty_batch() {
        // ---
        let p = profile_batch(&[], &config());
        assert_eq!(p, BatchProfile::default());
    }
}
