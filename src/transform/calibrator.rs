//! Linear per-reading-type calibration.

use std::collections::BTreeMap;

use crate::models::CleanReading;
use crate::sensor_config::{Calibration, SensorConfig};

// ---

pub struct Calibrator<'a> {
    sensors: &'a SensorConfig,
}

impl<'a> Calibrator<'a> {
    // ---
    pub fn new(sensors: &'a SensorConfig) -> Self {
        Calibrator { sensors }
    }

    /// Apply `value * multiplier + offset` to every row, using the
    /// coefficients of the row's reading type. Unconfigured types get the
    /// identity. Returns the coefficients applied per type present.
    pub fn apply_calibration(&self, rows: &mut [CleanReading]) -> BTreeMap<String, Calibration> {
        // ---
        let mut applied = BTreeMap::new();

        for row in rows.iter_mut() {
            let cal = *applied
                .entry(row.reading_type.clone())
                .or_insert_with(|| self.sensors.calibration(&row.reading_type));
            row.value = row.value.map(|v| cal.apply(v));
        }

        for (reading_type, cal) in &applied {
            if !cal.is_identity() {
                tracing::debug!(
                    "Applied calibration for {}: value = value * {} + {}",
                    reading_type,
                    cal.multiplier,
                    cal.offset
                );
            }
        }

        applied
    }
}
