//! Per-reading-type range bounds and calibration coefficients.
//!
//! Loaded once at startup from a JSON document keyed by reading type and
//! shared read-only (behind an `Arc`) by every stage. Reading types that are
//! not configured, and fields an entry leaves out, fall back to unrestricted
//! bounds and identity calibration.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

// ---

/// Inclusive `[min, max]` range for a reading type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const UNRESTRICTED: Bounds = Bounds {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    /// Pull `value` onto the nearest bound when it lies outside the range.
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }
}

/// Linear correction `value * multiplier + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Calibration {
    #[serde(default = "one")]
    pub multiplier: f64,
    #[serde(default)]
    pub offset: f64,
}

impl Calibration {
    pub const IDENTITY: Calibration = Calibration {
        multiplier: 1.0,
        offset: 0.0,
    };

    pub fn apply(&self, value: f64) -> f64 {
        value * self.multiplier + self.offset
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One entry of the sensor config document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadingTypeConfig {
    #[serde(default = "neg_infinity")]
    pub min: f64,
    #[serde(default = "infinity")]
    pub max: f64,
    #[serde(default)]
    pub calibration: Calibration,
}

fn one() -> f64 {
    1.0
}

fn neg_infinity() -> f64 {
    f64::NEG_INFINITY
}

fn infinity() -> f64 {
    f64::INFINITY
}

/// Immutable lookup from reading type to its config entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SensorConfig {
    types: HashMap<String, ReadingTypeConfig>,
}

impl SensorConfig {
    // ---
    #[cfg(test)]
    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, ReadingTypeConfig)>,
        K: Into<String>,
    {
        SensorConfig {
            types: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| anyhow!("Invalid sensor config: {}", e))
    }

    /// Load the config document at `path`.
    ///
    /// A missing file is not an error: the pipeline runs with every reading
    /// type unrestricted and uncalibrated, and a warning is logged. A file
    /// that exists but cannot be read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self> {
        // ---
        if !path.exists() {
            tracing::warn!(
                "Sensor config {} not found, using defaults for all reading types",
                path.display()
            );
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read sensor config '{}': {}", path.display(), e))?;
        let config = Self::from_json(&text)?;
        if config.is_empty() {
            tracing::warn!("Sensor config {} defines no reading types", path.display());
        }

        tracing::info!(
            "Loaded sensor config from {} ({} reading types)",
            path.display(),
            config.len()
        );
        Ok(config)
    }

    pub fn bounds(&self, reading_type: &str) -> Bounds {
        self.types
            .get(reading_type)
            .map_or(Bounds::UNRESTRICTED, |c| Bounds {
                min: c.min,
                max: c.max,
            })
    }

    pub fn calibration(&self, reading_type: &str) -> Calibration {
        self.types
            .get(reading_type)
            .map_or(Calibration::IDENTITY, |c| c.calibration)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::env;

    const DOC: &str = r#"{
        "temperature": { "min": -40, "max": 85,
                         "calibration": { "multiplier": 1.02, "offset": 0.5 } },
        "humidity":    { "min": 0, "max": 100 },
        "soil_ph":     { "calibration": { "offset": -0.1 } }
    }"#;

    #[test]
    fn test_configured_entry() {
        // ---
        let cfg = SensorConfig::from_json(DOC).unwrap();

        assert_eq!(cfg.len(), 3);
        assert_eq!(cfg.bounds("temperature"), Bounds { min: -40.0, max: 85.0 });
        let cal = cfg.calibration("temperature");
        assert_eq!(cal.multiplier, 1.02);
        assert_eq!(cal.offset, 0.5);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        // ---
        let cfg = SensorConfig::from_json(DOC).unwrap();

        // No calibration block
        assert!(cfg.calibration("humidity").is_identity());

        // No bounds, partial calibration
        assert_eq!(cfg.bounds("soil_ph"), Bounds::UNRESTRICTED);
        let cal = cfg.calibration("soil_ph");
        assert_eq!(cal.multiplier, 1.0);
        assert_eq!(cal.offset, -0.1);
    }

    #[test]
    fn test_unknown_type_is_unrestricted_identity() {
        // ---
        let cfg = SensorConfig::from_json(DOC).unwrap();

        assert_eq!(cfg.bounds("pressure"), Bounds::UNRESTRICTED);
        assert!(cfg.calibration("pressure").is_identity());
        assert!(cfg.bounds("pressure").contains(1e300));
    }

    #[test]
    fn test_bounds_clamp_and_contains() {
        // ---
        let b = Bounds { min: 0.0, max: 100.0 };

        assert_eq!(b.clamp(150.0), 100.0);
        assert_eq!(b.clamp(-5.0), 0.0);
        assert_eq!(b.clamp(42.0), 42.0);

        // Edges are inside the range
        assert!(b.contains(0.0));
        assert!(b.contains(100.0));
        assert!(!b.contains(100.01));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        // ---
        let path = env::temp_dir().join("sensorflow_quality_no_such_config.json");
        let _ = fs::remove_file(&path);

        let cfg = SensorConfig::load(&path).unwrap();
        assert!(cfg.is_empty());
    }

    #[test]
    fn test_load_malformed_file_errors() {
        // ---
        let path = env::temp_dir().join("sensorflow_quality_bad_config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(SensorConfig::load(&path).is_err());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_from_file() {
        // ---
        let path = env::temp_dir().join("sensorflow_quality_good_config.json");
        fs::write(&path, DOC).unwrap();

        let cfg = SensorConfig::load(&path).unwrap();
        assert_eq!(cfg.bounds("humidity"), Bounds { min: 0.0, max: 100.0 });

        fs::remove_file(&path).unwrap();
    }
}
