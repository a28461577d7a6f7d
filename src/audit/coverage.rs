//! Hourly temporal-coverage check.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDateTime};

use crate::error::AuditError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageGaps {
    pub sensors_with_gaps: usize,
    pub total_missing_hours: usize,
}

/// Count expected hourly samples that have no exact-match timestamp.
///
/// For each sensor the grid runs from its earliest to its latest valid
/// timestamp in one-hour steps. Sensors with a single distinct timestamp
/// have no grid. A grid longer than `max_hours` is refused.
pub fn hourly_gaps<'a, I>(samples: I, max_hours: i64) -> Result<CoverageGaps, AuditError>
where
    I: IntoIterator<Item = (&'a str, NaiveDateTime)>,
{
    // ---
    let mut per_sensor: BTreeMap<&str, BTreeSet<NaiveDateTime>> = BTreeMap::new();
    for (sensor_id, ts) in samples {
        per_sensor.entry(sensor_id).or_default().insert(ts);
    }

    let mut gaps = CoverageGaps::default();
    for (sensor_id, actual) in &per_sensor {
        let (Some(&min_ts), Some(&max_ts)) = (actual.first(), actual.last()) else {
            continue;
        };
        if min_ts >= max_ts {
            continue;
        }

        let hours = (max_ts - min_ts).num_hours();
        if hours > max_hours {
            return Err(AuditError::CoverageSpan {
                sensor_id: sensor_id.to_string(),
                hours,
                limit: max_hours,
            });
        }

        let missing = (0..=hours)
            .map(|h| min_ts + Duration::hours(h))
            .filter(|expected| !actual.contains(expected))
            .count();

        if missing > 0 {
            tracing::debug!("Sensor {} missing {} hourly samples", sensor_id, missing);
            gaps.sensors_with_gaps += 1;
            gaps.total_missing_hours += missing;
        }
    }

    Ok(gaps)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_single_missing_hour() {
        // ---
        let samples = vec![("s1", at(0, 0)), ("s1", at(2, 0)), ("s1", at(3, 0))];

        let gaps = hourly_gaps(samples, 1000).unwrap();

        assert_eq!(gaps.sensors_with_gaps, 1);
        assert_eq!(gaps.total_missing_hours, 1);
    }

    #[test]
    fn test_full_coverage_contributes_nothing() {
        // ---
        let samples = vec![
            ("s1", at(0, 0)),
            ("s1", at(1, 0)),
            ("s1", at(2, 0)),
            // Duplicate timestamps collapse
            ("s1", at(2, 0)),
            ("s1", at(3, 0)),
            ("s2", at(0, 0)),
            ("s2", at(2, 0)),
        ];

        let gaps = hourly_gaps(samples, 1000).unwrap();

        assert_eq!(gaps.sensors_with_gaps, 1);
        assert_eq!(gaps.total_missing_hours, 1);
    }

    #[test]
    fn test_single_timestamp_sensor_skipped() {
        // ---
        let samples = vec![("s1", at(5, 0)), ("s1", at(5, 0))];
        assert_eq!(hourly_gaps(samples, 1000).unwrap(), CoverageGaps::default());
    }

    #[test]
    fn test_grid_anchored_at_first_sample() {
        // ---
        // Grid is 00:30, 01:30; the 01:00 sample matches neither.
        let samples = vec![("s1", at(0, 30)), ("s1", at(1, 0)), ("s1", at(1, 45))];

        let gaps = hourly_gaps(samples, 1000).unwrap();

        assert_eq!(gaps.total_missing_hours, 1);
    }

    #[test]
    fn test_span_over_limit_is_error() {
        // ---
        let samples = vec![("s1", at(0, 0)), ("s1", at(23, 0))];

        let err = hourly_gaps(samples, 10).unwrap_err();
        assert!(matches!(err, AuditError::CoverageSpan { hours: 23, limit: 10, .. }));
    }
}
