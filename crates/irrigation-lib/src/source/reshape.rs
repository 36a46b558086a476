//! Pivot raw sensor rows into measurement batches
//!
//! Rows are grouped by `measurement_id`. A batch is emitted only when all
//! five sensors of the monitored set reported for that measurement; partial
//! batches are dropped and counted, never imputed.

use crate::error::{PipelineError, PipelineResult};
use crate::models::{MeasurementBatch, RawReading, SensorReadings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Canonical field a sensor reading fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorField {
    Phosphorus,
    Potassium,
    Ph,
    Humidity,
    Pump,
}

/// Exact sensor names reported by the field stations
pub const SENSOR_TABLE: [(&str, SensorField); 5] = [
    ("Sensor Fosforo ESP32", SensorField::Phosphorus),
    ("Sensor Potassio ESP32", SensorField::Potassium),
    ("Sensor pH ESP32", SensorField::Ph),
    ("Sensor Umidade ESP32", SensorField::Humidity),
    ("Sensor Bomba ESP32", SensorField::Pump),
];

impl SensorField {
    /// Exact lookup; no substring matching
    pub fn from_sensor_name(name: &str) -> Option<Self> {
        SENSOR_TABLE
            .iter()
            .find(|(sensor, _)| *sensor == name)
            .map(|(_, field)| *field)
    }

    fn slot(&self) -> usize {
        match self {
            SensorField::Phosphorus => 0,
            SensorField::Potassium => 1,
            SensorField::Ph => 2,
            SensorField::Humidity => 3,
            SensorField::Pump => 4,
        }
    }
}

/// What to do when a measurement has two readings for the same sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The later reading in input order replaces the earlier one
    #[default]
    LastWriteWins,
    /// Fail the reshape with `DataQuality`
    Reject,
}

/// Configuration for reshaping
#[derive(Debug, Clone, Default)]
pub struct ReshapeConfig {
    pub duplicate_policy: DuplicatePolicy,
}

/// Result of a reshape pass
#[derive(Debug, Clone, Default)]
pub struct ReshapeOutcome {
    /// Complete batches in ascending measurement id order
    pub batches: Vec<MeasurementBatch>,
    /// Measurements discarded for missing at least one sensor
    pub dropped_incomplete: usize,
    /// Readings that replaced an earlier value for the same sensor
    pub duplicates_overwritten: usize,
    /// Readings from sensors outside the mapping table
    pub unrecognized_readings: usize,
}

#[derive(Debug)]
struct PartialBatch {
    timestamp: DateTime<Utc>,
    values: [Option<f64>; 5],
}

/// Groups raw readings into measurement batches
#[derive(Debug, Clone, Default)]
pub struct Reshaper {
    config: ReshapeConfig,
}

impl Reshaper {
    pub fn new(config: ReshapeConfig) -> Self {
        Self { config }
    }

    pub fn reshape(&self, readings: &[RawReading]) -> PipelineResult<ReshapeOutcome> {
        let mut groups: BTreeMap<i64, PartialBatch> = BTreeMap::new();
        let mut outcome = ReshapeOutcome::default();

        for reading in readings {
            let Some(field) = SensorField::from_sensor_name(&reading.sensor_name) else {
                outcome.unrecognized_readings += 1;
                continue;
            };

            let partial = groups
                .entry(reading.measurement_id)
                .or_insert_with(|| PartialBatch {
                    timestamp: reading.timestamp,
                    values: [None; 5],
                });
            partial.timestamp = partial.timestamp.min(reading.timestamp);

            let slot = &mut partial.values[field.slot()];
            if let Some(previous) = *slot {
                match self.config.duplicate_policy {
                    DuplicatePolicy::Reject => {
                        return Err(PipelineError::DataQuality(format!(
                            "measurement {} has more than one '{}' reading",
                            reading.measurement_id, reading.sensor_name
                        )));
                    }
                    DuplicatePolicy::LastWriteWins => {
                        warn!(
                            measurement_id = reading.measurement_id,
                            sensor = %reading.sensor_name,
                            previous = previous,
                            replacement = reading.value,
                            "Duplicate sensor reading, keeping the later value"
                        );
                        outcome.duplicates_overwritten += 1;
                    }
                }
            }
            *slot = Some(reading.value);
        }

        for (measurement_id, partial) in groups {
            match partial.values {
                [Some(phosphorus), Some(potassium), Some(ph), Some(humidity), Some(pump)] => {
                    outcome.batches.push(MeasurementBatch {
                        measurement_id,
                        timestamp: partial.timestamp,
                        readings: SensorReadings {
                            phosphorus_present: phosphorus,
                            potassium_present: potassium,
                            ph,
                            humidity_pct: humidity,
                        },
                        pump_active: pump,
                    });
                }
                values => {
                    let missing: Vec<&str> = SENSOR_TABLE
                        .iter()
                        .filter(|(_, field)| values[field.slot()].is_none())
                        .map(|(name, _)| *name)
                        .collect();
                    debug!(measurement_id, missing = ?missing, "Dropping incomplete batch");
                    outcome.dropped_incomplete += 1;
                }
            }
        }

        info!(
            readings = readings.len(),
            batches = outcome.batches.len(),
            dropped_incomplete = outcome.dropped_incomplete,
            duplicates_overwritten = outcome.duplicates_overwritten,
            unrecognized = outcome.unrecognized_readings,
            "Reshaped sensor readings"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 8, 0, 0).unwrap()
    }

    fn full_measurement(id: i64, values: [f64; 5]) -> Vec<RawReading> {
        SENSOR_TABLE
            .iter()
            .zip(values)
            .enumerate()
            .map(|(i, ((name, _), value))| RawReading {
                measurement_id: id,
                timestamp: base_time() + Duration::seconds(i as i64),
                sensor_name: name.to_string(),
                value,
            })
            .collect()
    }

    #[test]
    fn test_complete_measurement_yields_one_batch() {
        let readings = full_measurement(42, [1.0, 0.0, 6.5, 35.0, 1.0]);
        let outcome = Reshaper::default().reshape(&readings).unwrap();

        assert_eq!(outcome.batches.len(), 1);
        let batch = &outcome.batches[0];
        assert_eq!(batch.measurement_id, 42);
        assert_eq!(batch.timestamp, base_time());
        assert_eq!(batch.readings.phosphorus_present, 1.0);
        assert_eq!(batch.readings.potassium_present, 0.0);
        assert_eq!(batch.readings.ph, 6.5);
        assert_eq!(batch.readings.humidity_pct, 35.0);
        assert_eq!(batch.pump_active, 1.0);
        assert_eq!(outcome.dropped_incomplete, 0);
    }

    #[test]
    fn test_removing_any_sensor_drops_the_batch() {
        for skip in 0..SENSOR_TABLE.len() {
            let mut readings = full_measurement(7, [1.0, 1.0, 7.0, 50.0, 0.0]);
            readings.remove(skip);
            let outcome = Reshaper::default().reshape(&readings).unwrap();
            assert!(outcome.batches.is_empty(), "sensor {} removed", skip);
            assert_eq!(outcome.dropped_incomplete, 1);
        }
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut readings = full_measurement(2, [0.0, 1.0, 5.5, 20.0, 1.0]);
        readings.extend(full_measurement(1, [1.0, 1.0, 7.0, 60.0, 0.0]));
        readings.reverse();

        let outcome = Reshaper::default().reshape(&readings).unwrap();
        let ids: Vec<i64> = outcome.batches.iter().map(|b| b.measurement_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(outcome.batches[1].readings.ph, 5.5);
    }

    #[test]
    fn test_duplicate_last_write_wins() {
        let mut readings = full_measurement(3, [1.0, 1.0, 7.0, 50.0, 0.0]);
        readings.push(RawReading {
            measurement_id: 3,
            timestamp: base_time(),
            sensor_name: "Sensor pH ESP32".to_string(),
            value: 5.2,
        });

        let outcome = Reshaper::default().reshape(&readings).unwrap();
        assert_eq!(outcome.batches[0].readings.ph, 5.2);
        assert_eq!(outcome.duplicates_overwritten, 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut readings = full_measurement(3, [1.0, 1.0, 7.0, 50.0, 0.0]);
        readings.push(readings[0].clone());

        let reshaper = Reshaper::new(ReshapeConfig {
            duplicate_policy: DuplicatePolicy::Reject,
        });
        let result = reshaper.reshape(&readings);
        assert!(matches!(result, Err(PipelineError::DataQuality(_))));
    }

    #[test]
    fn test_exact_name_matching_only() {
        let mut readings = full_measurement(5, [1.0, 1.0, 7.0, 50.0, 0.0]);
        readings.push(RawReading {
            measurement_id: 5,
            timestamp: base_time(),
            sensor_name: "Sensor pH ESP32 backup".to_string(),
            value: 2.0,
        });

        let outcome = Reshaper::default().reshape(&readings).unwrap();
        assert_eq!(outcome.unrecognized_readings, 1);
        assert_eq!(outcome.batches[0].readings.ph, 7.0);
        assert!(SensorField::from_sensor_name("sensor ph esp32").is_none());
    }

    #[test]
    fn test_empty_input() {
        let outcome = Reshaper::default().reshape(&[]).unwrap();
        assert!(outcome.batches.is_empty());
        assert_eq!(outcome.dropped_incomplete, 0);
    }
}
