//! Shared fixtures for the crate's test modules

use crate::classifier::{ForestConfig, TrainedModels};
use crate::models::{LabeledSample, RawReading, SensorReadings};
use crate::predictor::FeatureBuilder;
use crate::training::{Trainer, TrainingConfig};
use chrono::{Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

/// Deterministic readings; dry soil goes with a running pump
pub fn synthetic_batch(i: usize) -> (SensorReadings, bool) {
    let irrigate = i % 5 < 3;
    let readings = SensorReadings {
        phosphorus_present: (i % 2) as f64,
        potassium_present: ((i / 2) % 2) as f64,
        ph: 5.0 + (i % 7) as f64 * 0.5,
        humidity_pct: if irrigate {
            12.0 + (i % 6) as f64 * 3.0
        } else {
            55.0 + (i % 8) as f64 * 4.0
        },
    };
    (readings, irrigate)
}

pub fn labeled_samples(n: usize) -> Vec<LabeledSample> {
    (0..n)
        .map(|i| {
            let (readings, irrigate) = synthetic_batch(i);
            LabeledSample {
                features: FeatureBuilder::build(&readings),
                label: u8::from(irrigate),
            }
        })
        .collect()
}

/// Training config with a small forest so tests stay fast
pub fn fast_training_config() -> TrainingConfig {
    TrainingConfig {
        forest: ForestConfig {
            n_trees: 15,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn fitted_models() -> TrainedModels {
    Trainer::new(fast_training_config())
        .train(&labeled_samples(30), &CancellationToken::new())
        .expect("synthetic training succeeds")
        .models
}

/// The five raw readings of one measurement batch
pub fn raw_batch(measurement_id: i64, readings: &SensorReadings, pump_active: bool) -> Vec<RawReading> {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(measurement_id);
    [
        ("Sensor Fosforo ESP32", readings.phosphorus_present),
        ("Sensor Potassio ESP32", readings.potassium_present),
        ("Sensor pH ESP32", readings.ph),
        ("Sensor Umidade ESP32", readings.humidity_pct),
        ("Sensor Bomba ESP32", f64::from(u8::from(pump_active))),
    ]
    .into_iter()
    .enumerate()
    .map(|(offset, (sensor_name, value))| RawReading {
        measurement_id,
        timestamp: base + Duration::seconds(offset as i64),
        sensor_name: sensor_name.to_string(),
        value,
    })
    .collect()
}

/// Raw readings for `zeros` idle-pump and `ones` running-pump batches
pub fn raw_readings(zeros: usize, ones: usize) -> Vec<RawReading> {
    let mut rows = Vec::new();
    let mut id = 1;
    let mut produced = [0usize; 2];
    let mut i = 0;
    while produced[0] < zeros || produced[1] < ones {
        let (readings, irrigate) = synthetic_batch(i);
        i += 1;
        let class = usize::from(irrigate);
        let wanted = if irrigate { ones } else { zeros };
        if produced[class] >= wanted {
            continue;
        }
        produced[class] += 1;
        rows.extend(raw_batch(id, &readings, irrigate));
        id += 1;
    }
    rows
}
