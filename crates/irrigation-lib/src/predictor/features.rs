//! Feature construction for training and inference
//!
//! Turns the four raw soil inputs into the fixed 11-feature vector. This is
//! the only place features are derived: the trainer and the prediction
//! session both call [`FeatureBuilder::build`], so the vectors they see for
//! the same readings are bit-identical.

use crate::models::{FeatureVector, LabeledSample, MeasurementBatch, SensorReadings};

/// Lower bound of the agronomic pH window
pub const PH_IDEAL_MIN: f64 = 6.0;

/// Upper bound of the agronomic pH window
pub const PH_IDEAL_MAX: f64 = 8.0;

/// Humidity below this is considered dry soil
pub const HUMIDITY_LOW_BELOW: f64 = 30.0;

/// Humidity above this is considered saturated soil
pub const HUMIDITY_HIGH_ABOVE: f64 = 70.0;

/// Stateless feature builder
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// Build the feature vector for one set of readings
    pub fn build(readings: &SensorReadings) -> FeatureVector {
        let ph_in_ideal_range = flag((PH_IDEAL_MIN..=PH_IDEAL_MAX).contains(&readings.ph));
        let nutrients_complete =
            flag(readings.phosphorus_present == 1.0 && readings.potassium_present == 1.0);

        FeatureVector {
            phosphorus_present: readings.phosphorus_present,
            potassium_present: readings.potassium_present,
            ph: readings.ph,
            humidity_pct: readings.humidity_pct,
            ph_in_ideal_range,
            humidity_low: flag(readings.humidity_pct < HUMIDITY_LOW_BELOW),
            humidity_high: flag(readings.humidity_pct > HUMIDITY_HIGH_ABOVE),
            nutrients_complete,
            nutrients_absent: flag(
                readings.phosphorus_present == 0.0 && readings.potassium_present == 0.0,
            ),
            ph_humidity_product: readings.ph * readings.humidity_pct,
            nutrients_and_ph_ok: nutrients_complete * ph_in_ideal_range,
        }
    }

    /// Build a labeled training sample from a reshaped batch
    pub fn build_sample(batch: &MeasurementBatch) -> LabeledSample {
        LabeledSample {
            features: Self::build(&batch.readings),
            label: batch.label(),
        }
    }

    /// Build labeled samples for every batch
    pub fn build_samples(batches: &[MeasurementBatch]) -> Vec<LabeledSample> {
        batches.iter().map(Self::build_sample).collect()
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}
