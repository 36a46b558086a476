//! Core data models for the irrigation predictor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of features in a [`FeatureVector`]
pub const NUM_FEATURES: usize = 11;

/// Feature names in vector order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "phosphorus_present",
    "potassium_present",
    "ph",
    "humidity_pct",
    "ph_in_ideal_range",
    "humidity_low",
    "humidity_high",
    "nutrients_complete",
    "nutrients_absent",
    "ph_humidity_product",
    "nutrients_and_ph_ok",
];

/// A single sensor reading as delivered by the storage layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub measurement_id: i64,
    pub timestamp: DateTime<Utc>,
    pub sensor_name: String,
    pub value: f64,
}

/// The four raw soil inputs, shared by training rows and serving requests
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    pub phosphorus_present: f64,
    pub potassium_present: f64,
    pub ph: f64,
    pub humidity_pct: f64,
}

/// One synchronized set of sensor readings plus the pump state label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBatch {
    pub measurement_id: i64,
    pub timestamp: DateTime<Utc>,
    pub readings: SensorReadings,
    pub pump_active: f64,
}

impl MeasurementBatch {
    /// Training target: 1 when the pump was running
    pub fn label(&self) -> u8 {
        u8::from(self.pump_active != 0.0)
    }
}

/// Fixed-schema numeric encoding used by both training and inference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub phosphorus_present: f64,
    pub potassium_present: f64,
    pub ph: f64,
    pub humidity_pct: f64,
    pub ph_in_ideal_range: f64,
    pub humidity_low: f64,
    pub humidity_high: f64,
    pub nutrients_complete: f64,
    pub nutrients_absent: f64,
    pub ph_humidity_product: f64,
    pub nutrients_and_ph_ok: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.phosphorus_present,
            self.potassium_present,
            self.ph,
            self.humidity_pct,
            self.ph_in_ideal_range,
            self.humidity_low,
            self.humidity_high,
            self.nutrients_complete,
            self.nutrients_absent,
            self.ph_humidity_product,
            self.nutrients_and_ph_ok,
        ]
    }
}

/// A feature vector paired with its class label
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledSample {
    pub features: FeatureVector,
    pub label: u8,
}

/// The two classifier families trained side by side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    TreeEnsemble,
    Linear,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 2] = [ClassifierKind::TreeEnsemble, ClassifierKind::Linear];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::TreeEnsemble => "tree_ensemble",
            ClassifierKind::Linear => "linear",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tree_ensemble" | "random_forest" => Ok(ClassifierKind::TreeEnsemble),
            "linear" | "logistic_regression" => Ok(ClassifierKind::Linear),
            other => Err(format!(
                "unknown model '{}', expected tree_ensemble or linear",
                other
            )),
        }
    }
}

/// Outcome of a single irrigation prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub irrigation_needed: bool,
    pub p_no_irrigate: f64,
    pub p_irrigate: f64,
    pub confidence: f64,
    pub low_confidence: bool,
    pub model_used: ClassifierKind,
    pub model_generation: String,
    pub input_echo: SensorReadings,
}

/// Importance weight of one feature in the tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub weight: f64,
}
