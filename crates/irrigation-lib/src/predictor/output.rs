//! Prediction output formatting
//!
//! Turns a class probability pair into a [`PredictionResult`] and flags
//! predictions whose confidence falls under the configured threshold.

use crate::models::{ClassifierKind, PredictionResult, SensorReadings};

/// Confidence below which a prediction is flagged
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Configuration for output formatting
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub low_confidence_threshold: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Formats classifier probabilities into a [`PredictionResult`]
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    config: OutputConfig,
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Build the result for `proba = [p(no irrigation), p(irrigation)]`.
    ///
    /// The predicted class is the argmax, with ties going to no irrigation.
    pub fn format(
        &self,
        proba: [f64; 2],
        model_used: ClassifierKind,
        model_generation: &str,
        input: SensorReadings,
    ) -> PredictionResult {
        let [p_no_irrigate, p_irrigate] = proba;
        let confidence = p_no_irrigate.max(p_irrigate);

        PredictionResult {
            irrigation_needed: p_irrigate > p_no_irrigate,
            p_no_irrigate,
            p_irrigate,
            confidence,
            low_confidence: self.is_low_confidence(confidence),
            model_used,
            model_generation: model_generation.to_string(),
            input_echo: input,
        }
    }

    /// Check if a confidence falls under the configured threshold
    pub fn is_low_confidence(&self, confidence: f64) -> bool {
        confidence < self.config.low_confidence_threshold
    }
}
