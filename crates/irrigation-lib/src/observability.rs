//! Observability infrastructure for the irrigation pipeline
//!
//! Provides:
//! - Prometheus metrics (training runs, prediction latency, dropped batches, model generation)
//! - Structured logging of pipeline events with tracing

use crate::models::{ClassifierKind, PredictionResult};
use crate::store::ModelManifest;
use crate::training::TrainingMetrics;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for prediction latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5,
];

/// Histogram buckets for training duration (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    training_runs: IntCounter,
    training_failures: IntCounter,
    training_duration_seconds: Histogram,
    predictions_served: IntCounterVec,
    prediction_errors: IntCounter,
    prediction_latency_seconds: Histogram,
    batches_dropped: IntGauge,
    model_generation_info: GaugeVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            training_runs: register_int_counter!(
                "irrigation_training_runs_total",
                "Total number of completed training runs"
            )
            .expect("Failed to register training_runs"),

            training_failures: register_int_counter!(
                "irrigation_training_failures_total",
                "Total number of training runs that ended in an error"
            )
            .expect("Failed to register training_failures"),

            training_duration_seconds: register_histogram!(
                "irrigation_training_duration_seconds",
                "Wall time of a training run, fetch to save",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            predictions_served: register_int_counter_vec!(
                "irrigation_predictions_total",
                "Total number of predictions served per classifier",
                &["model"]
            )
            .expect("Failed to register predictions_served"),

            prediction_errors: register_int_counter!(
                "irrigation_prediction_errors_total",
                "Total number of failed prediction requests"
            )
            .expect("Failed to register prediction_errors"),

            prediction_latency_seconds: register_histogram!(
                "irrigation_prediction_latency_seconds",
                "Time spent building features and scoring one request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            batches_dropped: register_int_gauge!(
                "irrigation_batches_dropped",
                "Incomplete measurement batches dropped by the last reshape"
            )
            .expect("Failed to register batches_dropped"),

            model_generation_info: register_gauge_vec!(
                "irrigation_model_generation_info",
                "Information about the currently loaded model set",
                &["generation"]
            )
            .expect("Failed to register model_generation_info"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn record_training(&self, duration_secs: f64) {
        self.inner().training_runs.inc();
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn inc_training_failures(&self) {
        self.inner().training_failures.inc();
    }

    pub fn record_prediction(&self, model: ClassifierKind, duration_secs: f64) {
        self.inner()
            .predictions_served
            .with_label_values(&[model.as_str()])
            .inc();
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    pub fn set_batches_dropped(&self, count: usize) {
        self.inner().batches_dropped.set(count as i64);
    }

    /// Mark `generation` as the loaded model set
    pub fn set_model_generation(&self, generation: &str) {
        self.inner().model_generation_info.reset();
        self.inner()
            .model_generation_info
            .with_label_values(&[generation])
            .set(1.0);
    }

    pub fn clear_model_generation(&self) {
        self.inner().model_generation_info.reset();
    }
}

/// Structured logger for pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn log_training_completed(&self, metrics: &TrainingMetrics, generation: &str, duration_ms: u64) {
        info!(
            event = "training_completed",
            component = %self.component,
            generation = %generation,
            train_samples = metrics.train_samples,
            eval_samples = metrics.eval_samples,
            class_0 = metrics.class_distribution[0],
            class_1 = metrics.class_distribution[1],
            tree_ensemble_accuracy = metrics.tree_ensemble.accuracy,
            linear_accuracy = metrics.linear.accuracy,
            duration_ms = duration_ms,
            "Training completed"
        );
    }

    pub fn log_training_failed(&self, error: &str) {
        warn!(
            event = "training_failed",
            component = %self.component,
            error = %error,
            "Training failed"
        );
    }

    pub fn log_prediction(&self, result: &PredictionResult) {
        info!(
            event = "prediction_served",
            component = %self.component,
            model = %result.model_used,
            generation = %result.model_generation,
            irrigation_needed = result.irrigation_needed,
            p_irrigate = result.p_irrigate,
            confidence = result.confidence,
            low_confidence = result.low_confidence,
            "Served irrigation prediction"
        );
    }

    pub fn log_batches_dropped(&self, dropped: usize, kept: usize) {
        if dropped > 0 {
            warn!(
                event = "batches_dropped",
                component = %self.component,
                dropped = dropped,
                kept = kept,
                "Dropped incomplete measurement batches"
            );
        }
    }

    pub fn log_models_saved(&self, manifest: &ModelManifest) {
        info!(
            event = "models_saved",
            component = %self.component,
            generation = %manifest.generation,
            artifacts = manifest.artifacts.len(),
            "Model set persisted"
        );
    }

    pub fn log_models_loaded(&self, manifest: &ModelManifest) {
        info!(
            event = "models_loaded",
            component = %self.component,
            generation = %manifest.generation,
            created_at = %manifest.created_at,
            "Model set loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_metrics_creation() {
        let metrics = PipelineMetrics::new();
        let again = PipelineMetrics::new();

        metrics.record_training(0.5);
        metrics.record_prediction(ClassifierKind::Linear, 0.0001);
        again.inc_prediction_errors();
        metrics.set_batches_dropped(3);
        metrics.set_model_generation("0123456789abcdef");
        metrics.clear_model_generation();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("pipeline");
        assert_eq!(logger.component, "pipeline");
        logger.log_batches_dropped(0, 10);
    }
}
