//! Serving session: cached models plus single-sample inference
//!
//! A [`PredictionSession`] lazily loads the current model set from its
//! [`ModelStore`] on first use and keeps it until [`invalidate`] or
//! [`install`] replaces it. Sessions are plain values; callers decide
//! whether to share one behind an `Arc`.
//!
//! [`invalidate`]: PredictionSession::invalidate
//! [`install`]: PredictionSession::install

use super::features::FeatureBuilder;
use super::output::OutputFormatter;
use crate::classifier::Classifier;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ClassifierKind, FeatureImportance, PredictionResult, SensorReadings, FEATURE_NAMES};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::store::{LoadedModels, ModelStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::debug;

/// Inference statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub failed_inferences: u64,
}

/// Loads models on demand and serves predictions from them
pub struct PredictionSession {
    store: ModelStore,
    formatter: OutputFormatter,
    loaded: RwLock<Option<Arc<LoadedModels>>>,
    inference_count: AtomicU64,
    failure_count: AtomicU64,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl PredictionSession {
    pub fn new(store: ModelStore) -> Self {
        Self::with_formatter(store, OutputFormatter::new())
    }

    pub fn with_formatter(store: ModelStore, formatter: OutputFormatter) -> Self {
        Self {
            store,
            formatter,
            loaded: RwLock::new(None),
            inference_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("predictor"),
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// The cached model set, loading it from the store when absent
    pub fn models(&self) -> PipelineResult<Arc<LoadedModels>> {
        if let Some(loaded) = self.read_cache().as_ref() {
            return Ok(Arc::clone(loaded));
        }

        let mut cache = self.write_cache();
        // Another caller may have loaded while we waited for the write lock
        if let Some(loaded) = cache.as_ref() {
            return Ok(Arc::clone(loaded));
        }

        let loaded = Arc::new(self.store.load().map_err(|e| match e {
            PipelineError::ModelNotFound(msg) => PipelineError::ModelUnavailable(msg),
            other => other,
        })?);
        self.logger.log_models_loaded(&loaded.manifest);
        self.metrics.set_model_generation(&loaded.manifest.generation);
        *cache = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Score one request with the chosen classifier
    pub fn predict(&self, readings: &SensorReadings, kind: ClassifierKind) -> PipelineResult<PredictionResult> {
        let start = Instant::now();
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        let result = self.models().and_then(|loaded| {
            let features = FeatureBuilder::build(readings);
            let proba = loaded.models.classifier(kind).predict_proba(&features)?;
            Ok(self
                .formatter
                .format(proba, kind, &loaded.manifest.generation, *readings))
        });

        match &result {
            Ok(prediction) => {
                let elapsed = start.elapsed();
                self.metrics.record_prediction(kind, elapsed.as_secs_f64());
                debug!(elapsed_us = elapsed.as_micros() as u64, model = %kind, "Inference completed");
                self.logger.log_prediction(prediction);
            }
            Err(e) => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_prediction_errors();
                debug!(model = %kind, error = %e, "Inference failed");
            }
        }
        result
    }

    /// Tree-ensemble feature importances, highest first
    pub fn feature_importance(&self) -> PipelineResult<Vec<FeatureImportance>> {
        let loaded = self.models()?;
        let mut importances: Vec<FeatureImportance> = FEATURE_NAMES
            .iter()
            .zip(loaded.models.tree_ensemble.feature_importances())
            .map(|(name, &weight)| FeatureImportance {
                feature: name.to_string(),
                weight,
            })
            .collect();
        importances.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        Ok(importances)
    }

    /// Replace the cached model set, typically right after a save
    pub fn install(&self, loaded: LoadedModels) {
        self.metrics.set_model_generation(&loaded.manifest.generation);
        debug!(generation = %loaded.manifest.generation, "Model set installed in session");
        *self.write_cache() = Some(Arc::new(loaded));
    }

    /// Drop the cached model set; the next call reloads from the store
    pub fn invalidate(&self) {
        if self.write_cache().take().is_some() {
            self.metrics.clear_model_generation();
            debug!("Session model cache invalidated");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.read_cache().is_some()
    }

    pub fn loaded_generation(&self) -> Option<String> {
        self.read_cache()
            .as_ref()
            .map(|loaded| loaded.manifest.generation.clone())
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            failed_inferences: self.failure_count.load(Ordering::Relaxed),
        }
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Option<Arc<LoadedModels>>> {
        self.loaded.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Option<Arc<LoadedModels>>> {
        self.loaded.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
