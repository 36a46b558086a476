//! Training and serving orchestration
//!
//! [`IrrigationPipeline`] wires a [`RowSource`] through reshaping, feature
//! construction and training into the [`ModelStore`], and serves
//! predictions through a shared [`PredictionSession`]. Row source and store
//! I/O run under explicit timeouts; any failure or timeout there surfaces as
//! `StorageUnavailable`. Training runs on a blocking thread.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ClassifierKind, FeatureImportance, PredictionResult, SensorReadings};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::predictor::{FeatureBuilder, OutputFormatter, PredictionSession};
use crate::source::{fetch_with_timeout, Reshaper, RowSource};
use crate::classifier::TrainedModels;
use crate::store::{CommitGate, LoadedModels, ModelManifest, ModelStore};
use crate::training::{Trainer, TrainingMetrics};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// I/O deadlines applied by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimeouts {
    pub source: Duration,
    pub storage: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self {
            source: Duration::from_secs(30),
            storage: Duration::from_secs(30),
        }
    }
}

/// Summary of a completed training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub manifest: ModelManifest,
    pub metrics: TrainingMetrics,
    pub readings_fetched: usize,
    pub batches_used: usize,
    pub dropped_incomplete: usize,
    pub duplicates_overwritten: usize,
    pub unrecognized_readings: usize,
}

/// Which classifier families can currently serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelAvailability {
    pub tree_ensemble: bool,
    pub linear: bool,
}

/// Snapshot of what the pipeline knows about its models
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub generated_at: DateTime<Utc>,
    pub models_available: ModelAvailability,
    pub model_generation: Option<String>,
    /// Metrics of the last training run in this process
    pub metrics: Option<TrainingMetrics>,
    pub feature_importance: Option<Vec<FeatureImportance>>,
}

/// Orchestrates training and serving
pub struct IrrigationPipeline {
    source: Arc<dyn RowSource>,
    store: ModelStore,
    session: Arc<PredictionSession>,
    reshaper: Reshaper,
    trainer: Trainer,
    timeouts: PipelineTimeouts,
    last_metrics: RwLock<Option<TrainingMetrics>>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl IrrigationPipeline {
    pub fn new(source: Arc<dyn RowSource>, config: &PipelineConfig) -> Self {
        let store = ModelStore::new(config.store());
        let session = Arc::new(PredictionSession::with_formatter(
            store,
            OutputFormatter::with_config(config.output()),
        ));
        Self::with_session(source, session, config)
    }

    /// Build a pipeline that serves through an existing session
    pub fn with_session(source: Arc<dyn RowSource>, session: Arc<PredictionSession>, config: &PipelineConfig) -> Self {
        Self {
            source,
            store: session.store().clone(),
            session,
            reshaper: Reshaper::new(config.reshape()),
            trainer: Trainer::new(config.training()),
            timeouts: PipelineTimeouts {
                source: config.source_timeout(),
                storage: config.storage_timeout(),
            },
            last_metrics: RwLock::new(None),
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("pipeline"),
        }
    }

    pub fn with_timeouts(mut self, timeouts: PipelineTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn session(&self) -> &Arc<PredictionSession> {
        &self.session
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Fetch, reshape, train, persist, and install a new model generation
    pub async fn train(&self, cancel: &CancellationToken) -> PipelineResult<TrainingReport> {
        let start = Instant::now();
        let result = self.run_training(cancel).await;

        match &result {
            Ok(report) => {
                let elapsed = start.elapsed();
                self.metrics.record_training(elapsed.as_secs_f64());
                self.logger.log_training_completed(
                    &report.metrics,
                    &report.manifest.generation,
                    elapsed.as_millis() as u64,
                );
            }
            Err(e) => {
                self.metrics.inc_training_failures();
                self.logger.log_training_failed(&e.to_string());
            }
        }
        result
    }

    async fn run_training(&self, cancel: &CancellationToken) -> PipelineResult<TrainingReport> {
        let readings = fetch_with_timeout(self.source.as_ref(), self.timeouts.source).await?;
        let reshaped = self.reshaper.reshape(&readings)?;
        self.metrics.set_batches_dropped(reshaped.dropped_incomplete);
        self.logger
            .log_batches_dropped(reshaped.dropped_incomplete, reshaped.batches.len());

        let samples = FeatureBuilder::build_samples(&reshaped.batches);
        let trainer = self.trainer.clone();
        let token = cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || trainer.train(&samples, &token))
            .await
            .map_err(|e| PipelineError::TrainingAborted(format!("completion, training task failed: {}", e)))??;

        if cancel.is_cancelled() {
            info!("Training cancelled before save, keeping previous models");
            return Err(PipelineError::TrainingAborted("model save".into()));
        }

        let manifest = self.save_with_deadline(outcome.models.clone()).await?;
        self.logger.log_models_saved(&manifest);

        self.session.install(LoadedModels {
            manifest: manifest.clone(),
            models: outcome.models,
        });
        *self
            .last_metrics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(outcome.metrics.clone());

        Ok(TrainingReport {
            manifest,
            metrics: outcome.metrics,
            readings_fetched: readings.len(),
            batches_used: reshaped.batches.len(),
            dropped_incomplete: reshaped.dropped_incomplete,
            duplicates_overwritten: reshaped.duplicates_overwritten,
            unrecognized_readings: reshaped.unrecognized_readings,
        })
    }

    /// Load the stored model set into the session ahead of the first request
    pub async fn warm_up(&self) -> PipelineResult<ModelManifest> {
        let session = Arc::clone(&self.session);
        let loaded = self
            .with_storage_timeout("model load", move || session.models())
            .await?;
        Ok(loaded.manifest.clone())
    }

    pub fn predict(&self, readings: &SensorReadings, kind: ClassifierKind) -> PipelineResult<PredictionResult> {
        self.session.predict(readings, kind)
    }

    pub fn feature_importance(&self) -> PipelineResult<Vec<FeatureImportance>> {
        self.session.feature_importance()
    }

    /// Metrics of the last successful training run in this process
    pub fn last_metrics(&self) -> Option<TrainingMetrics> {
        self.last_metrics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Describe the current model state; absent models are reported, not raised
    pub fn report(&self) -> ModelReport {
        let loaded = match self.session.models() {
            Ok(loaded) => Some(loaded),
            Err(e) => {
                debug!(error = %e, "No models available for report");
                None
            }
        };
        let available = loaded.is_some();

        ModelReport {
            generated_at: Utc::now(),
            models_available: ModelAvailability {
                tree_ensemble: available,
                linear: available,
            },
            model_generation: loaded.as_ref().map(|l| l.manifest.generation.clone()),
            metrics: self.last_metrics(),
            feature_importance: loaded.and_then(|_| self.session.feature_importance().ok()),
        }
    }

    /// Save under the storage deadline; a save that misses it never commits
    async fn save_with_deadline(&self, models: TrainedModels) -> PipelineResult<ModelManifest> {
        let store = self.store.clone();
        let gate = CommitGate::new();
        let task_gate = gate.clone();
        let mut handle = tokio::task::spawn_blocking(move || store.save_gated(&models, &task_gate));

        let waited = tokio::time::timeout(self.timeouts.storage, &mut handle).await;
        let joined = match waited {
            Ok(joined) => joined,
            Err(_) if gate.close() => {
                return Err(PipelineError::StorageUnavailable(format!(
                    "model save did not finish within {}ms",
                    self.timeouts.storage.as_millis()
                )));
            }
            Err(_) => {
                debug!("Model save passed its deadline while committing, waiting for the rename");
                handle.await
            }
        };
        joined.map_err(|e| PipelineError::StorageUnavailable(format!("model save task failed: {}", e)))?
    }

    async fn with_storage_timeout<T, F>(&self, operation: &str, f: F) -> PipelineResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> PipelineResult<T> + Send + 'static,
    {
        match tokio::time::timeout(self.timeouts.storage, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PipelineError::StorageUnavailable(format!(
                "{} task failed: {}",
                operation, e
            ))),
            Err(_) => Err(PipelineError::StorageUnavailable(format!(
                "{} did not finish within {}ms",
                operation,
                self.timeouts.storage.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests;
