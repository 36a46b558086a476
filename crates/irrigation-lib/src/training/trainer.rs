//! Fits and evaluates both classifier families

use super::metrics::ModelMetrics;
use super::split::{stratified_split, SplitIndices};
use crate::classifier::{
    balanced_class_weights, Classifier, ForestConfig, LogisticConfig, LogisticRegression, RandomForest,
    StandardScaler, TrainedModels,
};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ClassifierKind, LabeledSample};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fewer samples than this fails with `InsufficientData`
    pub min_samples: usize,
    /// Share of samples held out for evaluation
    pub test_fraction: f64,
    /// Seed for the split
    pub seed: u64,
    pub forest: ForestConfig,
    pub linear: LogisticConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            test_fraction: 0.2,
            seed: 42,
            forest: ForestConfig::default(),
            linear: LogisticConfig::default(),
        }
    }
}

/// Evaluation results of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub tree_ensemble: ModelMetrics,
    pub linear: ModelMetrics,
    pub train_samples: usize,
    pub eval_samples: usize,
    /// Sample count of class 0 and class 1 before the split
    pub class_distribution: [usize; 2],
}

impl TrainingMetrics {
    pub fn for_kind(&self, kind: ClassifierKind) -> &ModelMetrics {
        match kind {
            ClassifierKind::TreeEnsemble => &self.tree_ensemble,
            ClassifierKind::Linear => &self.linear,
        }
    }
}

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub models: TrainedModels,
    pub metrics: TrainingMetrics,
    pub split: SplitIndices,
}

/// Trains the tree ensemble and the linear classifier on the same split
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train(&self, samples: &[LabeledSample], cancel: &CancellationToken) -> PipelineResult<TrainingOutcome> {
        let start = Instant::now();

        if samples.len() < self.config.min_samples {
            return Err(PipelineError::InsufficientData(format!(
                "{} samples, at least {} required",
                samples.len(),
                self.config.min_samples
            )));
        }

        let labels: Vec<u8> = samples.iter().map(|s| s.label).collect();
        let class_distribution = class_counts(&labels);
        if let Some(missing) = class_distribution.iter().position(|&c| c == 0) {
            return Err(PipelineError::InsufficientData(format!(
                "no samples of class {}, both classes are required",
                missing
            )));
        }

        let split = stratified_split(&labels, self.config.test_fraction, self.config.seed)?;
        debug!(
            train = split.train.len(),
            eval = split.eval.len(),
            "Stratified split computed"
        );

        let train_rows = rows_at(samples, &split.train);
        let train_labels = labels_at(&labels, &split.train);

        ensure_not_cancelled(cancel, "tree ensemble fit")?;
        let tree_ensemble = RandomForest::fit(&train_rows, &train_labels, &self.config.forest)?;

        ensure_not_cancelled(cancel, "linear fit")?;
        let normalizer = StandardScaler::fit(&train_rows)?;
        let scaled = normalizer.transform_all(&train_rows)?;
        let class_weights = balanced_class_weights(&train_labels);
        let sample_weights: Vec<f64> = train_labels
            .iter()
            .map(|&label| class_weights[usize::from(label)])
            .collect();
        let linear = LogisticRegression::fit(&scaled, &train_labels, &sample_weights, &self.config.linear)?;

        let models = TrainedModels {
            tree_ensemble,
            linear,
            normalizer,
        };

        let eval_labels = labels_at(&labels, &split.eval);
        let tree_metrics = evaluate(&models, ClassifierKind::TreeEnsemble, samples, &split.eval, &eval_labels)?;
        let linear_metrics = evaluate(&models, ClassifierKind::Linear, samples, &split.eval, &eval_labels)?;

        info!(
            samples = samples.len(),
            train = split.train.len(),
            eval = split.eval.len(),
            tree_ensemble_accuracy = tree_metrics.accuracy,
            linear_accuracy = linear_metrics.accuracy,
            duration_ms = start.elapsed().as_millis() as u64,
            "Training run finished"
        );

        let metrics = TrainingMetrics {
            tree_ensemble: tree_metrics,
            linear: linear_metrics,
            train_samples: split.train.len(),
            eval_samples: split.eval.len(),
            class_distribution,
        };

        Ok(TrainingOutcome { models, metrics, split })
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken, stage: &str) -> PipelineResult<()> {
    if cancel.is_cancelled() {
        info!(stage, "Training cancelled");
        return Err(PipelineError::TrainingAborted(stage.to_string()));
    }
    Ok(())
}

fn evaluate(
    models: &TrainedModels,
    kind: ClassifierKind,
    samples: &[LabeledSample],
    indices: &[usize],
    y_true: &[u8],
) -> PipelineResult<ModelMetrics> {
    let classifier = models.classifier(kind);
    let y_pred = indices
        .iter()
        .map(|&i| classifier.predict(&samples[i].features))
        .collect::<PipelineResult<Vec<u8>>>()?;
    Ok(ModelMetrics::evaluate(y_true, &y_pred))
}

fn class_counts(labels: &[u8]) -> [usize; 2] {
    let mut counts = [0usize; 2];
    for &label in labels {
        counts[usize::from(label.min(1))] += 1;
    }
    counts
}

fn rows_at(samples: &[LabeledSample], indices: &[usize]) -> Vec<Vec<f64>> {
    indices
        .iter()
        .map(|&i| samples[i].features.to_array().to_vec())
        .collect()
}

fn labels_at(labels: &[u8], indices: &[usize]) -> Vec<u8> {
    indices.iter().map(|&i| labels[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorReadings;
    use crate::predictor::FeatureBuilder;
    use crate::test_support::{fast_training_config, labeled_samples};

    #[test]
    fn test_too_few_samples() {
        let trainer = Trainer::default();
        let result = trainer.train(&labeled_samples(5), &CancellationToken::new());
        assert!(matches!(result, Err(PipelineError::InsufficientData(_))));
    }

    #[test]
    fn test_missing_class() {
        let samples: Vec<LabeledSample> = labeled_samples(20)
            .into_iter()
            .map(|s| LabeledSample { label: 0, ..s })
            .collect();
        let result = Trainer::default().train(&samples, &CancellationToken::new());
        assert!(matches!(result, Err(PipelineError::InsufficientData(_))));
    }

    #[test]
    fn test_cancelled_before_first_fit() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = Trainer::new(fast_training_config()).train(&labeled_samples(20), &cancel);
        assert!(matches!(result, Err(PipelineError::TrainingAborted(_))));
    }

    #[test]
    fn test_metrics_shape() {
        let outcome = Trainer::new(fast_training_config())
            .train(&labeled_samples(40), &CancellationToken::new())
            .unwrap();
        let metrics = &outcome.metrics;

        assert_eq!(metrics.train_samples + metrics.eval_samples, 40);
        assert_eq!(metrics.eval_samples, 8);
        assert_eq!(metrics.class_distribution, [16, 24]);
        for kind in ClassifierKind::ALL {
            let m = metrics.for_kind(kind);
            assert!((0.0..=1.0).contains(&m.accuracy));
            let total: usize = m.confusion_matrix.iter().flatten().sum();
            assert_eq!(total, metrics.eval_samples);
        }
    }

    #[test]
    fn test_same_seed_reproduces_run() {
        let samples = labeled_samples(30);
        let trainer = Trainer::new(fast_training_config());
        let a = trainer.train(&samples, &CancellationToken::new()).unwrap();
        let b = trainer.train(&samples, &CancellationToken::new()).unwrap();

        assert_eq!(a.split, b.split);
        assert_eq!(a.models, b.models);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn test_normalizer_ignores_eval_rows() {
        let samples = labeled_samples(30);
        let trainer = Trainer::new(fast_training_config());
        let baseline = trainer.train(&samples, &CancellationToken::new()).unwrap();

        let mut perturbed = samples.clone();
        for &i in &baseline.split.eval {
            let f = perturbed[i].features;
            perturbed[i].features = FeatureBuilder::build(&SensorReadings {
                phosphorus_present: f.phosphorus_present,
                potassium_present: f.potassium_present,
                ph: f.ph + 3.0,
                humidity_pct: f.humidity_pct + 20.0,
            });
        }

        let rerun = trainer.train(&perturbed, &CancellationToken::new()).unwrap();
        assert_eq!(rerun.split, baseline.split);
        assert_eq!(rerun.models.normalizer, baseline.models.normalizer);
        assert_eq!(rerun.models.tree_ensemble, baseline.models.tree_ensemble);
    }
}
