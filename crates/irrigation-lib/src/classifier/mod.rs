//! Classifier families and their fitted payloads
//!
//! Both families are scored through the [`Classifier`] trait, which takes a
//! [`FeatureVector`]. Training evaluation and serving therefore share one
//! dispatch path, and the linear family applies its normalizer inside that
//! path rather than at each call site.

mod forest;
mod logistic;
mod scaler;

pub use forest::{balanced_class_weights, DecisionTree, ForestConfig, RandomForest, TreeNode};
pub use logistic::{LogisticConfig, LogisticRegression};
pub use scaler::StandardScaler;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{ClassifierKind, FeatureVector, NUM_FEATURES};

/// Trait for scoring a feature vector
pub trait Classifier: Send + Sync {
    /// `[p(no irrigation), p(irrigation)]`
    fn predict_proba(&self, features: &FeatureVector) -> PipelineResult<[f64; 2]>;

    /// Predicted class; ties resolve to class 0
    fn predict(&self, features: &FeatureVector) -> PipelineResult<u8> {
        let proba = self.predict_proba(features)?;
        Ok(u8::from(proba[1] > proba[0]))
    }
}

/// A fitted classifier of either family
#[derive(Debug, Clone, Copy)]
pub enum FittedClassifier<'a> {
    TreeEnsemble(&'a RandomForest),
    Linear {
        model: &'a LogisticRegression,
        normalizer: &'a StandardScaler,
    },
}

impl FittedClassifier<'_> {
    pub fn kind(&self) -> ClassifierKind {
        match self {
            FittedClassifier::TreeEnsemble(_) => ClassifierKind::TreeEnsemble,
            FittedClassifier::Linear { .. } => ClassifierKind::Linear,
        }
    }
}

impl Classifier for FittedClassifier<'_> {
    fn predict_proba(&self, features: &FeatureVector) -> PipelineResult<[f64; 2]> {
        let row = features.to_array();
        let proba = match self {
            FittedClassifier::TreeEnsemble(forest) => forest.predict_proba(&row)?,
            FittedClassifier::Linear { model, normalizer } => {
                let scaled = normalizer.transform(&row)?;
                let p1 = model.predict_positive(&scaled)?;
                [1.0 - p1, p1]
            }
        };

        if !proba.iter().all(|p| p.is_finite()) {
            return Err(PipelineError::Inference(format!(
                "{} produced non-finite probabilities",
                self.kind()
            )));
        }
        Ok(proba)
    }
}

/// The complete output of one training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModels {
    pub tree_ensemble: RandomForest,
    pub linear: LogisticRegression,
    pub normalizer: StandardScaler,
}

impl TrainedModels {
    pub fn classifier(&self, kind: ClassifierKind) -> FittedClassifier<'_> {
        match kind {
            ClassifierKind::TreeEnsemble => FittedClassifier::TreeEnsemble(&self.tree_ensemble),
            ClassifierKind::Linear => FittedClassifier::Linear {
                model: &self.linear,
                normalizer: &self.normalizer,
            },
        }
    }

    /// Check that all three parts agree on the feature schema
    pub fn validate(&self) -> Result<(), String> {
        let widths = [
            ("tree_ensemble", self.tree_ensemble.n_features()),
            ("linear", self.linear.n_features()),
            ("normalizer", self.normalizer.n_features()),
        ];
        for (name, width) in widths {
            if width != NUM_FEATURES {
                return Err(format!(
                    "{} was fitted on {} features, expected {}",
                    name, width, NUM_FEATURES
                ));
            }
        }
        self.tree_ensemble.validate()
    }
}
