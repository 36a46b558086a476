//! Training: stratified split, classifier fitting, evaluation

mod metrics;
mod split;
mod trainer;

pub use metrics::{confusion_matrix, AverageScores, ClassScores, ClassificationReport, ModelMetrics};
pub use split::{stratified_split, SplitIndices};
pub use trainer::{Trainer, TrainingConfig, TrainingMetrics, TrainingOutcome};
