//! Error taxonomy for the prediction pipeline
//!
//! Every fallible pipeline operation returns [`PipelineError`]. Callers can
//! match on the variant to decide whether to retrain, retry storage, or fix
//! their input. A failure is never folded into a default prediction.

use thiserror::Error;

/// Errors surfaced by training, persistence, and serving
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Too few samples, or one of the two classes is absent
    #[error("insufficient training data: {0}")]
    InsufficientData(String),

    /// Data is present but cannot be used as-is (infeasible split, rejected duplicates)
    #[error("data quality problem: {0}")]
    DataQuality(String),

    /// The model store has no usable artifact set
    #[error("model artifacts not found or corrupt: {0}")]
    ModelNotFound(String),

    /// Serving was requested but no trained models can be loaded
    #[error("models unavailable, run training first: {0}")]
    ModelUnavailable(String),

    /// Row source or model store I/O failed or timed out
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Training observed a cancellation request
    #[error("training aborted before {0}")]
    TrainingAborted(String),

    /// Artifact encoding failed while saving
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A loaded classifier could not score the input
    #[error("inference failed: {0}")]
    Inference(String),
}

impl PipelineError {
    /// Whether running a training pass could resolve this error
    pub fn needs_training(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelUnavailable(_) | PipelineError::ModelNotFound(_)
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_training() {
        assert!(PipelineError::ModelUnavailable("empty".into()).needs_training());
        assert!(PipelineError::ModelNotFound("gone".into()).needs_training());
        assert!(!PipelineError::StorageUnavailable("timeout".into()).needs_training());
    }

    #[test]
    fn test_display_carries_detail() {
        let err = PipelineError::InsufficientData("5 samples, need 10".into());
        assert_eq!(err.to_string(), "insufficient training data: 5 samples, need 10");
    }
}
