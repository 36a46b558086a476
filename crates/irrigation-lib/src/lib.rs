//! Irrigation prediction library
//!
//! This crate provides the core functionality for:
//! - Reshaping raw soil sensor readings into measurement batches
//! - Deterministic feature construction shared by training and serving
//! - Training and evaluating a tree ensemble and a linear classifier
//! - Persisting model sets as a single checksummed bundle
//! - Serving single-sample irrigation predictions
//! - Metrics and structured logging

pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;
pub mod source;
pub mod store;
pub mod training;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::{IrrigationPipeline, ModelAvailability, ModelReport, PipelineTimeouts, TrainingReport};
pub use predictor::{FeatureBuilder, PredictionSession};
pub use store::{ArtifactKind, ModelManifest, ModelStore};
