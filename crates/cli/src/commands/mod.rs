//! CLI command implementations

pub mod predict;
pub mod report;
pub mod train;

use crate::output::OutputFormat;
use irrigation_lib::source::InMemorySource;
use irrigation_lib::{IrrigationPipeline, PipelineConfig};
use std::sync::Arc;

/// Settings shared by every command
pub struct Context {
    pub config: PipelineConfig,
    pub format: OutputFormat,
}

impl Context {
    /// Pipeline for commands that only read the model store
    pub fn serving_pipeline(&self) -> IrrigationPipeline {
        IrrigationPipeline::new(Arc::new(InMemorySource::default()), &self.config)
    }
}
