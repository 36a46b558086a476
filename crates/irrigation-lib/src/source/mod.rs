//! Raw reading sources and batch reshaping
//!
//! The storage layer is reached through the [`RowSource`] trait. It yields
//! flat `(measurement_id, timestamp, sensor_name, value)` rows that the
//! [`Reshaper`] pivots into one [`MeasurementBatch`](crate::models::MeasurementBatch)
//! per measurement.

mod reshape;

pub use reshape::{
    DuplicatePolicy, ReshapeConfig, ReshapeOutcome, Reshaper, SensorField, SENSOR_TABLE,
};

use crate::error::{PipelineError, PipelineResult};
use crate::models::RawReading;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub use async_trait::async_trait;

/// Trait for row source implementations
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch every reading belonging to the monitored sensor set
    async fn fetch_readings(&self) -> PipelineResult<Vec<RawReading>>;
}

/// Fetch from a source, mapping a timeout to `StorageUnavailable`
pub async fn fetch_with_timeout(
    source: &dyn RowSource,
    timeout: Duration,
) -> PipelineResult<Vec<RawReading>> {
    match tokio::time::timeout(timeout, source.fetch_readings()).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::StorageUnavailable(format!(
            "row source did not answer within {}ms",
            timeout.as_millis()
        ))),
    }
}

/// Row source backed by a vector held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    readings: Vec<RawReading>,
}

impl InMemorySource {
    pub fn new(readings: Vec<RawReading>) -> Self {
        Self { readings }
    }
}

#[async_trait]
impl RowSource for InMemorySource {
    async fn fetch_readings(&self) -> PipelineResult<Vec<RawReading>> {
        Ok(self.readings.clone())
    }
}

/// Row source reading one JSON-encoded [`RawReading`] per line
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RowSource for JsonLinesSource {
    async fn fetch_readings(&self) -> PipelineResult<Vec<RawReading>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PipelineError::StorageUnavailable(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let mut readings = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let reading: RawReading = serde_json::from_str(line).map_err(|e| {
                PipelineError::StorageUnavailable(format!(
                    "{}:{}: malformed reading: {}",
                    self.path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            readings.push(reading);
        }

        debug!(path = %self.path.display(), rows = readings.len(), "Loaded readings from file");
        Ok(readings)
    }
}
