//! Per-feature standardization for the linear classifier

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Mean/scale normalizer fitted on the training subset only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
    n_samples_seen: usize,
}

impl StandardScaler {
    /// Fit mean and population standard deviation per column.
    ///
    /// Constant columns get a scale of 1 so they map to zero instead of NaN.
    pub fn fit(rows: &[Vec<f64>]) -> PipelineResult<Self> {
        let n_features = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| PipelineError::InsufficientData("cannot fit normalizer on zero rows".into()))?;
        if rows.iter().any(|r| r.len() != n_features) {
            return Err(PipelineError::DataQuality("ragged feature rows".into()));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; n_features];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut variance = vec![0.0; n_features];
        for row in rows {
            for ((var, v), m) in variance.iter_mut().zip(row).zip(&mean) {
                *var += (v - m).powi(2);
            }
        }

        let scale = variance
            .into_iter()
            .map(|var| {
                let std = (var / n).sqrt();
                if std < 10.0 * f64::EPSILON {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Ok(Self {
            mean,
            scale,
            n_samples_seen: rows.len(),
        })
    }

    pub fn transform(&self, row: &[f64]) -> PipelineResult<Vec<f64>> {
        if row.len() != self.mean.len() {
            return Err(PipelineError::Inference(format!(
                "normalizer expects {} features, got {}",
                self.mean.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> PipelineResult<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn n_samples_seen(&self) -> usize {
        self.n_samples_seen
    }
}
