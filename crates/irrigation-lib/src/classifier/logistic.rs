//! Binary logistic regression
//!
//! Fitted by full-batch gradient descent on the L2-regularized, sample
//! weighted log-loss. Starts from zero weights, so a fit is fully
//! determined by its inputs.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hyperparameters for logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Maximum gradient descent iterations
    pub max_iter: usize,
    /// Inverse regularization strength
    pub c: f64,
    /// Step size
    pub learning_rate: f64,
    /// Stop once the gradient norm falls below this
    pub tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            c: 1.0,
            learning_rate: 0.3,
            tolerance: 1e-6,
        }
    }
}

/// Fitted logistic regression model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    coefficients: Vec<f64>,
    intercept: f64,
    n_iter: usize,
    converged: bool,
}

impl LogisticRegression {
    /// Fit on (already normalized) rows with per-sample weights
    pub fn fit(
        rows: &[Vec<f64>],
        labels: &[u8],
        sample_weights: &[f64],
        config: &LogisticConfig,
    ) -> PipelineResult<Self> {
        let n_features = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| PipelineError::InsufficientData("cannot fit on zero rows".into()))?;
        if labels.len() != rows.len() || sample_weights.len() != rows.len() {
            return Err(PipelineError::DataQuality(
                "rows, labels and weights differ in length".into(),
            ));
        }

        let total_weight: f64 = sample_weights.iter().sum();
        if total_weight <= 0.0 {
            return Err(PipelineError::DataQuality("sample weights sum to zero".into()));
        }
        let reg = 1.0 / (config.c * total_weight);

        let mut coefficients = vec![0.0; n_features];
        let mut intercept = 0.0;
        let mut grad_w = vec![0.0; n_features];
        let mut n_iter = 0;
        let mut converged = false;

        while n_iter < config.max_iter {
            n_iter += 1;
            grad_w.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;

            for ((row, &label), &weight) in rows.iter().zip(labels).zip(sample_weights) {
                let p = sigmoid(dot(&coefficients, row) + intercept);
                let residual = weight * (p - f64::from(label)) / total_weight;
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += residual * x;
                }
                grad_b += residual;
            }
            for (g, w) in grad_w.iter_mut().zip(&coefficients) {
                *g += reg * w;
            }

            let norm = (grad_w.iter().map(|g| g * g).sum::<f64>() + grad_b * grad_b).sqrt();
            if norm < config.tolerance {
                converged = true;
                break;
            }

            for (w, g) in coefficients.iter_mut().zip(&grad_w) {
                *w -= config.learning_rate * g;
            }
            intercept -= config.learning_rate * grad_b;
        }

        debug!(n_iter, converged, "Logistic regression fitted");

        Ok(Self {
            coefficients,
            intercept,
            n_iter,
            converged,
        })
    }

    /// Probability of class 1
    pub fn predict_positive(&self, row: &[f64]) -> PipelineResult<f64> {
        if row.len() != self.coefficients.len() {
            return Err(PipelineError::Inference(format!(
                "linear model expects {} features, got {}",
                self.coefficients.len(),
                row.len()
            )));
        }
        Ok(sigmoid(dot(&self.coefficients, row) + self.intercept))
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
