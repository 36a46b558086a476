//! Bagged decision-tree ensemble
//!
//! Each tree is grown on a bootstrap sample with Gini impurity, balanced
//! class weights, and `sqrt(n_features)` candidate features per split.
//! The ensemble probability is the mean of the per-tree leaf class
//! distributions.
//!
//! Trees use an array-based node layout: children are indices into the
//! tree's node vector, so a fitted tree serializes as a flat list.

use crate::error::{PipelineError, PipelineResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum impurity decrease for a split to be kept
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// Hyperparameters for the tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    /// A node needs at least this many distinct samples to be split
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

/// A node in a fitted tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Samples with `feature <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Weighted class distribution of the training samples that reached it
    Leaf { proba: [f64; 2] },
}

/// A fitted decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Class distribution of the leaf `row` lands in
    pub fn predict_proba(&self, row: &[f64]) -> PipelineResult<[f64; 2]> {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { proba }) => return Ok(*proba),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().ok_or_else(|| {
                        PipelineError::Inference(format!("tree references missing feature {}", feature))
                    })?;
                    idx = if value <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(PipelineError::Inference(format!(
                        "tree node {} out of range",
                        idx
                    )))
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Longest root-to-leaf path
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        self.node_depth(0)
    }

    fn node_depth(&self, idx: usize) -> usize {
        match self.nodes.get(idx) {
            Some(TreeNode::Split { left, right, .. }) if *left > idx && *right > idx => {
                1 + self.node_depth(*left).max(self.node_depth(*right))
            }
            _ => 0,
        }
    }

    /// Check that every split points forward to nodes inside the tree
    ///
    /// Trees are built in pre-order, so children always follow their parent.
    /// A tree passing this check cannot contain a cycle.
    pub fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {} splits on missing feature {}", idx, feature));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", idx));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child index {}", idx, child));
                        }
                    }
                }
                TreeNode::Leaf { proba } => {
                    if !proba.iter().all(|p| p.is_finite()) {
                        return Err(format!("leaf {} has non-finite probabilities", idx));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Fitted tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], config: &ForestConfig) -> PipelineResult<Self> {
        let n_features = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| PipelineError::InsufficientData("cannot fit on zero rows".into()))?;
        if labels.len() != rows.len() {
            return Err(PipelineError::DataQuality("rows and labels differ in length".into()));
        }
        if config.n_trees == 0 {
            return Err(PipelineError::DataQuality("tree ensemble needs at least one tree".into()));
        }

        let class_weights = balanced_class_weights(labels);
        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let mut master = StdRng::seed_from_u64(config.seed);

        let mut trees = Vec::with_capacity(config.n_trees);
        let mut importances = vec![0.0; n_features];

        for _ in 0..config.n_trees {
            let mut rng = StdRng::seed_from_u64(master.gen::<u64>());

            // Bootstrap counts become sample weights
            let mut counts = vec![0usize; rows.len()];
            for _ in 0..rows.len() {
                counts[rng.gen_range(0..rows.len())] += 1;
            }
            let weights: Vec<f64> = counts
                .iter()
                .zip(labels)
                .map(|(&c, &label)| c as f64 * class_weights[usize::from(label)])
                .collect();
            let indices: Vec<usize> = (0..rows.len()).filter(|&i| counts[i] > 0).collect();

            let mut builder = TreeBuilder {
                rows,
                labels,
                weights: &weights,
                config,
                max_features,
                rng,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
            };
            builder.grow(indices, 0);

            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, imp) in importances.iter_mut().zip(&builder.importances) {
                    *acc += imp / tree_total;
                }
            }
            trees.push(DecisionTree { nodes: builder.nodes });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        let forest = Self {
            trees,
            n_features,
            feature_importances: importances,
        };
        debug!(
            n_trees = forest.n_trees(),
            avg_depth = forest.avg_depth(),
            "Tree ensemble fitted"
        );
        Ok(forest)
    }

    /// `[p(class 0), p(class 1)]` averaged over all trees
    pub fn predict_proba(&self, row: &[f64]) -> PipelineResult<[f64; 2]> {
        if row.len() != self.n_features {
            return Err(PipelineError::Inference(format!(
                "tree ensemble expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        if self.trees.is_empty() {
            return Err(PipelineError::Inference("empty tree ensemble".into()));
        }

        let mut sum = [0.0; 2];
        for tree in &self.trees {
            let p = tree.predict_proba(row)?;
            sum[0] += p[0];
            sum[1] += p[1];
        }
        let n = self.trees.len() as f64;
        Ok([sum[0] / n, sum[1] / n])
    }

    /// Normalized mean impurity decrease per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Check tree structure and importance width against `n_features`
    pub fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("tree ensemble has no trees".into());
        }
        if self.feature_importances.len() != self.n_features {
            return Err(format!(
                "tree ensemble has {} importances for {} features",
                self.feature_importances.len(),
                self.n_features
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }

    pub fn avg_depth(&self) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: usize = self.trees.iter().map(DecisionTree::depth).sum();
        total as f64 / self.trees.len() as f64
    }
}

/// `n / (n_classes * count_c)` for each class present
pub fn balanced_class_weights(labels: &[u8]) -> [f64; 2] {
    let mut counts = [0usize; 2];
    for &label in labels {
        counts[usize::from(label.min(1))] += 1;
    }
    let n = labels.len() as f64;
    let mut weights = [0.0; 2];
    for (w, &c) in weights.iter_mut().zip(&counts) {
        if c > 0 {
            *w = n / (2.0 * c as f64);
        }
    }
    weights
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    labels: &'a [u8],
    weights: &'a [f64],
    config: &'a ForestConfig,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `indices`, returning its node index
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let totals = self.class_totals(&indices);
        let weight = totals[0] + totals[1];
        let impurity = gini(totals);

        let can_split = depth < self.config.max_depth
            && indices.len() >= self.config.min_samples_split
            && impurity > 0.0;

        let candidate = if can_split {
            self.best_split(&indices, weight * impurity)
        } else {
            None
        };

        let Some(split) = candidate else {
            let proba = if weight > 0.0 {
                [totals[0] / weight, totals[1] / weight]
            } else {
                [0.5, 0.5]
            };
            self.nodes.push(TreeNode::Leaf { proba });
            return self.nodes.len() - 1;
        };

        self.importances[split.feature] += split.decrease;

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.rows[i][split.feature] <= split.threshold);

        let node_idx = self.nodes.len();
        self.nodes.push(TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });
        let left_idx = self.grow(left, depth + 1);
        let right_idx = self.grow(right, depth + 1);
        if let TreeNode::Split { left, right, .. } = &mut self.nodes[node_idx] {
            *left = left_idx;
            *right = right_idx;
        }
        node_idx
    }

    fn class_totals(&self, indices: &[usize]) -> [f64; 2] {
        let mut totals = [0.0; 2];
        for &i in indices {
            totals[usize::from(self.labels[i].min(1))] += self.weights[i];
        }
        totals
    }

    /// Visit shuffled features until `max_features` non-constant ones were scored
    fn best_split(&mut self, indices: &[usize], parent_cost: f64) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.rows[indices[0]].len()).collect();
        features.shuffle(&mut self.rng);

        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;

        for feature in features {
            if visited >= self.max_features {
                break;
            }
            let mut order: Vec<usize> = indices.to_vec();
            order.sort_by(|&a, &b| {
                self.rows[a][feature]
                    .partial_cmp(&self.rows[b][feature])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let first = self.rows[order[0]][feature];
            let last = self.rows[order[order.len() - 1]][feature];
            if first == last {
                continue;
            }
            visited += 1;

            let totals = self.class_totals(&order);
            let mut left = [0.0; 2];
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left[usize::from(self.labels[i].min(1))] += self.weights[i];

                let current = self.rows[i][feature];
                let next = self.rows[order[pos + 1]][feature];
                if current == next {
                    continue;
                }

                let right = [totals[0] - left[0], totals[1] - left[1]];
                let cost = (left[0] + left[1]) * gini(left) + (right[0] + right[1]) * gini(right);
                let decrease = parent_cost - cost;

                if decrease > MIN_IMPURITY_DECREASE
                    && best.as_ref().map_or(true, |b| decrease > b.decrease)
                {
                    let mut threshold = (current + next) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        decrease,
                    });
                }
            }
        }

        best
    }
}

fn gini(totals: [f64; 2]) -> f64 {
    let weight = totals[0] + totals[1];
    if weight <= 0.0 {
        return 0.0;
    }
    let p0 = totals[0] / weight;
    let p1 = totals[1] / weight;
    1.0 - p0 * p0 - p1 * p1
}
