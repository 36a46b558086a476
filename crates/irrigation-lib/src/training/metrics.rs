//! Evaluation metrics for binary classifiers
//!
//! Mirrors the classic classification report: per-class precision, recall,
//! F1 and support, plus macro and support-weighted averages. Any ratio with
//! a zero denominator is reported as 0.0.

use serde::{Deserialize, Serialize};

/// Scores for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub class: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Averaged scores across classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class report with averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassScores>,
    pub macro_avg: AverageScores,
    pub weighted_avg: AverageScores,
}

/// Evaluation of one classifier on the held-out subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub per_class_report: ClassificationReport,
    /// Rows are true classes, columns predicted classes, class 0 first
    pub confusion_matrix: [[usize; 2]; 2],
}

impl ModelMetrics {
    pub fn evaluate(y_true: &[u8], y_pred: &[u8]) -> Self {
        let confusion_matrix = confusion_matrix(y_true, y_pred);
        let total = y_true.len();
        let correct = confusion_matrix[0][0] + confusion_matrix[1][1];

        Self {
            accuracy: ratio(correct as f64, total as f64),
            per_class_report: classification_report(&confusion_matrix),
            confusion_matrix,
        }
    }
}

pub fn confusion_matrix(y_true: &[u8], y_pred: &[u8]) -> [[usize; 2]; 2] {
    let mut matrix = [[0usize; 2]; 2];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        matrix[usize::from(t.min(1))][usize::from(p.min(1))] += 1;
    }
    matrix
}

fn classification_report(matrix: &[[usize; 2]; 2]) -> ClassificationReport {
    let classes: Vec<ClassScores> = (0..2)
        .map(|c| {
            let tp = matrix[c][c] as f64;
            let predicted = (matrix[0][c] + matrix[1][c]) as f64;
            let support = matrix[c][0] + matrix[c][1];
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support as f64);
            ClassScores {
                class: c as u8,
                precision,
                recall,
                f1: ratio(2.0 * precision * recall, precision + recall),
                support,
            }
        })
        .collect();

    let total_support: usize = classes.iter().map(|c| c.support).sum();
    let n_classes = classes.len() as f64;

    let macro_avg = AverageScores {
        precision: classes.iter().map(|c| c.precision).sum::<f64>() / n_classes,
        recall: classes.iter().map(|c| c.recall).sum::<f64>() / n_classes,
        f1: classes.iter().map(|c| c.f1).sum::<f64>() / n_classes,
        support: total_support,
    };

    let weighted = |score: fn(&ClassScores) -> f64| {
        ratio(
            classes.iter().map(|c| score(c) * c.support as f64).sum(),
            total_support as f64,
        )
    };
    let weighted_avg = AverageScores {
        precision: weighted(|c| c.precision),
        recall: weighted(|c| c.recall),
        f1: weighted(|c| c.f1),
        support: total_support,
    };

    ClassificationReport {
        classes,
        macro_avg,
        weighted_avg,
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_layout() {
        let y_true = [0, 0, 1, 1, 1];
        let y_pred = [0, 1, 1, 1, 0];
        assert_eq!(confusion_matrix(&y_true, &y_pred), [[1, 1], [1, 2]]);
    }

    #[test]
    fn test_report_values() {
        let y_true = [0, 0, 1, 1, 1];
        let y_pred = [0, 1, 1, 1, 0];
        let metrics = ModelMetrics::evaluate(&y_true, &y_pred);

        assert!((metrics.accuracy - 0.6).abs() < 1e-12);
        let class1 = &metrics.per_class_report.classes[1];
        assert!((class1.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((class1.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(class1.support, 3);

        let class0 = &metrics.per_class_report.classes[0];
        assert!((class0.precision - 0.5).abs() < 1e-12);
        assert!((class0.recall - 0.5).abs() < 1e-12);

        let macro_f1 = (class0.f1 + class1.f1) / 2.0;
        assert!((metrics.per_class_report.macro_avg.f1 - macro_f1).abs() < 1e-12);
        let weighted_recall = (0.5 * 2.0 + 2.0 / 3.0 * 3.0) / 5.0;
        assert!((metrics.per_class_report.weighted_avg.recall - weighted_recall).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_reports_zero() {
        // Nothing predicted as class 1
        let metrics = ModelMetrics::evaluate(&[0, 1], &[0, 0]);
        let class1 = &metrics.per_class_report.classes[1];
        assert_eq!(class1.precision, 0.0);
        assert_eq!(class1.recall, 0.0);
        assert_eq!(class1.f1, 0.0);
    }

    #[test]
    fn test_empty_evaluation() {
        let metrics = ModelMetrics::evaluate(&[], &[]);
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.confusion_matrix, [[0, 0], [0, 0]]);
    }
}
