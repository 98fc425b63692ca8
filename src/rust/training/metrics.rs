use std::fmt;

use crate::classifier::ClassifierError;

#[derive(Debug, Clone, PartialEq)]
pub struct LabelMetrics {
    pub label: String,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AverageMetrics {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

/// Per-label precision, recall and F1 on a held-out set, with accuracy and the macro
/// and support-weighted averages. Undefined ratios (no predictions or no support for a
/// label) count as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub per_label: Vec<LabelMetrics>,
    pub accuracy: f32,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub total: usize,
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

impl ClassificationReport {
    /// Scores `predicted` against `expected`; both hold indices into `labels`.
    pub fn from_predictions(
        labels: &[String],
        expected: &[usize],
        predicted: &[usize],
    ) -> Result<Self, ClassifierError> {
        if expected.len() != predicted.len() {
            return Err(ClassifierError::ValidationError(format!(
                "{} expected labels but {} predictions",
                expected.len(),
                predicted.len()
            )));
        }
        if expected.is_empty() {
            return Err(ClassifierError::ValidationError("Cannot evaluate on an empty test set".into()));
        }
        if let Some(&bad) = expected.iter().chain(predicted).find(|&&i| i >= labels.len()) {
            return Err(ClassifierError::ValidationError(format!("Class index {} has no label", bad)));
        }

        let k = labels.len();
        let mut true_pos = vec![0usize; k];
        let mut predicted_count = vec![0usize; k];
        let mut support = vec![0usize; k];
        for (&e, &p) in expected.iter().zip(predicted) {
            support[e] += 1;
            predicted_count[p] += 1;
            if e == p {
                true_pos[e] += 1;
            }
        }

        let per_label: Vec<LabelMetrics> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let precision = ratio(true_pos[i], predicted_count[i]);
                let recall = ratio(true_pos[i], support[i]);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                LabelMetrics { label: label.clone(), precision, recall, f1, support: support[i] }
            })
            .collect();

        let total = expected.len();
        let correct: usize = true_pos.iter().sum();
        let macro_avg = AverageMetrics {
            precision: per_label.iter().map(|m| m.precision).sum::<f32>() / k as f32,
            recall: per_label.iter().map(|m| m.recall).sum::<f32>() / k as f32,
            f1: per_label.iter().map(|m| m.f1).sum::<f32>() / k as f32,
        };
        let weighted = |f: fn(&LabelMetrics) -> f32| {
            per_label.iter().map(|m| f(m) * m.support as f32).sum::<f32>() / total as f32
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
        };

        Ok(Self {
            per_label,
            accuracy: ratio(correct, total),
            macro_avg,
            weighted_avg,
            total,
        })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_label
            .iter()
            .map(|m| m.label.chars().count())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(0);

        writeln!(f, "{:>width$} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for m in &self.per_label {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                m.label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{:>width$} {:>9} {:>9} {:>9.2} {:>9}", "accuracy", "", "", self.accuracy, self.total)?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, self.total
            )?;
        }
        Ok(())
    }
}
