use std::collections::HashSet;
use std::sync::Arc;
use ndarray::ArrayView1;

use super::artifact::TrainingMetadata;
use super::embedding::TextEmbedding;
use super::error::ClassifierError;
use super::logistic::LogisticRegression;
use super::ClassifierInfo;

/// A fitted intent classifier: a linear model over embeddings plus the label for
/// each class index.
///
/// Instances are immutable once built; share them across threads with `Arc`.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    labels: Arc<Vec<String>>,
    model: LogisticRegression,
    embedding_model: String,
    metadata: TrainingMetadata,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<IntentClassifier>();
    }
};

impl IntentClassifier {
    /// Pairs a fitted model with its labels.
    ///
    /// `labels[i]` names class index `i`. Labels must be non-empty and unique, and there
    /// must be exactly one per model class.
    pub fn new(
        labels: Vec<String>,
        model: LogisticRegression,
        embedding_model: impl Into<String>,
        metadata: TrainingMetadata,
    ) -> Result<Self, ClassifierError> {
        if labels.len() != model.n_classes() {
            return Err(ClassifierError::BuildError(format!(
                "{} labels for a model with {} classes",
                labels.len(),
                model.n_classes()
            )));
        }
        if let Some(pos) = labels.iter().position(|l| l.trim().is_empty()) {
            return Err(ClassifierError::BuildError(format!("Label {} is empty", pos + 1)));
        }
        {
            let mut seen = HashSet::new();
            if let Some(dup) = labels.iter().find(|l| !seen.insert(l.as_str())) {
                return Err(ClassifierError::BuildError(format!("Duplicate label '{}'", dup)));
            }
        }

        Ok(Self {
            labels: Arc::new(labels),
            model,
            embedding_model: embedding_model.into(),
            metadata,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn model(&self) -> &LogisticRegression {
        &self.model
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn embedding_size(&self) -> usize {
        self.model.n_features()
    }

    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> ClassifierInfo {
        ClassifierInfo {
            embedding_model: self.embedding_model.clone(),
            embedding_size: self.embedding_size(),
            num_classes: self.labels.len(),
            class_labels: self.labels.to_vec(),
        }
    }

    /// Fails unless `embedder` produces vectors this classifier was trained on.
    pub fn check_compatible(&self, embedder: &dyn TextEmbedding) -> Result<(), ClassifierError> {
        if embedder.embedding_size() != self.embedding_size() {
            return Err(ClassifierError::IncompatibleArtifact(format!(
                "classifier expects {}-dimensional embeddings but '{}' produces {}",
                self.embedding_size(),
                embedder.model_id(),
                embedder.embedding_size()
            )));
        }
        if embedder.model_id() != self.embedding_model {
            return Err(ClassifierError::IncompatibleArtifact(format!(
                "classifier was trained on '{}' embeddings but '{}' is loaded",
                self.embedding_model,
                embedder.model_id()
            )));
        }
        Ok(())
    }

    /// Label of the most probable class for an embedding.
    pub fn predict_vector(&self, embedding: ArrayView1<f32>) -> Result<&str, ClassifierError> {
        let index = self.model.predict(embedding)?;
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| ClassifierError::PredictionError(format!("Class index {} has no label", index)))
    }

    /// Per-label probabilities for an embedding, most probable first.
    pub fn predict_scores(&self, embedding: ArrayView1<f32>) -> Result<Vec<(String, f32)>, ClassifierError> {
        let proba = self.model.predict_proba(embedding)?;
        let mut scores: Vec<(String, f32)> = self.labels.iter().cloned().zip(proba.iter().copied()).collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::HashingEmbedder;
    use ndarray::{array, Array1, Array2};

    fn two_class(labels: &[&str]) -> Result<IntentClassifier, ClassifierError> {
        let model = LogisticRegression::from_parameters(
            array![[1.0f32, 0.0], [0.0, 1.0]],
            Array1::zeros(2),
        )?;
        IntentClassifier::new(
            labels.iter().map(|s| s.to_string()).collect(),
            model,
            "test-embedder",
            TrainingMetadata::default(),
        )
    }

    #[test]
    fn test_predicts_label_for_index() -> Result<(), ClassifierError> {
        let classifier = two_class(&["greet", "goodbye"])?;
        assert_eq!(classifier.predict_vector(array![0.9f32, 0.1].view())?, "greet");
        assert_eq!(classifier.predict_vector(array![0.1f32, 0.9].view())?, "goodbye");

        let scores = classifier.predict_scores(array![0.1f32, 0.9].view())?;
        assert_eq!(scores[0].0, "goodbye");
        assert!(scores[0].1 > scores[1].1);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_labels() {
        assert!(two_class(&["greet"]).is_err());
        assert!(two_class(&["greet", "greet"]).is_err());
        assert!(two_class(&["greet", " "]).is_err());
    }

    #[test]
    fn test_compatibility_check() -> Result<(), ClassifierError> {
        let model = LogisticRegression::from_parameters(Array2::zeros((2, 16)), Array1::zeros(2))?;
        let classifier = IntentClassifier::new(
            vec!["a".into(), "b".into()],
            model,
            "hashing-16",
            TrainingMetadata::default(),
        )?;
        assert!(classifier.check_compatible(&HashingEmbedder::new(16)).is_ok());
        assert!(matches!(
            classifier.check_compatible(&HashingEmbedder::new(32)),
            Err(ClassifierError::IncompatibleArtifact(_))
        ));
        Ok(())
    }

    #[test]
    fn test_info() -> Result<(), ClassifierError> {
        let info = two_class(&["greet", "goodbye"])?.info();
        assert_eq!(info.num_classes, 2);
        assert_eq!(info.embedding_size, 2);
        assert_eq!(info.class_labels, vec!["greet", "goodbye"]);
        Ok(())
    }
}
