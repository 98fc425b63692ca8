//! Offline training: dataset → embeddings → stratified split → logistic regression →
//! held-out report → artifact.

mod dataset;
mod metrics;
mod split;

pub use dataset::{Dataset, TrainingExample};
pub use metrics::{AverageMetrics, ClassificationReport, LabelMetrics};
pub use split::{stratified_split, TrainTestSplit};

use std::time::Instant;
use ndarray::Axis;
use log::info;

use crate::classifier::{ClassifierError, IntentClassifier, LogisticRegression, TextEmbedding, TrainingMetadata};
use crate::config::TrainingConfig;

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub classifier: IntentClassifier,
    pub report: ClassificationReport,
    pub split: TrainTestSplit,
}

/// Fits intent classifiers on embeddings from a borrowed embedder.
pub struct Trainer<'a> {
    embedder: &'a dyn TextEmbedding,
    config: TrainingConfig,
}

impl<'a> Trainer<'a> {
    pub fn new(embedder: &'a dyn TextEmbedding, config: TrainingConfig) -> Self {
        Self { embedder, config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Embeds, splits, fits and evaluates without touching the filesystem.
    pub fn train(&self, dataset: &Dataset) -> Result<TrainingOutcome, ClassifierError> {
        self.config.validate()?;
        dataset.validate_for_split()?;

        let (labels, targets) = dataset.encode_labels();
        info!("Training on {} examples across {} labels", dataset.len(), labels.len());
        for (label, count) in dataset.label_counts() {
            info!("  {}: {} examples", label, count);
        }

        let start = Instant::now();
        let features = self.embedder.embed_batch(&dataset.texts())?;
        info!(
            "Embedded {} texts with '{}' ({} dimensions) in {:.2?}",
            features.nrows(),
            self.embedder.model_id(),
            features.ncols(),
            start.elapsed()
        );

        let split = stratified_split(&targets, self.config.test_size, self.config.seed)?;
        info!("Stratified split: {} train / {} test (seed {})", split.train.len(), split.test.len(), self.config.seed);

        let train_x = features.select(Axis(0), &split.train);
        let train_y: Vec<usize> = split.train.iter().map(|&i| targets[i]).collect();
        let test_x = features.select(Axis(0), &split.test);
        let test_y: Vec<usize> = split.test.iter().map(|&i| targets[i]).collect();

        let start = Instant::now();
        let model = LogisticRegression::fit(train_x.view(), &train_y, labels.len(), &self.config.model)?;
        info!(
            "Fitted logistic regression in {} iterations ({:.2?}, converged: {})",
            model.n_iter(),
            start.elapsed(),
            model.converged()
        );

        let predicted = model.predict_batch(test_x.view())?;
        let report = ClassificationReport::from_predictions(&labels, &test_y, &predicted)?;

        let metadata = TrainingMetadata {
            n_train: split.train.len(),
            n_test: split.test.len(),
            seed: self.config.seed,
            test_size: self.config.test_size,
            c: self.config.model.c,
            max_iter: self.config.model.max_iter,
            n_iter: model.n_iter(),
            converged: model.converged(),
            accuracy: Some(report.accuracy),
        };
        let classifier = IntentClassifier::new(labels, model, self.embedder.model_id(), metadata)?;

        Ok(TrainingOutcome { classifier, report, split })
    }

    /// Full pipeline: reads the dataset, trains, and saves the artifact.
    ///
    /// Nothing is written unless every earlier step succeeds.
    pub fn run(&self) -> Result<TrainingOutcome, ClassifierError> {
        info!("Loading dataset from {}", self.config.dataset_path.display());
        let dataset = Dataset::from_csv_path(&self.config.dataset_path)?;
        let outcome = self.train(&dataset)?;
        outcome.classifier.save(&self.config.artifact_path)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::HashingEmbedder;

    fn dataset() -> Dataset {
        let rows = [
            ("what's the weather tomorrow", "weather"),
            ("will it rain today", "weather"),
            ("is it sunny outside", "weather"),
            ("weather forecast for the weekend", "weather"),
            ("how cold is it tonight", "weather"),
            ("play some jazz music", "music"),
            ("put on my workout playlist", "music"),
            ("play the latest album", "music"),
            ("skip this song", "music"),
            ("turn up the music", "music"),
        ];
        Dataset::new(rows.iter().map(|(t, l)| TrainingExample::new(*t, *l)).collect()).unwrap()
    }

    #[test]
    fn test_train_produces_classifier_over_dataset_labels() -> Result<(), ClassifierError> {
        let embedder = HashingEmbedder::new(256);
        let trainer = Trainer::new(&embedder, TrainingConfig::default());
        let outcome = trainer.train(&dataset())?;

        assert_eq!(outcome.classifier.labels(), ["music", "weather"]);
        assert_eq!(outcome.classifier.embedding_model(), "hashing-256");
        assert_eq!(outcome.split.test.len(), 2);
        assert_eq!(outcome.report.total, 2);
        assert_eq!(outcome.classifier.metadata().n_train, 8);
        Ok(())
    }

    #[test]
    fn test_rejects_single_label_dataset() {
        let embedder = HashingEmbedder::default();
        let trainer = Trainer::new(&embedder, TrainingConfig::default());
        let dataset = Dataset::new(vec![
            TrainingExample::new("hello", "greet"),
            TrainingExample::new("hi there", "greet"),
        ])
        .unwrap();
        assert!(matches!(trainer.train(&dataset), Err(ClassifierError::DatasetError(_))));
    }
}
