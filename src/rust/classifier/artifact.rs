//! On-disk form of a trained [`IntentClassifier`].
//!
//! Artifacts are JSON documents carrying a format version, the identity and dimension of
//! the embedding model the classifier was trained on, the ordered labels and the linear
//! model parameters. Loading validates all of it so an incompatible or corrupt artifact
//! fails at startup instead of producing wrong predictions.

use std::fs;
use std::path::{Path, PathBuf};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use log::info;

use super::error::ClassifierError;
use super::logistic::LogisticRegression;
use super::model::IntentClassifier;

pub const FORMAT_VERSION: u32 = 1;

/// How a classifier was trained; informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub n_train: usize,
    pub n_test: usize,
    pub seed: u64,
    pub test_size: f32,
    pub c: f32,
    pub max_iter: usize,
    pub n_iter: usize,
    pub converged: bool,
    pub accuracy: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassifierArtifact {
    format_version: u32,
    embedding_model: String,
    embedding_size: usize,
    labels: Vec<String>,
    weights: Vec<Vec<f32>>,
    intercepts: Vec<f32>,
    #[serde(default)]
    training: TrainingMetadata,
}

impl IntentClassifier {
    pub fn to_json(&self) -> Result<String, ClassifierError> {
        let artifact = ClassifierArtifact {
            format_version: FORMAT_VERSION,
            embedding_model: self.embedding_model().to_string(),
            embedding_size: self.embedding_size(),
            labels: self.labels().to_vec(),
            weights: self.model().weights().rows().into_iter().map(|r| r.to_vec()).collect(),
            intercepts: self.model().intercepts().to_vec(),
            training: self.metadata().clone(),
        };
        Ok(serde_json::to_string_pretty(&artifact)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let artifact: ClassifierArtifact = serde_json::from_str(json)?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(ClassifierError::ArtifactError(format!(
                "Unsupported artifact format version {} (expected {})",
                artifact.format_version, FORMAT_VERSION
            )));
        }
        if artifact.weights.len() != artifact.labels.len() {
            return Err(ClassifierError::ArtifactError(format!(
                "{} weight rows for {} labels",
                artifact.weights.len(),
                artifact.labels.len()
            )));
        }
        if let Some(pos) = artifact.weights.iter().position(|row| row.len() != artifact.embedding_size) {
            return Err(ClassifierError::ArtifactError(format!(
                "Weight row {} has {} entries (embedding size is {})",
                pos + 1,
                artifact.weights[pos].len(),
                artifact.embedding_size
            )));
        }

        let n_classes = artifact.weights.len();
        let flat: Vec<f32> = artifact.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((n_classes, artifact.embedding_size), flat)
            .map_err(|e| ClassifierError::ArtifactError(format!("Invalid weight matrix: {}", e)))?;
        let model = LogisticRegression::from_parameters(weights, Array1::from_vec(artifact.intercepts))?;

        IntentClassifier::new(artifact.labels, model, artifact.embedding_model, artifact.training)
            .map_err(|e| ClassifierError::ArtifactError(e.to_string()))
    }

    /// Writes the artifact to `path`, creating parent directories.
    ///
    /// The JSON is written to a temporary sibling first and renamed into place, so an
    /// interrupted save never leaves a truncated artifact behind.
    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = temp_path(path);
        if let Err(e) = fs::write(&tmp, json.as_bytes()).and_then(|_| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(ClassifierError::ArtifactError(format!(
                "Failed to write {}: {}", path.display(), e
            )));
        }
        info!("Saved classifier artifact to {} ({} bytes)", path.display(), json.len());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let json = fs::read_to_string(path).map_err(|e| {
            ClassifierError::ArtifactError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let classifier = Self::from_json(&json)?;
        info!(
            "Loaded classifier from {} ({} labels, {}-dimensional '{}' embeddings)",
            path.display(),
            classifier.labels().len(),
            classifier.embedding_size(),
            classifier.embedding_model()
        );
        Ok(classifier)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
