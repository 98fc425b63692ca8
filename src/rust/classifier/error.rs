use ort::Error as OrtError;
use std::io;

use crate::model_manager::ModelError;

/// Represents the different types of errors that can occur while training or serving
/// the intent classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// Error occurred while loading or using the tokenizer
    #[error("Tokenizer error: {0}")]
    TokenizerError(String),
    /// Error occurred while loading or running the ONNX model
    #[error("Model error: {0}")]
    ModelError(String),
    /// Error occurred while assembling an embedder or classifier
    #[error("Build error: {0}")]
    BuildError(String),
    /// Error occurred while making predictions
    #[error("Prediction error: {0}")]
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// The training dataset is missing, unreadable or malformed
    #[error("Dataset error: {0}")]
    DatasetError(String),
    /// The classifier artifact could not be written or parsed
    #[error("Artifact error: {0}")]
    ArtifactError(String),
    /// The artifact was produced with a different embedding model than the one loaded
    #[error("Incompatible artifact: {0}")]
    IncompatibleArtifact(String),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl ClassifierError {
    /// Whether the error was caused by the caller's input rather than the service itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ValidationError(_))
    }
}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::ModelError(err.to_string())
    }
}

impl From<ModelError> for ClassifierError {
    fn from(err: ModelError) -> Self {
        ClassifierError::BuildError(format!("Failed to prepare embedding model: {}", err))
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::ArtifactError(err.to_string())
    }
}

impl From<csv::Error> for ClassifierError {
    fn from(err: csv::Error) -> Self {
        ClassifierError::DatasetError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(ClassifierError::ValidationError("empty".into()).is_client_error());
        assert!(!ClassifierError::ModelError("boom".into()).is_client_error());
        assert!(!ClassifierError::PredictionError("nan".into()).is_client_error());
    }

    #[test]
    fn test_display_prefixes() {
        let err = ClassifierError::DatasetError("row 3 has an empty label".into());
        assert_eq!(err.to_string(), "Dataset error: row 3 has an empty label");
    }
}
