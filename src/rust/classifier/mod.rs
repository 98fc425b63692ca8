mod error;
mod embedding;
mod hashing;
mod logistic;
mod model;
mod artifact;
mod utils;

pub use error::ClassifierError;
pub use embedding::{OnnxEmbedder, TextEmbedding};
pub use hashing::HashingEmbedder;
pub use logistic::{LogisticRegression, LogisticRegressionConfig};
pub use model::IntentClassifier;
pub use artifact::{TrainingMetadata, FORMAT_VERSION};

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone)]
pub struct ClassifierInfo {
    /// Identifier of the embedding model the classifier was trained on
    pub embedding_model: String,
    /// Size of the embedding vectors
    pub embedding_size: usize,
    /// Number of classes the classifier is trained on
    pub num_classes: usize,
    /// Labels of the classes, in class-index order
    pub class_labels: Vec<String>,
}
