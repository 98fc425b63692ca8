//! Online inference: an immutable context of embedder + classifier, loaded once and
//! shared by every request.

pub mod http;

use std::path::Path;
use std::sync::Arc;
use log::info;

use crate::classifier::{ClassifierError, IntentClassifier, TextEmbedding};

/// Loaded state for answering `classify` requests.
///
/// Cloning is cheap; all clones share the same read-only embedder and classifier.
#[derive(Clone)]
pub struct IntentService {
    embedder: Arc<dyn TextEmbedding>,
    classifier: Arc<IntentClassifier>,
}

impl std::fmt::Debug for IntentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentService")
            .field("embedder", &self.embedder.model_id())
            .field("labels", &self.classifier.labels())
            .finish()
    }
}

impl IntentService {
    /// Pairs an embedder with a classifier trained on its embeddings.
    ///
    /// # Errors
    /// - `IncompatibleArtifact` if the classifier expects another embedding model or size
    pub fn new(embedder: Arc<dyn TextEmbedding>, classifier: Arc<IntentClassifier>) -> Result<Self, ClassifierError> {
        classifier.check_compatible(embedder.as_ref())?;
        Ok(Self { embedder, classifier })
    }

    /// Loads the classifier artifact at `artifact_path` for use with `embedder`.
    pub fn load(embedder: Arc<dyn TextEmbedding>, artifact_path: &Path) -> Result<Self, ClassifierError> {
        let classifier = IntentClassifier::load(artifact_path)?;
        let service = Self::new(embedder, Arc::new(classifier))?;
        info!("Classifier ready with labels {:?}", service.labels());
        Ok(service)
    }

    pub fn labels(&self) -> &[String] {
        self.classifier.labels()
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Predicts the intent label for `text`.
    ///
    /// # Errors
    /// - `ValidationError` if `text` is empty or only whitespace
    /// - Embedding or prediction errors otherwise
    pub fn classify(&self, text: &str) -> Result<String, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Input text cannot be empty".into()));
        }
        let embedding = self.embedder.embed_text(text)?;
        self.classifier.predict_vector(embedding.view()).map(str::to_string)
    }

    /// Like [`classify`](Self::classify) but returns every label's probability, most probable first.
    pub fn classify_with_scores(&self, text: &str) -> Result<Vec<(String, f32)>, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Input text cannot be empty".into()));
        }
        let embedding = self.embedder.embed_text(text)?;
        self.classifier.predict_scores(embedding.view())
    }
}
