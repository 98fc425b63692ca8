//! Typed configuration for the trainer, the service and the embedding backend.
//!
//! Defaults live here; the binary layers environment variables and command-line flags
//! on top of them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use log::info;

use crate::classifier::{ClassifierError, HashingEmbedder, LogisticRegressionConfig, OnnxEmbedder, TextEmbedding};
use crate::model_manager::{sha256_file, ModelManager};
use crate::models::BuiltinModel;
use crate::runtime::RuntimeConfig;

pub const DEFAULT_DATASET_PATH: &str = "data/intents.csv";
pub const DEFAULT_ARTIFACT_PATH: &str = "models/intent_clf.json";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TEST_SIZE: f32 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub dataset_path: PathBuf,
    pub artifact_path: PathBuf,
    /// Fraction of each label's examples held out for evaluation
    pub test_size: f32,
    pub seed: u64,
    pub model: LogisticRegressionConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            test_size: DEFAULT_TEST_SIZE,
            seed: DEFAULT_SEED,
            model: LogisticRegressionConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ClassifierError::ValidationError(format!(
                "test_size must be between 0 and 1 (exclusive), got {}",
                self.test_size
            )));
        }
        self.model.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub artifact_path: PathBuf,
    pub bind_addr: String,
    pub max_body_bytes: usize,
    /// Time a client gets to deliver a complete request
    pub read_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Which embedding backend to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmbedderKind {
    /// ONNX sentence-embedding model (built-in MiniLM unless a custom model is given)
    Onnx,
    /// Offline feature-hashing embedder
    Hashing,
}

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub kind: EmbedderKind,
    /// Custom ONNX model; requires `tokenizer` as well
    pub onnx_model: Option<PathBuf>,
    pub tokenizer: Option<PathBuf>,
    pub max_sequence_length: Option<usize>,
    pub hashing_dim: usize,
    /// Re-download the built-in model even if a verified copy is cached
    pub fresh: bool,
    pub runtime: RuntimeConfig,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::Onnx,
            onnx_model: None,
            tokenizer: None,
            max_sequence_length: None,
            hashing_dim: 384,
            fresh: false,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl EmbedderConfig {
    /// Loads the configured embedder, downloading the built-in model when needed.
    pub async fn build(&self) -> Result<Arc<dyn TextEmbedding>, ClassifierError> {
        match self.kind {
            EmbedderKind::Hashing => {
                let embedder = HashingEmbedder::new(self.hashing_dim);
                embedder.validate()?;
                info!("Using hashing embedder ({} dimensions)", self.hashing_dim);
                Ok(Arc::new(embedder))
            }
            EmbedderKind::Onnx => match (&self.onnx_model, &self.tokenizer) {
                (Some(model_path), Some(tokenizer_path)) => {
                    let model_id = format!("onnx-{}", &sha256_file(model_path)?[..16]);
                    info!("Loading custom ONNX model {} as '{}'", model_path.display(), model_id);
                    let embedder = OnnxEmbedder::load(
                        &model_id,
                        model_path,
                        tokenizer_path,
                        self.max_sequence_length,
                        &self.runtime,
                    )?;
                    Ok(Arc::new(embedder))
                }
                (None, None) => {
                    let model = BuiltinModel::MiniLM;
                    let info = model.get_model_info();
                    let manager = ModelManager::new_default()?;
                    if self.fresh {
                        info!("Fresh download requested - removing any existing model files...");
                        manager.remove_download(&info.name)?;
                    }
                    manager.ensure_model_downloaded(&info).await?;
                    let embedder = OnnxEmbedder::from_builtin(&manager, model, &self.runtime)?;
                    Ok(Arc::new(embedder))
                }
                _ => Err(ClassifierError::BuildError(
                    "A custom ONNX model needs both a model path and a tokenizer path".into(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.dataset_path, PathBuf::from("data/intents.csv"));
        assert_eq!(config.artifact_path, PathBuf::from("models/intent_clf.json"));
        assert_eq!(config.seed, 42);
        assert_eq!(config.model.max_iter, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.max_body_bytes, 64 * 1024);
        assert_eq!(config.read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_test_size() {
        for test_size in [0.0, 1.0, -0.5, f32::NAN] {
            let config = TrainingConfig { test_size, ..Default::default() };
            assert!(config.validate().is_err(), "test_size {} should be rejected", test_size);
        }
    }

    #[tokio::test]
    async fn test_build_hashing_embedder() -> Result<(), ClassifierError> {
        let config = EmbedderConfig { kind: EmbedderKind::Hashing, hashing_dim: 64, ..Default::default() };
        let embedder = config.build().await?;
        assert_eq!(embedder.embedding_size(), 64);
        assert_eq!(embedder.model_id(), "hashing-64");
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_model_needs_both_paths() {
        let config = EmbedderConfig {
            onnx_model: Some(PathBuf::from("model.onnx")),
            ..Default::default()
        };
        assert!(matches!(config.build().await, Err(ClassifierError::BuildError(_))));
    }
}
