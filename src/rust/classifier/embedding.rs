use tokenizers::Tokenizer;
use ort::session::Session;
use ndarray::{Array1, Array2};
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::Path;
use log::{debug, info};

use super::error::ClassifierError;
use super::utils::normalize_vector;
use crate::models::{BuiltinModel, ModelCharacteristics};
use crate::runtime::{create_session_builder, RuntimeConfig};
use crate::model_manager::ModelManager;

/// Turns text into fixed-size, L2-normalised embedding vectors.
///
/// Implementations must be deterministic for a given loaded model and safe to share
/// across threads: the trainer embeds the whole dataset through one instance and the
/// service calls it concurrently from blocking worker threads.
pub trait TextEmbedding: Send + Sync {
    /// Converts text into a normalized embedding vector of length `embedding_size()`.
    fn embed_text(&self, text: &str) -> Result<Array1<f32>, ClassifierError>;

    /// Dimension of every vector this embedder produces
    fn embedding_size(&self) -> usize;

    /// Stable identifier of the underlying model, recorded in classifier artifacts
    fn model_id(&self) -> &str;

    /// Embeds every text into one row of the returned `(texts.len(), embedding_size)` matrix.
    ///
    /// # Errors
    /// - Forwards all errors from `embed_text()`
    /// - `ModelError` if any vector has a dimension other than `embedding_size()`
    fn embed_batch(&self, texts: &[String]) -> Result<Array2<f32>, ClassifierError> {
        let dim = self.embedding_size();
        let mut matrix = Array2::zeros((texts.len(), dim));
        for (i, text) in texts.iter().enumerate() {
            let vector = self.embed_text(text)?;
            if vector.len() != dim {
                return Err(ClassifierError::ModelError(format!(
                    "Embedding for row {} has dimension {} (expected {})",
                    i + 1,
                    vector.len(),
                    dim
                )));
            }
            matrix.row_mut(i).assign(&vector);
        }
        Ok(matrix)
    }
}

/// Sentence embeddings from an ONNX transformer model.
///
/// The ONNX model is expected to:
/// - Accept `input_ids` and `attention_mask` (and optionally `token_type_ids`),
///   each shaped `[batch_size, sequence_length]`
/// - Output token embeddings `[batch_size, sequence_length, embedding_size]`, or an
///   already pooled `[batch_size, embedding_size]`
///
/// Token embeddings are mean-pooled over the attention mask and L2-normalised.
#[derive(Debug)]
pub struct OnnxEmbedder {
    model_id: String,
    tokenizer: Tokenizer,
    session: Session,
    characteristics: ModelCharacteristics,
    uses_token_type_ids: bool,
}

impl OnnxEmbedder {
    /// Loads a built-in model that `ModelManager` has already downloaded.
    ///
    /// # Errors
    /// - `BuildError` if the model is not downloaded or fails to load
    /// - `ModelError` if the model's embedding size differs from the advertised one
    pub fn from_builtin(
        manager: &ModelManager,
        model: BuiltinModel,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let info = model.get_model_info();
        if !manager.is_model_downloaded(&info.name) {
            return Err(ClassifierError::BuildError(format!(
                "Model '{:?}' is not downloaded. Run `nlu download` first",
                model
            )));
        }

        let expected = model.characteristics();
        let embedder = Self::load(
            model.model_id(),
            &manager.get_model_path(&info.name),
            &manager.get_tokenizer_path(&info.name),
            Some(expected.max_sequence_length),
            runtime_config,
        )?;

        if embedder.characteristics.embedding_size != expected.embedding_size {
            return Err(ClassifierError::ModelError(format!(
                "Model '{:?}' produced {}-dimensional embeddings (expected {})",
                model, embedder.characteristics.embedding_size, expected.embedding_size
            )));
        }
        Ok(embedder)
    }

    /// Loads a custom ONNX model and tokenizer.
    ///
    /// The embedding size is inferred by embedding a fixed sample sentence. `max_sequence_length`
    /// defaults to 256 tokens; longer inputs are truncated.
    ///
    /// # Errors
    /// - `BuildError` if a path is empty or missing, or the tokenizer fails to load
    /// - `ModelError` if the model structure is invalid or the sample run fails
    pub fn load(
        model_id: &str,
        model_path: &Path,
        tokenizer_path: &Path,
        max_sequence_length: Option<usize>,
        runtime_config: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        if model_path.as_os_str().is_empty() || tokenizer_path.as_os_str().is_empty() {
            return Err(ClassifierError::BuildError("Model and tokenizer paths cannot be empty".to_string()));
        }
        if !model_path.exists() {
            return Err(ClassifierError::BuildError(format!("Model file not found: {}", model_path.display())));
        }
        if !tokenizer_path.exists() {
            return Err(ClassifierError::BuildError(format!("Tokenizer file not found: {}", tokenizer_path.display())));
        }

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| ClassifierError::BuildError(format!("Failed to load tokenizer: {}", e)))?;
        info!("Tokenizer loaded from {}", tokenizer_path.display());

        let session = create_session_builder(runtime_config)?.commit_from_file(model_path)?;
        Self::validate_model(&session)?;
        let uses_token_type_ids = session.inputs.iter().any(|input| input.name == "token_type_ids");
        info!("Model structure validated ({} inputs)", session.inputs.len());

        let mut embedder = Self {
            model_id: model_id.to_string(),
            tokenizer,
            session,
            characteristics: ModelCharacteristics {
                embedding_size: 0,
                max_sequence_length: max_sequence_length.unwrap_or(256),
                model_size_mb: 0,
            },
            uses_token_type_ids,
        };

        let sample = embedder.run_model("Test input to infer embedding size")?;
        embedder.characteristics.embedding_size = sample.len();
        info!("Inferred embedding size from model: {}", sample.len());

        Ok(embedder)
    }

    pub fn characteristics(&self) -> &ModelCharacteristics {
        &self.characteristics
    }

    /// Counts the tokens the tokenizer produces for `text`, before truncation.
    pub fn count_tokens(&self, text: &str) -> Result<usize, ClassifierError> {
        self.tokenizer
            .encode(text, true)
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))
            .map(|encoding| encoding.get_ids().len())
    }

    fn run_model(&self, text: &str) -> Result<Array1<f32>, ClassifierError> {
        let encoding = self.tokenizer
            .encode(text, true)
            .map_err(|e| ClassifierError::TokenizerError(e.to_string()))?;

        let max_length = self.characteristics.max_sequence_length;
        let mut ids = encoding.get_ids().to_vec();
        let mut mask = encoding.get_attention_mask().to_vec();
        if ids.len() > max_length {
            debug!("Truncating input from {} to {} tokens", ids.len(), max_length);
            ids.truncate(max_length);
            mask.truncate(max_length);
        }
        let seq_len = ids.len();

        let to_input = |values: Vec<i64>, name: &str| -> Result<Tensor<i64>, ClassifierError> {
            let array = Array2::from_shape_vec((1, seq_len), values)
                .map_err(|e| ClassifierError::ModelError(format!("Failed to create {} array: {}", name, e)))?;
            Tensor::from_array(array)
                .map_err(|e| ClassifierError::ModelError(format!("Failed to create {} tensor: {}", name, e)))
        };

        let mut input_tensors = HashMap::new();
        input_tensors.insert("input_ids", to_input(ids.iter().map(|&x| x as i64).collect(), "input_ids")?);
        input_tensors.insert("attention_mask", to_input(mask.iter().map(|&x| x as i64).collect(), "attention_mask")?);
        if self.uses_token_type_ids {
            input_tensors.insert("token_type_ids", to_input(vec![0i64; seq_len], "token_type_ids")?);
        }

        let outputs = self.session.run(input_tensors)
            .map_err(|e| ClassifierError::ModelError(format!("Failed to run model: {}", e)))?;
        let output = outputs[0].try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::ModelError(format!("Failed to extract output tensor: {}", e)))?;

        let shape = output.shape().to_vec();
        let embedding = match shape.as_slice() {
            [_, tokens, hidden] => {
                let mut sum = Array1::<f32>::zeros(*hidden);
                let mut count = 0.0f32;
                for t in 0..(*tokens).min(seq_len) {
                    if mask[t] == 0 {
                        continue;
                    }
                    let token = output.slice(ndarray::s![0, t, ..]);
                    for (acc, &v) in sum.iter_mut().zip(token.iter()) {
                        *acc += v;
                    }
                    count += 1.0;
                }
                if count > 0.0 {
                    sum / count
                } else {
                    sum
                }
            }
            [_, hidden] => {
                let pooled = output.slice(ndarray::s![0, ..]);
                let mut embedding = Array1::<f32>::zeros(*hidden);
                embedding.assign(&Array1::from_iter(pooled.iter().cloned()));
                embedding
            }
            other => {
                return Err(ClassifierError::ModelError(format!(
                    "Unexpected model output shape {:?}",
                    other
                )))
            }
        };

        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(ClassifierError::ModelError("Model produced non-finite embedding values".into()));
        }
        Ok(normalize_vector(&embedding))
    }

    /// Validates that the model has the expected input/output structure
    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        let inputs = &session.inputs;
        if inputs.len() < 2 {
            return Err(ClassifierError::ModelError(
                format!("Model must have at least 2 inputs (input_ids and attention_mask), found {}", inputs.len())
            ));
        }
        for required in ["input_ids", "attention_mask"] {
            if !inputs.iter().any(|input| input.name == required) {
                return Err(ClassifierError::ModelError(format!("Model is missing the '{}' input", required)));
            }
        }
        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelError(
                "Model must have at least 1 output for embeddings".to_string()
            ));
        }
        Ok(())
    }
}

impl TextEmbedding for OnnxEmbedder {
    fn embed_text(&self, text: &str) -> Result<Array1<f32>, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::ValidationError("Input text cannot be empty".into()));
        }
        self.run_model(text)
    }

    fn embedding_size(&self) -> usize {
        self.characteristics.embedding_size
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_are_build_errors() {
        let config = RuntimeConfig::default();
        let result = OnnxEmbedder::load("custom", Path::new(""), Path::new("tokenizer.json"), None, &config);
        assert!(matches!(result, Err(ClassifierError::BuildError(_))));

        let result = OnnxEmbedder::load(
            "custom",
            Path::new("/nonexistent/model.onnx"),
            Path::new("/nonexistent/tokenizer.json"),
            None,
            &config,
        );
        assert!(matches!(result, Err(ClassifierError::BuildError(_))));
    }

    #[tokio::test]
    #[ignore = "downloads the MiniLM model"]
    async fn test_minilm_embeddings_are_normalized() -> Result<(), Box<dyn std::error::Error>> {
        let manager = ModelManager::new_default()?;
        manager.ensure_model_downloaded(&BuiltinModel::MiniLM.get_model_info()).await?;
        let embedder = OnnxEmbedder::from_builtin(&manager, BuiltinModel::MiniLM, &RuntimeConfig::default())?;

        let v = embedder.embed_text("book me a flight to Paris")?;
        assert_eq!(v.len(), 384);
        assert!((v.dot(&v) - 1.0).abs() < 1e-4);
        assert!(embedder.count_tokens("book me a flight")? > 0);
        Ok(())
    }
}
