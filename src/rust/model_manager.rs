use std::path::{Path, PathBuf};
use std::fs;
use std::io;
use std::sync::Arc;
use std::env;
use tokio::sync::Mutex;
use sha2::{Sha256, Digest};

use crate::models::ModelInfo;

/// Environment variable overriding the model cache root
pub const CACHE_ENV_VAR: &str = "NLU_CACHE";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model not downloaded: {0}")]
    NotDownloaded(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Model verification failed")]
    VerificationFailed,
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
}

/// Downloads embedding models into a local cache and verifies them by SHA-256.
#[derive(Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        if let Ok(path) = env::var(CACHE_ENV_VAR) {
            return PathBuf::from(path).join("models");
        }
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("nlu-service").join("models");
        }
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("nlu-service").join("models");
        }
        env::temp_dir().join("nlu-service").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name).join("model.onnx")
    }

    pub fn get_tokenizer_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name).join("tokenizer.json")
    }

    pub fn is_model_downloaded(&self, name: &str) -> bool {
        let model_path = self.get_model_path(name);
        let tokenizer_path = self.get_tokenizer_path(name);
        log::debug!("Model path: {:?} (exists: {})", model_path, model_path.exists());
        log::debug!("Tokenizer path: {:?} (exists: {})", tokenizer_path, tokenizer_path.exists());
        model_path.exists() && tokenizer_path.exists()
    }

    /// Downloads any missing or corrupt file of `info`. On failure both files are removed.
    pub async fn download_model(&self, info: &ModelInfo) -> Result<(), ModelError> {
        let _lock = self.download_lock.lock().await;

        let model_dir = self.models_dir.join(&info.name);
        log::info!("Preparing model directory {:?}", model_dir);
        fs::create_dir_all(&model_dir)?;

        let model_result = self
            .fetch_if_invalid(&info.model_url, &self.get_model_path(&info.name), &info.model_hash, "model")
            .await;
        let tokenizer_result = match model_result {
            Ok(()) => {
                self.fetch_if_invalid(
                    &info.tokenizer_url,
                    &self.get_tokenizer_path(&info.name),
                    &info.tokenizer_hash,
                    "tokenizer",
                )
                .await
            }
            Err(e) => Err(e),
        };

        match tokenizer_result {
            Ok(()) => {
                log::info!("Model '{}' and tokenizer ready to use", info.name);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to set up model '{}': {}", info.name, e);
                let _ = self.remove_download(&info.name);
                Err(e)
            }
        }
    }

    async fn fetch_if_invalid(
        &self,
        url: &str,
        path: &Path,
        expected_hash: &str,
        file_type: &str,
    ) -> Result<(), ModelError> {
        if path.exists() {
            if self.verify_file(path, expected_hash)? {
                log::info!("Existing {} file verified", file_type);
                return Ok(());
            }
            log::warn!("{} file failed verification, redownloading", file_type);
        }
        self.download_and_verify_file(url, path, expected_hash, file_type).await
    }

    fn verify_file(&self, path: &Path, expected_hash: &str) -> Result<bool, ModelError> {
        let bytes = fs::read(path)?;
        let hash = sha256_hex(&bytes);
        log::debug!("Verifying {:?}: {} bytes, hash {}", path, bytes.len(), hash);
        Ok(hash == expected_hash)
    }

    pub fn verify_model(&self, info: &ModelInfo) -> Result<bool, ModelError> {
        let model_path = self.get_model_path(&info.name);
        let tokenizer_path = self.get_tokenizer_path(&info.name);

        if !model_path.exists() || !tokenizer_path.exists() {
            log::info!("Model '{}' is not fully downloaded", info.name);
            return Ok(false);
        }

        let model_ok = self.verify_file(&model_path, &info.model_hash)?;
        let tokenizer_ok = self.verify_file(&tokenizer_path, &info.tokenizer_hash)?;
        log::info!("Verification of '{}': model {}, tokenizer {}", info.name, model_ok, tokenizer_ok);

        Ok(model_ok && tokenizer_ok)
    }

    async fn download_and_verify_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: &str,
        file_type: &str,
    ) -> Result<(), ModelError> {
        log::info!("Downloading {} file from {} to {:?}", file_type, url, path);
        let response = reqwest::get(url).await?.error_for_status()?;
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        let hash = sha256_hex(&bytes);
        if hash != expected_hash {
            log::error!("{} hash mismatch: expected {}, got {}", file_type, expected_hash, hash);
            return Err(ModelError::HashMismatch {
                file_type: file_type.to_string(),
                expected: expected_hash.to_string(),
                actual: hash,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &bytes)?;

        if !self.verify_file(path, expected_hash)? {
            return Err(ModelError::VerificationFailed);
        }
        log::info!("{} file downloaded and verified successfully", file_type);
        Ok(())
    }

    pub fn remove_download(&self, name: &str) -> Result<(), ModelError> {
        let model_path = self.get_model_path(name);
        let tokenizer_path = self.get_tokenizer_path(name);

        if model_path.exists() {
            fs::remove_file(&model_path)?;
        }
        if tokenizer_path.exists() {
            fs::remove_file(&tokenizer_path)?;
        }
        Ok(())
    }

    /// Ensures that a model is downloaded and verified.
    /// If the model doesn't exist, it will be downloaded.
    /// If verification fails, it will be re-downloaded.
    pub async fn ensure_model_downloaded(&self, info: &ModelInfo) -> Result<(), ModelError> {
        if !self.is_model_downloaded(&info.name) {
            log::info!("Model '{}' not found, downloading...", info.name);
            self.download_model(info).await?;
        } else if !self.verify_model(info)? {
            log::info!("Model '{}' verification failed, re-downloading...", info.name);
            self.remove_download(&info.name)?;
            self.download_model(info).await?;
        }
        if !self.verify_model(info)? {
            return Err(ModelError::NotDownloaded(info.name.clone()));
        }
        Ok(())
    }
}

/// Hex SHA-256 of a file's contents
pub(crate) fn sha256_file(path: &Path) -> io::Result<String> {
    Ok(sha256_hex(&fs::read(path)?))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_info(name: &str, model: &[u8], tokenizer: &[u8]) -> ModelInfo {
        ModelInfo {
            name: name.to_string(),
            model_url: "http://127.0.0.1:9/model.onnx".to_string(),
            tokenizer_url: "http://127.0.0.1:9/tokenizer.json".to_string(),
            model_hash: sha256_hex(model),
            tokenizer_hash: sha256_hex(tokenizer),
        }
    }

    #[test]
    fn test_model_paths() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        assert!(manager.get_model_path("minilm").ends_with("minilm/model.onnx"));
        assert!(manager.get_tokenizer_path("minilm").ends_with("minilm/tokenizer.json"));
        assert!(!manager.is_model_downloaded("minilm"));
        Ok(())
    }

    #[test]
    fn test_verify_model_checks_hashes() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        let info = local_info("fake", b"onnx-bytes", b"{}");

        assert!(!manager.verify_model(&info)?);

        fs::create_dir_all(dir.path().join("fake"))?;
        fs::write(manager.get_model_path("fake"), b"onnx-bytes")?;
        fs::write(manager.get_tokenizer_path("fake"), b"{}")?;
        assert!(manager.is_model_downloaded("fake"));
        assert!(manager.verify_model(&info)?);

        fs::write(manager.get_tokenizer_path("fake"), b"tampered")?;
        assert!(!manager.verify_model(&info)?);

        manager.remove_download("fake")?;
        assert!(!manager.is_model_downloaded("fake"));
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_downloaded_skips_network_when_valid() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        let info = local_info("cached", b"weights", b"vocab");
        fs::create_dir_all(dir.path().join("cached"))?;
        fs::write(manager.get_model_path("cached"), b"weights")?;
        fs::write(manager.get_tokenizer_path("cached"), b"vocab")?;

        manager.ensure_model_downloaded(&info).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_download_cleans_up() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        let info = local_info("unreachable", b"weights", b"vocab");

        assert!(manager.download_model(&info).await.is_err());
        assert!(!manager.is_model_downloaded("unreachable"));
        Ok(())
    }
}
