//! Intent classification on top of sentence embeddings.
//!
//! Two halves share this library:
//!
//! - **Training** reads a labelled CSV, embeds every text, holds out a stratified test
//!   set, fits a multinomial logistic regression and writes a JSON artifact.
//! - **Serving** loads that artifact together with the same embedder and answers
//!   `POST /classify-intent` requests.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use nlu_service::{Dataset, HashingEmbedder, IntentService, Trainer, TrainingConfig, TrainingExample};
//! use std::sync::Arc;
//!
//! let dataset = Dataset::new(vec![
//!     TrainingExample::new("book me a flight", "book_flight"),
//!     TrainingExample::new("I need a plane ticket", "book_flight"),
//!     TrainingExample::new("cancel my flight", "cancel_flight"),
//!     TrainingExample::new("please cancel the booking", "cancel_flight"),
//! ])?;
//!
//! let embedder = Arc::new(HashingEmbedder::new(256));
//! let outcome = Trainer::new(embedder.as_ref(), TrainingConfig::default()).train(&dataset)?;
//! println!("{}", outcome.report);
//!
//! let service = IntentService::new(embedder, Arc::new(outcome.classifier))?;
//! let label = service.classify("book a flight to Paris")?;
//! assert!(service.labels().contains(&label));
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! [`IntentService`] is immutable once built and cheap to clone; every clone shares the
//! same embedder and classifier, so it can be handed to any number of request tasks.

pub mod classifier;
pub mod config;
pub mod model_manager;
pub mod models;
mod runtime;
pub mod service;
pub mod training;

pub use classifier::{
    ClassifierError, ClassifierInfo, HashingEmbedder, IntentClassifier, LogisticRegression,
    LogisticRegressionConfig, OnnxEmbedder, TextEmbedding, TrainingMetadata, FORMAT_VERSION,
};
pub use config::{EmbedderConfig, EmbedderKind, ServiceConfig, TrainingConfig};
pub use model_manager::{ModelError, ModelManager};
pub use models::{BuiltinModel, ModelCharacteristics, ModelInfo};
pub use runtime::{create_session_builder, OptimizationLevel, RuntimeConfig};
pub use service::http::{ErrorResponse, IntentRequest, IntentResponse};
pub use service::IntentService;
pub use training::{ClassificationReport, Dataset, Trainer, TrainingExample, TrainingOutcome};

/// Installs `env_logger`, filtering at `info` unless `RUST_LOG` says otherwise.
/// Calling it again is a no-op.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
