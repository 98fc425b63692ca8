use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use nlu_service::config::{
    DEFAULT_ARTIFACT_PATH, DEFAULT_BIND_ADDR, DEFAULT_DATASET_PATH, DEFAULT_READ_TIMEOUT, DEFAULT_SEED, DEFAULT_TEST_SIZE,
};
use nlu_service::service::http;
use nlu_service::{
    BuiltinModel, EmbedderConfig, EmbedderKind, IntentService, LogisticRegressionConfig, ModelManager,
    RuntimeConfig, ServiceConfig, TextEmbedding, Trainer, TrainingConfig,
};

#[derive(Parser)]
#[command(name = "nlu", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a classifier from a labelled CSV and write the artifact
    Train(TrainArgs),
    /// Serve POST /classify-intent from a trained artifact
    Serve(ServeArgs),
    /// Classify a single text with a trained artifact
    Classify(ClassifyArgs),
    /// Download and verify the built-in embedding model
    Download {
        /// Force a fresh download of the model files
        #[arg(short, long)]
        fresh: bool,
    },
}

#[derive(Args)]
struct EmbedderArgs {
    /// Embedding backend
    #[arg(long, value_enum, env = "NLU_EMBEDDER", default_value_t = EmbedderKind::Onnx)]
    embedder: EmbedderKind,
    /// Custom ONNX sentence-embedding model
    #[arg(long, env = "NLU_ONNX_MODEL", requires = "tokenizer")]
    onnx_model: Option<PathBuf>,
    /// tokenizer.json matching --onnx-model
    #[arg(long, env = "NLU_TOKENIZER", requires = "onnx_model")]
    tokenizer: Option<PathBuf>,
    /// Longer inputs are truncated to this many tokens
    #[arg(long)]
    max_seq_len: Option<usize>,
    /// Dimension of the hashing embedder
    #[arg(long, default_value_t = 384)]
    hashing_dim: usize,
    /// ONNX Runtime intra-op threads (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    threads: usize,
    /// Force a fresh download of the built-in model
    #[arg(long)]
    fresh: bool,
}

impl EmbedderArgs {
    fn to_config(&self) -> EmbedderConfig {
        EmbedderConfig {
            kind: self.embedder,
            onnx_model: self.onnx_model.clone(),
            tokenizer: self.tokenizer.clone(),
            max_sequence_length: self.max_seq_len,
            hashing_dim: self.hashing_dim,
            fresh: self.fresh,
            runtime: RuntimeConfig { intra_threads: self.threads, ..Default::default() },
        }
    }

    async fn build(&self) -> anyhow::Result<Arc<dyn TextEmbedding>> {
        self.to_config().build().await.context("Failed to load the embedding model")
    }
}

#[derive(Args)]
struct TrainArgs {
    #[arg(long, env = "NLU_DATASET", default_value = DEFAULT_DATASET_PATH)]
    dataset: PathBuf,
    #[arg(long, env = "NLU_ARTIFACT", default_value = DEFAULT_ARTIFACT_PATH)]
    artifact: PathBuf,
    /// Fraction of each label held out for evaluation
    #[arg(long, default_value_t = DEFAULT_TEST_SIZE)]
    test_size: f32,
    #[arg(long, env = "NLU_SEED", default_value_t = DEFAULT_SEED)]
    seed: u64,
    #[arg(long, default_value_t = LogisticRegressionConfig::default().max_iter)]
    max_iter: usize,
    /// Inverse L2 regularisation strength
    #[arg(long, default_value_t = LogisticRegressionConfig::default().c)]
    c: f32,
    #[arg(long, default_value_t = LogisticRegressionConfig::default().learning_rate)]
    learning_rate: f32,
    #[command(flatten)]
    embedder: EmbedderArgs,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "NLU_ARTIFACT", default_value = DEFAULT_ARTIFACT_PATH)]
    artifact: PathBuf,
    #[arg(long, env = "NLU_BIND", default_value = DEFAULT_BIND_ADDR)]
    bind: String,
    /// Seconds a client gets to send a complete request
    #[arg(long, env = "NLU_READ_TIMEOUT", default_value_t = DEFAULT_READ_TIMEOUT.as_secs())]
    read_timeout: u64,
    #[command(flatten)]
    embedder: EmbedderArgs,
}

#[derive(Args)]
struct ClassifyArgs {
    #[arg(long, env = "NLU_ARTIFACT", default_value = DEFAULT_ARTIFACT_PATH)]
    artifact: PathBuf,
    /// Also print every label's probability
    #[arg(long)]
    scores: bool,
    #[command(flatten)]
    embedder: EmbedderArgs,
    text: String,
}

async fn train(args: TrainArgs) -> anyhow::Result<()> {
    let embedder = args.embedder.build().await?;
    let config = TrainingConfig {
        dataset_path: args.dataset,
        artifact_path: args.artifact,
        test_size: args.test_size,
        seed: args.seed,
        model: LogisticRegressionConfig {
            c: args.c,
            max_iter: args.max_iter,
            learning_rate: args.learning_rate,
            ..Default::default()
        },
    };

    let start = Instant::now();
    let trainer = Trainer::new(embedder.as_ref(), config);
    let outcome = trainer.run().context("Training failed")?;
    println!("{}", outcome.report);
    info!(
        "Saved classifier over {} labels to {} (took {:.2?})",
        outcome.classifier.labels().len(),
        trainer.config().artifact_path.display(),
        start.elapsed()
    );
    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let embedder = args.embedder.build().await?;
    let config = ServiceConfig {
        artifact_path: args.artifact,
        bind_addr: args.bind,
        read_timeout: Duration::from_secs(args.read_timeout),
        ..Default::default()
    };
    let service = IntentService::load(embedder, &config.artifact_path)
        .with_context(|| format!("Failed to load classifier from {}", config.artifact_path.display()))?;
    http::run(&config, service, shutdown_signal())
        .await
        .with_context(|| format!("Failed to serve on {}", config.bind_addr))
}

async fn classify(args: ClassifyArgs) -> anyhow::Result<()> {
    let embedder = args.embedder.build().await?;
    let service = IntentService::load(embedder, &args.artifact)
        .with_context(|| format!("Failed to load classifier from {}", args.artifact.display()))?;

    if args.scores {
        for (label, score) in service.classify_with_scores(&args.text)? {
            println!("{}: {:.1}%", label, score * 100.0);
        }
    } else {
        println!("{}", service.classify(&args.text)?);
    }
    Ok(())
}

async fn download(fresh: bool) -> anyhow::Result<()> {
    let manager = ModelManager::new_default()?;
    let info = BuiltinModel::MiniLM.get_model_info();

    if fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(&info.name)?;
    }
    manager.ensure_model_downloaded(&info).await?;
    println!("{}", manager.get_model_path(&info.name).display());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nlu_service::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Command::Train(args) => train(args).await,
        Command::Serve(args) => serve(args).await,
        Command::Classify(args) => classify(args).await,
        Command::Download { fresh } => download(fresh).await,
    }
}
