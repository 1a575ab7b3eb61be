//! MNIST training run
//!
//! Trains or resumes an MNIST classifier, evaluates it, and stores the
//! checkpoint and metrics in S3 under the current git revision.

#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::Result;
use artifact_store::ArtifactGateway;
use clap::Parser;
use config::{Config, build_object_store};
use mnist_model::{ModelConfig, TrainingConfig};
use mnist_run::{BurnFramework, TrainBackend, init_device};
use revision::RevisionResolver;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// MNIST training run with checkpoints persisted per git revision
#[derive(Parser)]
#[command(name = "mnist-run")]
#[command(about = "Train, resume or reuse an MNIST model and upload its artifacts")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory for the local checkpoint and metrics files
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,

    /// Number of training epochs
    #[arg(short, long, default_value = "5")]
    epochs: usize,

    /// Batch size for training and evaluation
    #[arg(short, long, default_value = "64")]
    batch_size: usize,

    /// Learning rate
    #[arg(short, long, default_value = "0.001")]
    learning_rate: f64,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    let run_id = RevisionResolver::new(std::env::current_dir()?)
        .with_override(config.commit_id.clone())
        .resolve();

    let gateway = ArtifactGateway::new(build_object_store(&config)?);

    let training_config = TrainingConfig::new(ModelConfig::new())
        .with_epochs(cli.epochs)
        .with_batch_size(cli.batch_size)
        .with_learning_rate(cli.learning_rate)
        .with_seed(cli.seed);

    let mut framework = BurnFramework::<TrainBackend>::new(training_config, init_device());

    let report = mnist_run::run(&mut framework, &gateway, &run_id, &cli.checkpoint_dir).await?;

    for (name, value) in report.metrics.iter() {
        info!(metric = name, value, "Test metric");
    }

    Ok(())
}
