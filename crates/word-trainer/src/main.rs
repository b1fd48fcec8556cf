mod config;
mod dataset;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::TrainArgs;

/// word-trainer: meta-learning for few-shot spoken-word classification.
#[derive(Parser)]
#[command(name = "word-trainer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train an algorithm variant over episodes from a dataset.
    Train {
        /// Path to the training config TOML file.
        #[arg(long, default_value = "configs/train.toml")]
        config: PathBuf,
        /// Path to the training dataset JSON file.
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Path to a held-out dataset for validation sweeps.
        #[arg(long)]
        val_dataset: Option<PathBuf>,
        /// Use a synthetic Gaussian-blob pool with this many classes
        /// instead of a dataset file.
        #[arg(long)]
        synthetic_classes: Option<usize>,
        /// Frames per synthetic example.
        #[arg(long, default_value_t = 20)]
        synthetic_frames: usize,
        /// Override the total number of training episodes.
        #[arg(long)]
        total_episodes: Option<usize>,
        /// Override the checkpoint directory.
        #[arg(long)]
        checkpoint_dir: Option<String>,
        /// Override the RNG seed.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            dataset,
            val_dataset,
            synthetic_classes,
            synthetic_frames,
            total_episodes,
            checkpoint_dir,
            seed,
        } => pipeline::run_train(TrainArgs {
            config,
            dataset,
            val_dataset,
            synthetic_classes,
            synthetic_frames,
            total_episodes,
            checkpoint_dir,
            seed,
        }),
    }
}
