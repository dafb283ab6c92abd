// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// One command is supported:
//   `train` — builds vocabularies if needed and trains the
//             model on a source/target corpus pair
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, TrainArgs};

use crate::application::train_use_case::{TrainConfig, TrainUseCase};

#[derive(Parser, Debug)]
#[command(
    name = "bideep-nmt",
    version = "0.1.0",
    about = "Train a BiDeep deep-transition RNN translation model on parallel text."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = TrainConfig::try_from(args)?;
    tracing::info!(
        "Starting training on '{}' -> '{}'",
        config.source_data.display(),
        config.target_data.display()
    );

    let output_dir = config.output_dir.clone();
    let progress = TrainUseCase::new(config).execute()?;

    println!(
        "Training complete: {} updates over {} sentences. Outputs in '{}'.",
        progress.updates,
        progress.sentences,
        output_dir.display()
    );
    Ok(())
}
