// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the `train` subcommand and all its flags.
//
// Every flag is optional on top of a base configuration: the
// built-in defaults, or a JSON file given with --config (for
// example the train_config.json written by an earlier run).
// Flags given on the command line override the base.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for malformed args
//   - type conversion (string → usize, f64, enums via FromStr)
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::domain::token_pair::SortKey;
use crate::ml::{encoder::EncoderType, model::DecoderType};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a BiDeep (or Sutskever) translation model on a parallel corpus
    Train(TrainArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON config to start from; other flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Source and target training files, one sentence per line
    #[arg(long, num_args = 2, value_names = ["SRC", "TRG"])]
    pub training_data: Option<Vec<PathBuf>>,

    /// Source and target vocabulary models (built if missing)
    #[arg(long, alias = "spm-model", num_args = 2, value_names = ["SRC", "TRG"])]
    pub vocab_models: Option<Vec<PathBuf>>,

    /// Where the run config, vocabularies and metrics.csv are written
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Entries per vocabulary, special tokens included [default: 8000]
    #[arg(long)]
    pub vocab_size: Option<usize>,

    /// Embedding size [default: 512]
    #[arg(long)]
    pub emb_dim: Option<usize>,

    /// Recurrent state size [default: 1024]
    #[arg(long)]
    pub rnn_dim: Option<usize>,

    /// bidirectional, alternating or bi-unidirectional
    #[arg(long)]
    pub enc_type: Option<EncoderType>,

    /// Encoder layers [default: 1]
    #[arg(long)]
    pub enc_depth: Option<usize>,

    /// Transition depth of each encoder cell [default: 1]
    #[arg(long)]
    pub enc_cell_depth: Option<usize>,

    /// bideep or sutskever
    #[arg(long)]
    pub dec_type: Option<DecoderType>,

    /// Decoder layers [default: 1]
    #[arg(long)]
    pub dec_depth: Option<usize>,

    /// Transition depth of the conditional base cell [default: 2]
    #[arg(long)]
    pub dec_base_cell_depth: Option<usize>,

    /// Transition depth of the higher decoder cells [default: 1]
    #[arg(long)]
    pub dec_high_cell_depth: Option<usize>,

    /// Share the target embedding with the output projection
    #[arg(long)]
    pub tied_embeddings: bool,

    /// Add residual connections between stacked layers
    #[arg(long)]
    pub skip: bool,

    /// Feed source sentences in reverse order
    #[arg(long)]
    pub reverse_src: bool,

    /// Longest sentence kept, in tokens; longer ones are cropped [default: 100]
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Sentence pairs per update [default: 32]
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Minibatches read ahead and sorted together [default: 20]
    #[arg(long)]
    pub maxibatch_size: Option<usize>,

    /// Sort key inside a maxibatch: none, source or target [default: source]
    #[arg(long)]
    pub maxibatch_sort: Option<SortKey>,

    /// Passes over the training data [default: 1]
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Adam learning rate [default: 0.001]
    #[arg(long, alias = "lr")]
    pub learning_rate: Option<f64>,

    /// Log progress every N updates [default: 100]
    #[arg(long)]
    pub disp_freq: Option<usize>,

    /// Train on the NdArray CPU backend instead of WGPU
    #[arg(long)]
    pub cpu: bool,
}

/// Merge CLI args over the base config.
/// This is the boundary between Layer 1 and Layer 2:
/// the application layer never sees clap types.
impl TryFrom<TrainArgs> for TrainConfig {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        let mut cfg = match &a.config {
            Some(path) => TrainConfig::load(path)?,
            None => TrainConfig::default(),
        };

        if let Some(files) = a.training_data {
            let [src, trg]: [PathBuf; 2] = match files.try_into() {
                Ok(pair) => pair,
                Err(_) => bail!("--training-data takes exactly two files"),
            };
            cfg.source_data = src;
            cfg.target_data = trg;
        }
        if let Some(files) = a.vocab_models {
            let [src, trg]: [PathBuf; 2] = match files.try_into() {
                Ok(pair) => pair,
                Err(_) => bail!("--vocab-models takes exactly two files"),
            };
            cfg.source_vocab = src;
            cfg.target_vocab = trg;
        }

        macro_rules! override_with {
            ($($field:ident <- $arg:expr),* $(,)?) => {
                $( if let Some(v) = $arg { cfg.$field = v; } )*
            };
        }
        override_with! {
            output_dir          <- a.output_dir,
            vocab_size          <- a.vocab_size,
            emb_dim             <- a.emb_dim,
            rnn_dim             <- a.rnn_dim,
            encoder_type        <- a.enc_type,
            enc_depth           <- a.enc_depth,
            enc_cell_depth      <- a.enc_cell_depth,
            decoder_type        <- a.dec_type,
            dec_depth           <- a.dec_depth,
            dec_base_cell_depth <- a.dec_base_cell_depth,
            dec_high_cell_depth <- a.dec_high_cell_depth,
            max_length          <- a.max_length,
            batch_size          <- a.batch_size,
            maxibatch_size      <- a.maxibatch_size,
            maxibatch_sort      <- a.maxibatch_sort,
            epochs              <- a.epochs,
            learning_rate       <- a.learning_rate,
            disp_freq           <- a.disp_freq,
        }

        // Switches can only turn a feature on
        cfg.tied_embeddings |= a.tied_embeddings;
        cfg.skip |= a.skip;
        cfg.reverse_src |= a.reverse_src;
        cfg.cpu |= a.cpu;

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(args: &[&str]) -> TrainArgs {
        let argv = ["bideep-nmt", "train"].iter().chain(args).copied();
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Train(a) => a,
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = parse(&[
            "--training-data", "de.txt", "en.txt",
            "--enc-type", "alternating",
            "--dec-type", "sutskever",
            "--lr", "0.01",
            "--tied-embeddings",
            "--cpu",
        ]);
        let cfg = TrainConfig::try_from(args).unwrap();
        assert_eq!(cfg.source_data, PathBuf::from("de.txt"));
        assert_eq!(cfg.target_data, PathBuf::from("en.txt"));
        assert_eq!(cfg.encoder_type, EncoderType::Alternating);
        assert_eq!(cfg.decoder_type, DecoderType::Sutskever);
        assert_eq!(cfg.learning_rate, 0.01);
        assert!(cfg.tied_embeddings && cfg.cpu && !cfg.skip);
        assert_eq!(cfg.batch_size, TrainConfig::default().batch_size);
    }

    #[test]
    fn test_config_file_is_base_for_flags() {
        let dir = tempfile::tempdir().unwrap();
        let base = TrainConfig {
            output_dir: dir.path().to_path_buf(),
            rnn_dim:    64,
            epochs:     7,
            skip:       true,
            ..TrainConfig::default()
        };
        let path = base.save().unwrap();

        let args = parse(&["--config", path.to_str().unwrap(), "--epochs", "2"]);
        let cfg = TrainConfig::try_from(args).unwrap();
        assert_eq!(cfg.rnn_dim, 64);
        assert_eq!(cfg.epochs, 2);
        assert!(cfg.skip);
    }

    #[test]
    fn test_spm_model_alias_and_bad_values() {
        let args = parse(&["--spm-model", "a.json", "b.json"]);
        let cfg = TrainConfig::try_from(args).unwrap();
        assert_eq!(cfg.target_vocab, PathBuf::from("b.json"));

        let argv = ["bideep-nmt", "train", "--enc-type", "sideways"];
        assert!(Cli::try_parse_from(argv).is_err());
        let argv = ["bideep-nmt", "train", "--training-data", "only-one.txt"];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
