// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration         (Layer 2)
//   Step 2: Load or build both vocabularies    (Layer 6 - infra)
//   Step 3: Open the parallel corpus           (Layer 4 - data)
//   Step 4: Validate the model configuration   (Layer 5 - ml)
//   Step 5: Save the effective config          (Layer 2)
//   Step 6: Run the training loop              (Layer 5 - ml)
//
// Every failure up to step 5 happens before a single tensor is
// allocated, so a bad flag or a misaligned corpus is reported
// immediately instead of after model construction.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::dataset::{DatasetOptions, TranslationDataset};
use crate::domain::{error::NmtError, token_pair::SortKey};
use crate::infra::{metrics::MetricsLogger, tokenizer_store::TokenizerStore};
use crate::ml::{
    encoder::EncoderType,
    model::{DecoderType, ModelConfig},
    trainer::{run_training, TrainingProgress},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All options of a training run: corpus and vocabulary paths, model
// hyper-parameters and optimisation settings.
// Serialisable so the effective configuration of every run can be
// written next to its metrics, and reloaded with --config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub source_data:  PathBuf,
    pub target_data:  PathBuf,
    pub source_vocab: PathBuf,
    pub target_vocab: PathBuf,
    pub output_dir:   PathBuf,

    // ── model ──
    pub vocab_size:          usize,
    pub emb_dim:             usize,
    pub rnn_dim:             usize,
    pub encoder_type:        EncoderType,
    pub enc_depth:           usize,
    pub enc_cell_depth:      usize,
    pub decoder_type:        DecoderType,
    pub dec_depth:           usize,
    pub dec_base_cell_depth: usize,
    pub dec_high_cell_depth: usize,
    pub tied_embeddings:     bool,
    pub skip:                bool,

    // ── data ──
    pub reverse_src:    bool,
    pub max_length:     usize,
    pub batch_size:     usize,
    pub maxibatch_size: usize,
    pub maxibatch_sort: SortKey,

    // ── optimisation ──
    pub epochs:        usize,
    pub learning_rate: f64,
    pub disp_freq:     usize,
    pub cpu:           bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            source_data:  PathBuf::new(),
            target_data:  PathBuf::new(),
            source_vocab: PathBuf::new(),
            target_vocab: PathBuf::new(),
            output_dir:   PathBuf::from("runs"),

            vocab_size:          8000,
            emb_dim:             512,
            rnn_dim:             1024,
            encoder_type:        EncoderType::Bidirectional,
            enc_depth:           1,
            enc_cell_depth:      1,
            decoder_type:        DecoderType::BiDeep,
            dec_depth:           1,
            dec_base_cell_depth: 2,
            dec_high_cell_depth: 1,
            tied_embeddings:     false,
            skip:                false,

            reverse_src:    false,
            max_length:     100,
            batch_size:     32,
            maxibatch_size: 20,
            maxibatch_sort: SortKey::Source,

            epochs:        1,
            learning_rate: 1e-3,
            disp_freq:     100,
            cpu:           false,
        }
    }
}

impl TrainConfig {
    /// Read a config previously written by `save` (or by hand).
    /// Missing fields take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Cannot parse config '{}'", path.display()))
    }

    /// Write this config as `<output_dir>/train_config.json`.
    pub fn save(&self) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Cannot create '{}'", self.output_dir.display()))?;
        let path = self.output_dir.join("train_config.json");
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        Ok(path)
    }

    /// Options that must hold before anything is read from disk.
    pub fn validate(&self) -> std::result::Result<(), NmtError> {
        let positive = [
            ("batch_size", self.batch_size),
            ("maxibatch_size", self.maxibatch_size),
            ("max_length", self.max_length),
            ("disp_freq", self.disp_freq),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(NmtError::config(format!("{name} must be at least 1")));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(NmtError::config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, path) in [("source", &self.source_data), ("target", &self.target_data)] {
            if path.as_os_str().is_empty() {
                return Err(NmtError::config(format!("no {name} training data given")));
            }
        }
        Ok(())
    }

    /// Model hyper-parameters, with vocabulary sizes taken from the
    /// loaded vocabularies.
    pub fn model_config(&self, src_vocab_size: usize, trg_vocab_size: usize) -> ModelConfig {
        ModelConfig::new(src_vocab_size, trg_vocab_size)
            .with_emb_dim(self.emb_dim)
            .with_rnn_dim(self.rnn_dim)
            .with_encoder_type(self.encoder_type)
            .with_enc_depth(self.enc_depth)
            .with_enc_cell_depth(self.enc_cell_depth)
            .with_decoder_type(self.decoder_type)
            .with_dec_depth(self.dec_depth)
            .with_dec_base_cell_depth(self.dec_base_cell_depth)
            .with_dec_high_cell_depth(self.dec_high_cell_depth)
            .with_tied_embeddings(self.tied_embeddings)
            .with_skip(self.skip)
    }

    /// Vocabulary model paths; unset ones default to
    /// `<output_dir>/vocab.src.json` and `<output_dir>/vocab.trg.json`.
    pub fn vocab_paths(&self) -> (PathBuf, PathBuf) {
        let or_default = |path: &PathBuf, name: &str| {
            if path.as_os_str().is_empty() {
                self.output_dir.join(name)
            } else {
                path.clone()
            }
        };
        (
            or_default(&self.source_vocab, "vocab.src.json"),
            or_default(&self.target_vocab, "vocab.trg.json"),
        )
    }

    pub fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            maxibatch_size: self.maxibatch_size,
            sort:           self.maxibatch_sort,
            max_length:     self.max_length,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainingProgress> {
        let cfg = &self.config;

        // ── Step 1: Reject impossible options up front ───────────────────────
        cfg.validate()?;

        // ── Step 2: Vocabularies ─────────────────────────────────────────────
        // Each side has its own model file, built from that side's corpus
        // the first time it is needed.
        let (source_vocab_path, target_vocab_path) = cfg.vocab_paths();
        let source_vocab = TokenizerStore::new(&source_vocab_path)
            .train_or_load(&cfg.source_data, cfg.vocab_size)
            .context("Source vocabulary unavailable")?
            .with_reverse(cfg.reverse_src);
        let target_vocab = TokenizerStore::new(&target_vocab_path)
            .train_or_load(&cfg.target_data, cfg.vocab_size)
            .context("Target vocabulary unavailable")?;

        // ── Step 3: Parallel corpus ──────────────────────────────────────────
        let dataset = TranslationDataset::open(
            &cfg.source_data,
            &cfg.target_data,
            source_vocab,
            target_vocab,
            cfg.dataset_options(),
        )
        .with_context(|| {
            format!(
                "Cannot open training data '{}' / '{}'",
                cfg.source_data.display(),
                cfg.target_data.display()
            )
        })?;
        tracing::info!("Training corpus: {} sentence pairs", dataset.sentence_count());

        // ── Step 4: Model configuration ──────────────────────────────────────
        let model_cfg = cfg.model_config(dataset.source_vocab_size(), dataset.target_vocab_size());
        model_cfg.validate()?;
        tracing::info!(
            "Vocabularies: source={} target={}",
            model_cfg.src_vocab_size,
            model_cfg.trg_vocab_size
        );

        // ── Step 5: Record the effective configuration ───────────────────────
        let saved = cfg.save()?;
        tracing::info!("Configuration written to '{}'", saved.display());
        let metrics = MetricsLogger::new(&cfg.output_dir)?;

        // ── Step 6: Run training loop (Layer 5) ──────────────────────────────
        let progress = run_training(cfg, &model_cfg, dataset, Some(&metrics))?;
        Ok(progress)
    }
}
