// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Minibatch training with Adam, one epoch at a time.
//
//   for epoch in 1..=epochs:
//     EpochPrefetcher(dataset) ─► Vec<TokenPair>
//       ─► PadAndStack ─► forward_loss ─► backward ─► Adam step
//     every disp_freq updates: log progress + metrics row
//     finish() ─► dataset.reset()
//
// Key Burn 0.20 insight:
//   - Training needs an AutodiffBackend for loss.backward()
//   - --cpu picks Autodiff<NdArray>, otherwise Autodiff<Wgpu>
//   - the generic train() is shared by both backends
//
// A non-finite loss stops the run instead of feeding NaN
// gradients into the optimiser.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::time::Instant;

use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::PadAndStack, dataset::TranslationDataset, prefetch::EpochPrefetcher};
use crate::domain::{
    error::{NmtError, Result},
    traits::SentenceEncoder,
};
use crate::infra::metrics::{MetricsLogger, ProgressMetrics};
use crate::ml::model::{EncoderDecoder, ModelConfig};

pub type CpuBackend = burn::backend::Autodiff<burn::backend::NdArray>;
pub type GpuBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

// ─── TrainingProgress ─────────────────────────────────────────────────────────
/// Counters carried across epochs.
#[derive(Debug, Clone)]
pub struct TrainingProgress {
    pub updates:          usize,
    pub sentences:        usize,
    pub last_loss:        f64,
    sentences_since_last: usize,
    last_display:         Instant,
}

impl TrainingProgress {
    fn new() -> Self {
        Self {
            updates:              0,
            sentences:            0,
            last_loss:            f64::NAN,
            sentences_since_last: 0,
            last_display:         Instant::now(),
        }
    }

    fn record(&mut self, sentences: usize, loss: f64) {
        self.updates += 1;
        self.sentences += sentences;
        self.sentences_since_last += sentences;
        self.last_loss = loss;
    }

    /// Snapshot for display; restarts the throughput window.
    fn take_metrics(&mut self, epoch: usize) -> ProgressMetrics {
        let elapsed = self.last_display.elapsed().as_secs_f64();
        let sentences_per_sec = if elapsed > 0.0 {
            self.sentences_since_last as f64 / elapsed
        } else {
            0.0
        };
        self.sentences_since_last = 0;
        self.last_display = Instant::now();

        ProgressMetrics {
            epoch,
            updates: self.updates,
            sentences: self.sentences,
            sentences_per_sec,
            loss: self.last_loss,
        }
    }
}

/// Pick the backend from `cfg.cpu` and train.
pub fn run_training<E: SentenceEncoder + 'static>(
    cfg:       &TrainConfig,
    model_cfg: &ModelConfig,
    dataset:   TranslationDataset<E>,
    metrics:   Option<&MetricsLogger>,
) -> Result<TrainingProgress> {
    if cfg.cpu {
        let device = burn::backend::ndarray::NdArrayDevice::default();
        tracing::info!("Using NdArray CPU device: {:?}", device);
        train::<CpuBackend, E>(cfg, model_cfg, dataset, metrics, device)
    } else {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        train::<GpuBackend, E>(cfg, model_cfg, dataset, metrics, device)
    }
}

pub fn train<B: AutodiffBackend, E: SentenceEncoder + 'static>(
    cfg:         &TrainConfig,
    model_cfg:   &ModelConfig,
    mut dataset: TranslationDataset<E>,
    metrics:     Option<&MetricsLogger>,
    device:      B::Device,
) -> Result<TrainingProgress> {
    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: EncoderDecoder<B> = model_cfg.try_init(&device)?;
    tracing::info!(
        "Model ready: encoder={} decoder={} emb_dim={} rnn_dim={} params={}",
        model_cfg.encoder_type,
        model_cfg.decoder_type,
        model_cfg.emb_dim,
        model_cfg.rnn_dim,
        model.num_params()
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, EncoderDecoder<B>>();

    let batcher = PadAndStack::<B>::new(device.clone());
    let mut progress = TrainingProgress::new();

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        tracing::info!("Starting epoch {}/{}", epoch, cfg.epochs);
        let mut prefetcher = EpochPrefetcher::spawn(dataset, cfg.batch_size);

        for pairs in prefetcher.by_ref() {
            let batch = batcher.batch(pairs?).to_device(&device);
            let size = batch.size();

            let loss = model.forward_loss(&batch)?;
            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            if !loss_val.is_finite() {
                return Err(NmtError::NonFiniteLoss { update: progress.updates + 1, loss: loss_val });
            }

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.learning_rate, model, grads);
            progress.record(size, loss_val);

            if progress.updates % cfg.disp_freq == 0 {
                let m = progress.take_metrics(epoch);
                tracing::info!(
                    "Epoch: {} ||| Updates: {} ||| Sentences: {} ||| Sentences/second: {:.2} ||| Loss: {:.5}",
                    m.epoch,
                    m.updates,
                    m.sentences,
                    m.sentences_per_sec,
                    m.loss
                );
                if let Some(logger) = metrics {
                    logger.log(&m)?;
                }
            }
        }

        dataset = prefetcher.finish()?;
        dataset.reset()?;
    }

    tracing::info!(
        "Training complete: {} updates, {} sentences",
        progress.updates,
        progress.sentences
    );
    Ok(progress)
}
