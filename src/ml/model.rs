// ============================================================
// Layer 5 — Encoder-Decoder Model
// ============================================================
// Ties a BiDeepEncoder to one of two decoders. The decoder is
// picked once, at construction, from ModelConfig::decoder_type
// and stored as a DecoderKind; each forward pass matches on it
// once and runs that decoder's whole target loop.
//
//   TranslationBatch ─► encoder(source) ─► decoder(states, target)
//                                               │
//                                   logits [trg_len, batch, vocab]
//                                               │
//                         cross-entropy against target ids, pad ignored
//
// Reference: Burn Book §3 (Building Blocks)

use std::{fmt, str::FromStr};

use burn::{nn::loss::CrossEntropyLossConfig, prelude::*};
use serde::{Deserialize, Serialize};

use crate::data::batcher::TranslationBatch;
use crate::domain::{
    error::{NmtError, Result},
    token_pair::{EOS_ID, PAD_ID},
};
use crate::ml::{
    decoder::{BiDeepDecoder, BiDeepDecoderConfig, Decoder},
    encoder::{BiDeepEncoder, EncoderConfig, EncoderType},
    masked::MaskedData,
    sutskever::{SutskeverDecoder, SutskeverDecoderConfig},
};

// ─── DecoderType ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecoderType {
    #[default]
    BiDeep,
    Sutskever,
}

impl FromStr for DecoderType {
    type Err = NmtError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "bideep" | "bi-deep" => Ok(Self::BiDeep),
            "sutskever"          => Ok(Self::Sutskever),
            other => Err(NmtError::config(format!(
                "unknown decoder type '{other}' (expected bideep or sutskever)"
            ))),
        }
    }
}

impl fmt::Display for DecoderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BiDeep    => f.write_str("bideep"),
            Self::Sutskever => f.write_str("sutskever"),
        }
    }
}

// ─── ModelConfig ──────────────────────────────────────────────────────────────
// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ModelConfig {
    pub src_vocab_size: usize,
    pub trg_vocab_size: usize,
    #[config(default = 512)]
    pub emb_dim: usize,
    #[config(default = 1024)]
    pub rnn_dim: usize,
    #[config(default = "EncoderType::Bidirectional")]
    pub encoder_type: EncoderType,
    #[config(default = 1)]
    pub enc_depth: usize,
    #[config(default = 1)]
    pub enc_cell_depth: usize,
    #[config(default = "DecoderType::BiDeep")]
    pub decoder_type: DecoderType,
    #[config(default = 1)]
    pub dec_depth: usize,
    #[config(default = 2)]
    pub dec_base_cell_depth: usize,
    #[config(default = 1)]
    pub dec_high_cell_depth: usize,
    #[config(default = false)]
    pub tied_embeddings: bool,
    #[config(default = false)]
    pub skip: bool,
}

impl ModelConfig {
    /// Report the first invalid hyper-parameter combination, if any.
    pub fn validate(&self) -> Result<()> {
        let min_vocab = EOS_ID as usize + 1;
        for (name, size) in [("source", self.src_vocab_size), ("target", self.trg_vocab_size)] {
            if size < min_vocab {
                return Err(NmtError::config(format!(
                    "{name} vocabulary has {size} entries; at least {min_vocab} are reserved"
                )));
            }
        }
        let dims = [
            ("emb_dim", self.emb_dim),
            ("rnn_dim", self.rnn_dim),
            ("enc_depth", self.enc_depth),
            ("enc_cell_depth", self.enc_cell_depth),
            ("dec_depth", self.dec_depth),
            ("dec_base_cell_depth", self.dec_base_cell_depth),
            ("dec_high_cell_depth", self.dec_high_cell_depth),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(NmtError::config(format!("{name} must be at least 1")));
        }
        if self.decoder_type == DecoderType::Sutskever && self.emb_dim != self.rnn_dim {
            return Err(NmtError::config(format!(
                "the sutskever decoder needs emb_dim == rnn_dim (got {} and {})",
                self.emb_dim, self.rnn_dim
            )));
        }
        Ok(())
    }

    /// Validate, then build the model on `device`.
    pub fn try_init<B: Backend>(&self, device: &B::Device) -> Result<EncoderDecoder<B>> {
        self.validate()?;
        Ok(self.init(device))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> EncoderDecoder<B> {
        let encoder = EncoderConfig::new(self.src_vocab_size, self.emb_dim, self.rnn_dim)
            .with_depth(self.enc_depth)
            .with_cell_depth(self.enc_cell_depth)
            .with_encoder_type(self.encoder_type)
            .with_skip(self.skip)
            .init(device);

        let decoder = match self.decoder_type {
            DecoderType::BiDeep => DecoderKind::BiDeep(
                BiDeepDecoderConfig::new(self.trg_vocab_size, self.emb_dim, self.rnn_dim)
                    .with_depth(self.dec_depth)
                    .with_base_cell_depth(self.dec_base_cell_depth)
                    .with_high_cell_depth(self.dec_high_cell_depth)
                    .with_skip(self.skip)
                    .with_tied_embeddings(self.tied_embeddings)
                    .init(device),
            ),
            DecoderType::Sutskever => DecoderKind::Sutskever(
                SutskeverDecoderConfig::new(self.trg_vocab_size, self.emb_dim, self.rnn_dim)
                    .with_depth(self.dec_depth)
                    .with_tied_embeddings(self.tied_embeddings)
                    .init(device),
            ),
        };

        EncoderDecoder { encoder, decoder }
    }
}

// ─── DecoderKind ──────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub enum DecoderKind<B: Backend> {
    BiDeep(BiDeepDecoder<B>),
    Sutskever(SutskeverDecoder<B>),
}

impl<B: Backend> DecoderKind<B> {
    /// Teacher-forced logits from whichever decoder was built.
    pub fn forward(
        &self,
        encoder_states: Tensor<B, 3>,
        source:         &MaskedData<B>,
        target:         &MaskedData<B>,
    ) -> Result<Tensor<B, 3>> {
        match self {
            Self::BiDeep(d)    => d.forward(encoder_states, source, target),
            Self::Sutskever(d) => d.forward(encoder_states, source, target),
        }
    }
}

// ─── EncoderDecoder ───────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EncoderDecoder<B: Backend> {
    pub encoder: BiDeepEncoder<B>,
    pub decoder: DecoderKind<B>,
}

impl<B: Backend> EncoderDecoder<B> {
    /// Teacher-forced logits, [trg_len, batch, trg_vocab].
    pub fn forward(&self, batch: &TranslationBatch<B>) -> Result<Tensor<B, 3>> {
        let encoder_states = self.encoder.forward(&batch.source)?;
        self.decoder.forward(encoder_states, &batch.source, &batch.target)
    }

    /// Mean cross-entropy over the real target tokens of the batch.
    pub fn forward_loss(&self, batch: &TranslationBatch<B>) -> Result<Tensor<B, 1>> {
        let logits = self.forward(batch)?;
        let [trg_len, size, vocab] = logits.dims();
        let positions = trg_len * size;

        let ce = CrossEntropyLossConfig::new()
            .with_pad_tokens(Some(vec![PAD_ID as usize]))
            .init(&logits.device());
        let targets = batch.target.data.clone().reshape([positions]);
        let loss = ce.forward(logits.reshape([positions, vocab]), targets);

        // Padded positions contribute zero but are still counted by the
        // mean; rescale so the average runs over real tokens only.
        let real_tokens: usize = batch.target.host_lengths.iter().sum();
        if real_tokens == 0 {
            return Err(NmtError::shape("target batch holds no tokens"));
        }
        Ok(loss * (positions as f64 / real_tokens as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::PadAndStack;
    use crate::domain::token_pair::TokenPair;
    use burn::{
        backend::{Autodiff, NdArray},
        tensor::ElementConversion,
    };

    type B = NdArray;
    type AB = Autodiff<NdArray>;

    fn small_config() -> ModelConfig {
        ModelConfig::new(20, 24).with_emb_dim(6).with_rnn_dim(6)
    }

    fn pairs() -> Vec<TokenPair> {
        vec![
            TokenPair::new(vec![4, 5, 6, EOS_ID], vec![7, 8, EOS_ID]),
            TokenPair::new(vec![9, EOS_ID], vec![10, 11, 12, 13, EOS_ID]),
        ]
    }

    #[test]
    fn test_validate_rejects_bad_combinations() {
        assert!(small_config().validate().is_ok());
        assert!(small_config().with_rnn_dim(0).validate().is_err());
        assert!(ModelConfig::new(2, 24).validate().is_err());
        let sutskever = small_config().with_decoder_type(DecoderType::Sutskever);
        assert!(sutskever.clone().validate().is_ok());
        assert!(matches!(
            sutskever.with_emb_dim(4).validate(),
            Err(NmtError::Config(_))
        ));
    }

    #[test]
    fn test_decoder_type_parses() {
        assert_eq!("BiDeep".parse::<DecoderType>().unwrap(), DecoderType::BiDeep);
        assert_eq!("sutskever".parse::<DecoderType>().unwrap(), DecoderType::Sutskever);
        assert!("transformer".parse::<DecoderType>().is_err());
    }

    #[test]
    fn test_both_decoders_produce_target_shaped_logits() {
        let device = Default::default();
        let batch = PadAndStack::<B>::new(device).batch(pairs());
        for decoder_type in [DecoderType::BiDeep, DecoderType::Sutskever] {
            let model = small_config()
                .with_decoder_type(decoder_type)
                .with_enc_depth(2)
                .with_dec_depth(2)
                .try_init::<B>(&device)
                .unwrap();
            let logits = model.forward(&batch).unwrap();
            assert_eq!(logits.dims(), [5, 2, 24], "{decoder_type}");

            let loss: f64 = model.forward_loss(&batch).unwrap().into_scalar().elem();
            assert!(loss.is_finite() && loss > 0.0);
        }
    }

    #[test]
    fn test_forward_dispatches_to_the_configured_decoder() {
        let device = Default::default();
        let batch = PadAndStack::<B>::new(device).batch(pairs());
        let model = small_config()
            .with_decoder_type(DecoderType::Sutskever)
            .init::<B>(&device);
        let DecoderKind::Sutskever(decoder) = &model.decoder else {
            panic!("expected the sutskever decoder");
        };

        let states = model.encoder.forward(&batch.source).unwrap();
        let direct: Vec<f32> = decoder
            .forward(states, &batch.source, &batch.target)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();
        let through_model: Vec<f32> = model.forward(&batch).unwrap().into_data().to_vec().unwrap();
        assert_eq!(direct, through_model);
    }

    #[test]
    fn test_tied_embedding_receives_projection_gradient() {
        let device = Default::default();
        let model = small_config().with_tied_embeddings(true).init::<AB>(&device);
        let DecoderKind::BiDeep(decoder) = &model.decoder else { unreachable!() };
        assert!(decoder.output.projection.is_tied());

        // Only token 3 is never fed as input, so its embedding row can only be
        // reached through the tied output projection.
        let batch = PadAndStack::<AB>::new(device).batch(pairs());
        let grads = model.forward_loss(&batch).unwrap().backward();
        let grad = decoder.embedding.weight.val().grad(&grads).unwrap();
        let row: Vec<f32> = grad.narrow(0, 3, 1).into_data().to_vec().unwrap();
        assert!(row.iter().any(|&g| g != 0.0));
    }
}
