// ============================================================
// Layer 5 — BiDeep Encoder
// ============================================================
// Embeds the source batch and runs two stacks over it, one
// reading left → right and one right → left. Their outputs
// are concatenated per position:
//
//   embedded [S, N, emb] ──► forward stack  ──┐
//                       └──► backward stack ──┴─► cat ─► [S, N, 2·rnn]
//
// Encoder types:
//   bidirectional      both stacks have `depth` layers, fixed directions
//   alternating        both stacks have `depth` layers; the forward
//                      stack alternates starting forward, the backward
//                      one alternates starting backward
//   bi-unidirectional  one bidirectional layer, then depth − 1
//                      forward layers of width 2·rnn on top
//
// Reference: Barone et al. (2017) Deep Architectures for NMT

use std::{fmt, str::FromStr};

use burn::{
    nn::{Embedding, EmbeddingConfig},
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::domain::error::{NmtError, Result};
use crate::ml::{
    masked::MaskedData,
    stack::{Direction, StackedRnn, StackedRnnConfig},
};

// ─── EncoderType ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncoderType {
    #[default]
    Bidirectional,
    Alternating,
    #[serde(alias = "bi_unidirectional")]
    BiUnidirectional,
}

impl FromStr for EncoderType {
    type Err = NmtError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "bidirectional"     => Ok(Self::Bidirectional),
            "alternating"       => Ok(Self::Alternating),
            "bi-unidirectional" => Ok(Self::BiUnidirectional),
            other => Err(NmtError::config(format!(
                "unknown encoder type '{other}' (expected bidirectional, alternating or bi-unidirectional)"
            ))),
        }
    }
}

impl fmt::Display for EncoderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bidirectional    => "bidirectional",
            Self::Alternating      => "alternating",
            Self::BiUnidirectional => "bi-unidirectional",
        };
        f.write_str(name)
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct EncoderConfig {
    pub vocab_size: usize,
    pub emb_dim:    usize,
    pub rnn_dim:    usize,
    #[config(default = 1)]
    pub depth: usize,
    #[config(default = 1)]
    pub cell_depth: usize,
    #[config(default = "EncoderType::Bidirectional")]
    pub encoder_type: EncoderType,
    #[config(default = false)]
    pub skip: bool,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BiDeepEncoder<B> {
        let (bi_layers, uni_layers) = match self.encoder_type {
            EncoderType::Bidirectional | EncoderType::Alternating => (self.depth, 0),
            EncoderType::BiUnidirectional => (1, self.depth.saturating_sub(1)),
        };
        let (forward_dir, backward_dir) = match self.encoder_type {
            EncoderType::Alternating => {
                (Direction::AlternatingForward, Direction::AlternatingBackward)
            }
            _ => (Direction::Forward, Direction::Backward),
        };

        let bi_stack = |direction| {
            StackedRnnConfig::new(self.emb_dim, self.rnn_dim)
                .with_depth(bi_layers)
                .with_transition_depth(self.cell_depth)
                .with_direction(direction)
                .with_skip(self.skip)
                .init(device)
        };
        let uni_stack = (uni_layers > 0).then(|| {
            StackedRnnConfig::new(2 * self.rnn_dim, 2 * self.rnn_dim)
                .with_depth(uni_layers)
                .with_transition_depth(self.cell_depth)
                .with_skip(self.skip)
                .init(device)
        });

        BiDeepEncoder {
            embedding:      EmbeddingConfig::new(self.vocab_size, self.emb_dim).init(device),
            forward_stack:  bi_stack(forward_dir),
            backward_stack: bi_stack(backward_dir),
            uni_stack,
        }
    }
}

// ─── BiDeepEncoder ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BiDeepEncoder<B: Backend> {
    pub embedding:      Embedding<B>,
    pub forward_stack:  StackedRnn<B>,
    pub backward_stack: StackedRnn<B>,
    /// Forward-only layers over the concatenated states (bi-unidirectional)
    pub uni_stack:      Option<StackedRnn<B>>,
}

impl<B: Backend> BiDeepEncoder<B> {
    /// source → encoder states [src_len, batch, 2·rnn_dim]
    pub fn forward(&self, source: &MaskedData<B>) -> Result<Tensor<B, 3>> {
        let lengths  = &source.host_lengths;
        let embedded = source.embed(&self.embedding);

        let states = Tensor::cat(
            vec![
                self.forward_stack.forward(embedded.clone(), lengths)?,
                self.backward_stack.forward(embedded, lengths)?,
            ],
            2,
        );
        match &self.uni_stack {
            Some(stack) => stack.forward(states, lengths),
            None => Ok(states),
        }
    }
}
