// ============================================================
// Layer 5 — BiDeep Attention Decoder
// ============================================================
// Predicts the target sentence one position at a time with
// teacher forcing: the input at step t is the embedding of the
// reference token t−1 (zeros at t = 0).
//
//   1. start state   tanh(W · masked mean of encoder states),
//                    copied to every layer
//   2. attention     encoder states bound once per batch to the
//                    conditional base layer
//   3. step loop     stack.step(input_t, state) → state, context_t
//   4. deep output   tanh(L_e·e_t + L_s·s_t + L_c·c_t) → vocab logits
//
//   ┌─────────────────────────────── stack ─┐
//   │ layer L−1 … 1  DeepTransitionCell      │
//   │ layer 0        ConditionalCell ◄─ attn │
//   └────────────────────────────────────────┘
//
// With tied embeddings the vocabulary projection multiplies by
// the transposed target embedding table, so one parameter is
// trained by both the input lookup and the output layer.
//
// Reference: Sennrich et al. (2017) Nematus: a Toolkit for NMT
//            Press & Wolf (2017) Using the Output Embedding

use burn::{
    module::Param,
    nn::{Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
};

use crate::domain::error::{NmtError, Result};
use crate::ml::{
    attention::AttentionContext,
    cell::ConditionalCellConfig,
    masked::MaskedData,
    stack::{StackStep, StackedRnn, StackedRnnConfig},
};

// ─── Decoder trait ────────────────────────────────────────────────────────────
/// What the encoder-decoder model needs from any decoder.
pub trait Decoder<B: Backend> {
    /// Initial per-layer state, [layers, batch, rnn_dim].
    fn start_state(&self, encoder_states: &Tensor<B, 3>, source: &MaskedData<B>) -> Tensor<B, 3>;

    /// Bind encoder states for attention, if this decoder attends.
    fn bind_attention(
        &self,
        encoder_states: Tensor<B, 3>,
        source:         &MaskedData<B>,
    ) -> Result<Option<AttentionContext<B>>>;

    /// One decoding step. `input` is the embedding of the previous token.
    fn step(
        &self,
        input:     Tensor<B, 2>,
        state:     Tensor<B, 3>,
        attention: Option<&AttentionContext<B>>,
    ) -> Result<StackStep<B>>;

    /// Teacher-forced logits for the whole target batch, [trg_len, batch, vocab].
    fn forward(
        &self,
        encoder_states: Tensor<B, 3>,
        source:         &MaskedData<B>,
        target:         &MaskedData<B>,
    ) -> Result<Tensor<B, 3>>;
}

/// Decoder inputs under teacher forcing: zeros, then embeddings 0..T−1.
pub fn shift_right<B: Backend>(embedded: Tensor<B, 3>) -> Tensor<B, 3> {
    let [trg_len, batch, dim] = embedded.dims();
    let zeros = Tensor::zeros([1, batch, dim], &embedded.device());
    if trg_len <= 1 {
        return zeros;
    }
    Tensor::cat(vec![zeros, embedded.narrow(0, 0, trg_len - 1)], 0)
}

/// Copy a [batch, hidden] state to every layer.
pub fn broadcast_to_layers<B: Backend>(state: Tensor<B, 2>, layers: usize) -> Tensor<B, 3> {
    state.unsqueeze_dim::<3>(0).repeat_dim(0, layers)
}

// ─── OutputProjection ─────────────────────────────────────────────────────────
/// Final hidden → vocabulary logits. Either its own Linear layer or,
/// with tied embeddings, the transposed target embedding plus a bias.
#[derive(Module, Debug)]
pub struct OutputProjection<B: Backend> {
    pub linear:    Option<Linear<B>>,
    pub tied_bias: Option<Param<Tensor<B, 1>>>,
}

impl<B: Backend> OutputProjection<B> {
    pub fn new(hidden_dim: usize, vocab_size: usize, tied: bool, device: &B::Device) -> Self {
        if tied {
            Self {
                linear:    None,
                tied_bias: Some(Param::from_tensor(Tensor::zeros([vocab_size], device))),
            }
        } else {
            Self {
                linear:    Some(LinearConfig::new(hidden_dim, vocab_size).init(device)),
                tied_bias: None,
            }
        }
    }

    pub fn is_tied(&self) -> bool {
        self.linear.is_none()
    }

    /// hidden [len, batch, dim] → logits [len, batch, vocab]
    pub fn forward(&self, hidden: Tensor<B, 3>, embedding: &Embedding<B>) -> Tensor<B, 3> {
        if let Some(linear) = &self.linear {
            return linear.forward(hidden);
        }
        let [len, batch, dim] = hidden.dims();
        let weight = embedding.weight.val(); // [vocab, dim]
        let vocab  = weight.dims()[0];
        let mut logits = hidden.reshape([len * batch, dim]).matmul(weight.transpose());
        if let Some(bias) = &self.tied_bias {
            logits = logits + bias.val().unsqueeze_dim::<2>(0);
        }
        logits.reshape([len, batch, vocab])
    }
}

// ─── DeepOutput ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct DeepOutput<B: Backend> {
    pub emb_map:     Linear<B>,
    pub state_map:   Linear<B>,
    pub context_map: Linear<B>,
    pub projection:  OutputProjection<B>,
}

impl<B: Backend> DeepOutput<B> {
    pub fn new(emb_dim: usize, rnn_dim: usize, vocab_size: usize, tied: bool, device: &B::Device) -> Self {
        Self {
            emb_map:     LinearConfig::new(emb_dim, emb_dim).init(device),
            state_map:   LinearConfig::new(rnn_dim, emb_dim).init(device),
            context_map: LinearConfig::new(2 * rnn_dim, emb_dim).init(device),
            projection:  OutputProjection::new(emb_dim, vocab_size, tied, device),
        }
    }

    /// All inputs are time-major; returns [trg_len, batch, vocab].
    pub fn forward(
        &self,
        inputs:    Tensor<B, 3>,
        states:    Tensor<B, 3>,
        contexts:  Tensor<B, 3>,
        embedding: &Embedding<B>,
    ) -> Tensor<B, 3> {
        let hidden = (self.emb_map.forward(inputs)
            + self.state_map.forward(states)
            + self.context_map.forward(contexts))
        .tanh();
        self.projection.forward(hidden, embedding)
    }
}

// ─── BiDeepDecoder ────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct BiDeepDecoderConfig {
    pub vocab_size: usize,
    pub emb_dim:    usize,
    pub rnn_dim:    usize,
    /// Total layers, the conditional base layer included
    #[config(default = 1)]
    pub depth: usize,
    #[config(default = 2)]
    pub base_cell_depth: usize,
    #[config(default = 1)]
    pub high_cell_depth: usize,
    #[config(default = false)]
    pub skip: bool,
    #[config(default = false)]
    pub tied_embeddings: bool,
}

impl BiDeepDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BiDeepDecoder<B> {
        let base = ConditionalCellConfig::new(self.emb_dim, self.rnn_dim)
            .with_transition_depth(self.base_cell_depth);
        let rnn = StackedRnnConfig::new(self.rnn_dim, self.rnn_dim)
            .with_depth(self.depth.saturating_sub(1))
            .with_transition_depth(self.high_cell_depth)
            .with_skip(self.skip)
            .init(device)
            .insert_conditional_cell(&base, device);

        BiDeepDecoder {
            embedding:      EmbeddingConfig::new(self.vocab_size, self.emb_dim).init(device),
            map_to_decoder: LinearConfig::new(2 * self.rnn_dim, self.rnn_dim).init(device),
            rnn,
            output: DeepOutput::new(
                self.emb_dim,
                self.rnn_dim,
                self.vocab_size,
                self.tied_embeddings,
                device,
            ),
        }
    }
}

#[derive(Module, Debug)]
pub struct BiDeepDecoder<B: Backend> {
    pub embedding:      Embedding<B>,
    pub map_to_decoder: Linear<B>,
    pub rnn:            StackedRnn<B>,
    pub output:         DeepOutput<B>,
}

impl<B: Backend> Decoder<B> for BiDeepDecoder<B> {
    fn start_state(&self, encoder_states: &Tensor<B, 3>, source: &MaskedData<B>) -> Tensor<B, 3> {
        let [_, batch, context_dim] = encoder_states.dims();
        let mask    = source.float_mask().unsqueeze_dim::<3>(2);
        let lengths = source.lengths.clone().float().unsqueeze_dim::<2>(1);
        let mean = (encoder_states.clone() * mask)
            .sum_dim(0)
            .reshape([batch, context_dim])
            / lengths;
        let state = self.map_to_decoder.forward(mean).tanh();
        broadcast_to_layers(state, self.rnn.num_layers())
    }

    fn bind_attention(
        &self,
        encoder_states: Tensor<B, 3>,
        source:         &MaskedData<B>,
    ) -> Result<Option<AttentionContext<B>>> {
        self.rnn
            .set_attention_context(encoder_states, source.mask.clone())
            .map(Some)
    }

    fn step(
        &self,
        input:     Tensor<B, 2>,
        state:     Tensor<B, 3>,
        attention: Option<&AttentionContext<B>>,
    ) -> Result<StackStep<B>> {
        self.rnn.step(input, state, attention)
    }

    fn forward(
        &self,
        encoder_states: Tensor<B, 3>,
        source:         &MaskedData<B>,
        target:         &MaskedData<B>,
    ) -> Result<Tensor<B, 3>> {
        let inputs  = shift_right(target.embed(&self.embedding));
        let [trg_len, batch, emb_dim] = inputs.dims();

        let mut state = self.start_state(&encoder_states, source);
        let attention = self.bind_attention(encoder_states, source)?;

        let mut states   = Vec::with_capacity(trg_len);
        let mut contexts = Vec::with_capacity(trg_len);
        for t in 0..trg_len {
            let input_t = inputs.clone().narrow(0, t, 1).reshape([batch, emb_dim]);
            let step = self.step(input_t, state, attention.as_ref())?;
            let context = step
                .context
                .ok_or_else(|| NmtError::shape("conditional base layer returned no context"))?;
            states.push(step.output.unsqueeze_dim::<3>(0));
            contexts.push(context.unsqueeze_dim::<3>(0));
            state = step.state;
        }

        Ok(self.output.forward(
            inputs,
            Tensor::cat(states, 0),
            Tensor::cat(contexts, 0),
            &self.embedding,
        ))
    }
}
