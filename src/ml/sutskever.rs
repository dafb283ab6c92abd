// ============================================================
// Layer 5 — Sutskever Decoder (no attention)
// ============================================================
// The plain sequence-to-sequence decoder: a stack of GRU cells
// started from the encoder state at the last real source
// token, with no attention over the other positions.
//
//   start   tanh(W · enc[len_i − 1, i])  copied to every layer
//   step    GRU_1(e_t, h_1) → GRU_2(·, h_2) → … → top state
//   output  Linear(top state) → vocab logits
//
// Teacher forcing is the same as in the BiDeep decoder: zeros
// at t = 0, then the embedding of reference token t−1.
//
// The projection input is the rnn state, so tied embeddings
// need emb_dim == rnn_dim. ModelConfig::validate enforces it.
//
// Reference: Sutskever et al. (2014) Sequence to Sequence Learning

use burn::{
    nn::{Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
};

use crate::domain::error::{NmtError, Result};
use crate::ml::{
    attention::AttentionContext,
    cell::{GruCell, GruCellConfig},
    decoder::{broadcast_to_layers, shift_right, Decoder, OutputProjection},
    masked::MaskedData,
    stack::StackStep,
};

#[derive(Config, Debug)]
pub struct SutskeverDecoderConfig {
    pub vocab_size: usize,
    pub emb_dim:    usize,
    pub rnn_dim:    usize,
    #[config(default = 1)]
    pub depth: usize,
    #[config(default = false)]
    pub tied_embeddings: bool,
}

impl SutskeverDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> SutskeverDecoder<B> {
        let layers = (0..self.depth.max(1))
            .map(|l| {
                let input_dim = if l == 0 { self.emb_dim } else { self.rnn_dim };
                GruCellConfig::new(input_dim, self.rnn_dim).init(device)
            })
            .collect();
        SutskeverDecoder {
            embedding: EmbeddingConfig::new(self.vocab_size, self.emb_dim).init(device),
            bridge:    LinearConfig::new(2 * self.rnn_dim, self.rnn_dim).init(device),
            layers,
            output:    OutputProjection::new(
                self.rnn_dim,
                self.vocab_size,
                self.tied_embeddings,
                device,
            ),
        }
    }
}

#[derive(Module, Debug)]
pub struct SutskeverDecoder<B: Backend> {
    pub embedding: Embedding<B>,
    /// Encoder state (2·rnn) → decoder state (rnn)
    pub bridge:    Linear<B>,
    pub layers:    Vec<GruCell<B>>,
    pub output:    OutputProjection<B>,
}

impl<B: Backend> Decoder<B> for SutskeverDecoder<B> {
    fn start_state(&self, encoder_states: &Tensor<B, 3>, source: &MaskedData<B>) -> Tensor<B, 3> {
        let [_, batch, context_dim] = encoder_states.dims();
        let last: Vec<i32> = source
            .host_lengths
            .iter()
            .map(|&len| len.saturating_sub(1) as i32)
            .collect();
        let index = Tensor::<B, 1, Int>::from_ints(last.as_slice(), &encoder_states.device())
            .reshape([1, batch, 1])
            .expand([1, batch, context_dim]);
        let last_states = encoder_states.clone().gather(0, index).reshape([batch, context_dim]);
        broadcast_to_layers(self.bridge.forward(last_states).tanh(), self.layers.len())
    }

    fn bind_attention(
        &self,
        _encoder_states: Tensor<B, 3>,
        _source:         &MaskedData<B>,
    ) -> Result<Option<AttentionContext<B>>> {
        Ok(None)
    }

    fn step(
        &self,
        input:      Tensor<B, 2>,
        state:      Tensor<B, 3>,
        _attention: Option<&AttentionContext<B>>,
    ) -> Result<StackStep<B>> {
        let [layers, batch, hidden] = state.dims();
        if layers != self.layers.len() {
            return Err(NmtError::shape(format!(
                "decoder has {} layers but the state holds {layers}",
                self.layers.len()
            )));
        }
        let mut layer_input = input;
        let mut states = Vec::with_capacity(layers);
        for (l, cell) in self.layers.iter().enumerate() {
            let layer_state = state.clone().narrow(0, l, 1).reshape([batch, hidden]);
            layer_input = cell.forward(layer_input, layer_state);
            states.push(layer_input.clone().unsqueeze_dim::<3>(0));
        }
        Ok(StackStep { state: Tensor::cat(states, 0), output: layer_input, context: None })
    }

    fn forward(
        &self,
        encoder_states: Tensor<B, 3>,
        source:         &MaskedData<B>,
        target:         &MaskedData<B>,
    ) -> Result<Tensor<B, 3>> {
        let inputs = shift_right(target.embed(&self.embedding));
        let [trg_len, batch, emb_dim] = inputs.dims();

        let mut state = self.start_state(&encoder_states, source);
        let mut outputs = Vec::with_capacity(trg_len);
        for t in 0..trg_len {
            let input_t = inputs.clone().narrow(0, t, 1).reshape([batch, emb_dim]);
            let step = self.step(input_t, state, None)?;
            outputs.push(step.output.unsqueeze_dim::<3>(0));
            state = step.state;
        }
        Ok(self.output.forward(Tensor::cat(outputs, 0), &self.embedding))
    }
}
