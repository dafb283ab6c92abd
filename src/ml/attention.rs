// ============================================================
// Layer 5 — Additive (Bahdanau) Attention
// ============================================================
// Scores every encoder position against the current decoder
// state and returns the weighted sum of encoder states:
//
//   score_t   = v · tanh(W_s·state + W_h·enc_t + b)
//   weights   = softmax_t(score_t + log(mask_t))
//   context   = Σ_t weights_t · enc_t
//
// log(mask) is 0 at real tokens and −∞ at padding, so padded
// positions get exactly zero weight and the weights over the
// real tokens still sum to one.
//
// W_h·enc does not depend on the decoder state. It is computed
// once per batch by set_context() and carried in the returned
// AttentionContext, so each decoding step only pays for W_s·state.
//
// Reference: Bahdanau et al. (2015) Neural Machine Translation by
//            Jointly Learning to Align and Translate

use burn::{
    module::Param,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};

// ─── AttentionContext ─────────────────────────────────────────────────────────
/// Per-batch attention inputs. Built once by `GlobalAttention::set_context`
/// and borrowed by every decoding step of that batch.
#[derive(Debug, Clone)]
pub struct AttentionContext<B: Backend> {
    /// [src_len, batch, context_dim]
    pub encoder_states: Tensor<B, 3>,
    /// W_h · encoder_states, [src_len, batch, context_dim]
    pub mapped_states:  Tensor<B, 3>,
    /// log(mask): 0 for real tokens, −∞ for padding, [src_len, batch, 1]
    pub log_mask:       Tensor<B, 3>,
}

// ─── GlobalAttention ──────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct AttentionConfig {
    /// Width of each encoder state (2 × rnn_dim for a bidirectional encoder)
    pub context_dim: usize,
    /// Width of the decoder state used as the query
    pub state_dim:   usize,
}

impl AttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GlobalAttention<B> {
        GlobalAttention {
            context_map: LinearConfig::new(self.context_dim, self.context_dim)
                .with_bias(false)
                .init(device),
            state_map:   LinearConfig::new(self.state_dim, self.context_dim)
                .with_bias(false)
                .init(device),
            bias:        Param::from_tensor(Tensor::zeros([self.context_dim], device)),
            score:       LinearConfig::new(self.context_dim, 1).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct GlobalAttention<B: Backend> {
    pub context_map: Linear<B>,
    pub state_map:   Linear<B>,
    pub bias:        Param<Tensor<B, 1>>,
    pub score:       Linear<B>,
}

impl<B: Backend> GlobalAttention<B> {
    /// Bind one batch of encoder states.
    ///
    /// `encoder_states`: [src_len, batch, context_dim]
    /// `source_mask`:    [src_len, batch], true at real tokens
    pub fn set_context(
        &self,
        encoder_states: Tensor<B, 3>,
        source_mask:    Tensor<B, 2, Bool>,
    ) -> AttentionContext<B> {
        let log_mask = source_mask.float().log().unsqueeze_dim::<3>(2);
        let mapped_states = self.context_map.forward(encoder_states.clone());
        AttentionContext { encoder_states, mapped_states, log_mask }
    }

    /// `state`: [batch, state_dim]
    /// Returns (context [batch, context_dim], weights [src_len, batch, 1]).
    pub fn forward(
        &self,
        ctx:   &AttentionContext<B>,
        state: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 3>) {
        let [src_len, batch, context_dim] = ctx.encoder_states.dims();

        let query = self.state_map.forward(state).unsqueeze_dim::<3>(0); // [1, batch, ctx]
        let bias  = self.bias.val().reshape([1, 1, context_dim]);
        let energy = (ctx.mapped_states.clone() + query + bias).tanh();

        let scores  = self.score.forward(energy) + ctx.log_mask.clone(); // [src_len, batch, 1]
        let weights = softmax(scores, 0);

        let context = (ctx.encoder_states.clone() * weights.clone())
            .sum_dim(0)
            .reshape([batch, context_dim]);
        debug_assert_eq!(weights.dims(), [src_len, batch, 1]);
        (context, weights)
    }
}
