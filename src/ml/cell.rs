// ============================================================
// Layer 5 — Recurrent Cells
// ============================================================
// Three cells, each built from the one below it:
//
//   GruCell
//       standard gated recurrent unit, one time step
//
//   DeepTransitionCell (K sub-cells)
//       v_1 = GRU_1(x,    h)
//       v_k = GRU_k(0,    v_{k−1})     for 1 < k ≤ K
//       h'  = v_K
//     Only the first sub-cell sees the input. The transition gets
//     deeper without widening the per-step input.
//
//   ConditionalDeepTransitionCell (K sub-cells + attention)
//       v_1 = GRU_1(x,    h)
//       c   = attention(v_1)
//       v_2 = GRU_2(c,    v_1)
//       v_k = GRU_k(0,    v_{k−1})     for 2 < k ≤ K
//     The attention context replaces the zero input of sub-cell 2.
//
// All states are [batch, hidden]; sequences are time-major
// [seq_len, batch, dim].
//
// Reference: Pascanu et al. (2014) How to Construct Deep RNNs
//            Sennrich et al. (2017) Nematus

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::ml::attention::{AttentionConfig, AttentionContext, GlobalAttention};

// ─── GruCell ──────────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct GruCellConfig {
    pub input_dim:  usize,
    pub hidden_dim: usize,
}

impl GruCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GruCell<B> {
        GruCell {
            input_gates:  LinearConfig::new(self.input_dim, 3 * self.hidden_dim).init(device),
            hidden_gates: LinearConfig::new(self.hidden_dim, 3 * self.hidden_dim).init(device),
            hidden_dim:   self.hidden_dim,
        }
    }
}

/// r = σ(W_ir x + W_hr h), z = σ(W_iz x + W_hz h),
/// n = tanh(W_in x + r ⊙ W_hn h), h' = (1 − z) ⊙ n + z ⊙ h
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    /// x → [reset | update | candidate]
    pub input_gates:  Linear<B>,
    /// h → [reset | update | candidate]
    pub hidden_gates: Linear<B>,
    pub hidden_dim:   usize,
}

impl<B: Backend> GruCell<B> {
    /// input [batch, input_dim], state [batch, hidden] → [batch, hidden]
    pub fn forward(&self, input: Tensor<B, 2>, state: Tensor<B, 2>) -> Tensor<B, 2> {
        let h = self.hidden_dim;
        let gi = self.input_gates.forward(input);
        let gh = self.hidden_gates.forward(state.clone());

        let reset  = sigmoid(gi.clone().narrow(1, 0, h) + gh.clone().narrow(1, 0, h));
        let update = sigmoid(gi.clone().narrow(1, h, h) + gh.clone().narrow(1, h, h));
        let candidate = (gi.narrow(1, 2 * h, h) + reset * gh.narrow(1, 2 * h, h)).tanh();

        candidate.clone() + update * (state - candidate)
    }
}

// ─── DeepTransitionCell ───────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct DeepTransitionCellConfig {
    pub input_dim:  usize,
    pub hidden_dim: usize,
    #[config(default = 1)]
    pub transition_depth: usize,
}

impl DeepTransitionCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DeepTransitionCell<B> {
        let cells = (0..self.transition_depth.max(1))
            .map(|k| {
                let input_dim = if k == 0 { self.input_dim } else { self.hidden_dim };
                GruCellConfig::new(input_dim, self.hidden_dim).init(device)
            })
            .collect();
        DeepTransitionCell { cells, hidden_dim: self.hidden_dim }
    }
}

#[derive(Module, Debug)]
pub struct DeepTransitionCell<B: Backend> {
    pub cells:      Vec<GruCell<B>>,
    pub hidden_dim: usize,
}

impl<B: Backend> DeepTransitionCell<B> {
    /// One time step through every sub-cell.
    pub fn step(&self, input: Tensor<B, 2>, state: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut input = input;
        let mut state = state;
        for cell in &self.cells {
            state = cell.forward(input, state);
            input = state.zeros_like();
        }
        state
    }

    /// Transduce a whole sequence from a zero state.
    /// [seq_len, batch, input_dim] → [seq_len, batch, hidden]
    pub fn forward(&self, sequence: Tensor<B, 3>) -> Tensor<B, 3> {
        let [seq_len, batch, input_dim] = sequence.dims();
        let mut state = Tensor::zeros([batch, self.hidden_dim], &sequence.device());
        let mut outputs = Vec::with_capacity(seq_len);
        for t in 0..seq_len {
            let x_t = sequence.clone().narrow(0, t, 1).reshape([batch, input_dim]);
            state = self.step(x_t, state);
            outputs.push(state.clone().unsqueeze_dim::<3>(0));
        }
        Tensor::cat(outputs, 0)
    }
}

// ─── ConditionalDeepTransitionCell ────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct ConditionalCellConfig {
    pub input_dim:  usize,
    pub hidden_dim: usize,
    #[config(default = 2)]
    pub transition_depth: usize,
}

impl ConditionalCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConditionalDeepTransitionCell<B> {
        let context_dim = 2 * self.hidden_dim;
        let cells = (0..self.transition_depth.max(1))
            .map(|k| {
                let input_dim = match k {
                    0 => self.input_dim,
                    1 => context_dim,
                    _ => self.hidden_dim,
                };
                GruCellConfig::new(input_dim, self.hidden_dim).init(device)
            })
            .collect();
        ConditionalDeepTransitionCell {
            cells,
            attention:  AttentionConfig::new(context_dim, self.hidden_dim).init(device),
            hidden_dim: self.hidden_dim,
        }
    }
}

#[derive(Module, Debug)]
pub struct ConditionalDeepTransitionCell<B: Backend> {
    pub cells:      Vec<GruCell<B>>,
    pub attention:  GlobalAttention<B>,
    pub hidden_dim: usize,
}

impl<B: Backend> ConditionalDeepTransitionCell<B> {
    /// Bind the encoder states of one batch. The returned context is
    /// required by every `step` of that batch.
    pub fn set_attention_context(
        &self,
        encoder_states: Tensor<B, 3>,
        source_mask:    Tensor<B, 2, Bool>,
    ) -> AttentionContext<B> {
        self.attention.set_context(encoder_states, source_mask)
    }

    /// One time step. Returns (new state, attention context [batch, 2·hidden]).
    pub fn step(
        &self,
        input:     Tensor<B, 2>,
        state:     Tensor<B, 2>,
        attention: &AttentionContext<B>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut cells = self.cells.iter();
        let mut state = match cells.next() {
            Some(first) => first.forward(input, state),
            None => state,
        };
        let (context, _) = self.attention.forward(attention, state.clone());

        let mut input = context.clone();
        for cell in cells {
            state = cell.forward(input, state);
            input = state.zeros_like();
        }
        (state, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type B = NdArray;

    fn assert_close(a: Tensor<B, 2>, b: Tensor<B, 2>) {
        let a: Vec<f32> = a.into_data().to_vec().unwrap();
        let b: Vec<f32> = b.into_data().to_vec().unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6, "{x} != {y}");
        }
    }

    #[test]
    fn test_gru_cell_keeps_state_when_update_gate_saturates() {
        let device = Default::default();
        let mut cell = GruCellConfig::new(2, 3).init::<B>(&device);
        // Push the update gate to 1 through a large hidden bias
        let bias: Vec<f32> = (0..9).map(|i| if (3..6).contains(&i) { 1e4 } else { 0.0 }).collect();
        cell.hidden_gates.bias = Some(burn::module::Param::from_tensor(
            Tensor::<B, 1>::from_floats(bias.as_slice(), &device),
        ));
        let state = Tensor::<B, 2>::random([4, 3], Distribution::Default, &device);
        let input = Tensor::<B, 2>::random([4, 2], Distribution::Default, &device);
        assert_close(cell.forward(input, state.clone()), state);
    }

    #[test]
    fn test_depth_three_equals_manual_composition() {
        let device = Default::default();
        let cell = DeepTransitionCellConfig::new(5, 4)
            .with_transition_depth(3)
            .init::<B>(&device);
        assert_eq!(cell.cells.len(), 3);

        let input = Tensor::<B, 2>::random([2, 5], Distribution::Default, &device);
        let state = Tensor::<B, 2>::random([2, 4], Distribution::Default, &device);

        let v1 = cell.cells[0].forward(input.clone(), state.clone());
        let v2 = cell.cells[1].forward(Tensor::zeros([2, 4], &device), v1);
        let v3 = cell.cells[2].forward(Tensor::zeros([2, 4], &device), v2);
        assert_close(cell.step(input, state), v3);
    }

    #[test]
    fn test_forward_emits_one_output_per_step() {
        let device = Default::default();
        let cell = DeepTransitionCellConfig::new(3, 4)
            .with_transition_depth(2)
            .init::<B>(&device);
        let sequence = Tensor::<B, 3>::random([6, 2, 3], Distribution::Default, &device);
        let out = cell.forward(sequence.clone());
        assert_eq!(out.dims(), [6, 2, 4]);

        // First output is one step from the zero state
        let first = cell.step(
            sequence.narrow(0, 0, 1).reshape([2, 3]),
            Tensor::zeros([2, 4], &device),
        );
        assert_close(out.narrow(0, 0, 1).reshape([2, 4]), first);
    }

    #[test]
    fn test_conditional_step_feeds_context_to_second_cell() {
        let device = Default::default();
        let cell = ConditionalCellConfig::new(3, 4)
            .with_transition_depth(2)
            .init::<B>(&device);
        assert_eq!(cell.cells[1].input_gates.weight.dims(), [8, 12]);

        let encoder_states = Tensor::<B, 3>::random([5, 2, 8], Distribution::Default, &device);
        let mask = Tensor::<B, 2, Int>::ones([5, 2], &device).bool();
        let ctx = cell.set_attention_context(encoder_states, mask);

        let input = Tensor::<B, 2>::random([2, 3], Distribution::Default, &device);
        let state = Tensor::<B, 2>::random([2, 4], Distribution::Default, &device);
        let (new_state, context) = cell.step(input.clone(), state.clone(), &ctx);
        assert_eq!(context.dims(), [2, 8]);

        let v1 = cell.cells[0].forward(input, state);
        let (c, _) = cell.attention.forward(&ctx, v1.clone());
        assert_close(context, c.clone());
        assert_close(new_state, cell.cells[1].forward(c, v1));
    }
}
