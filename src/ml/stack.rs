// ============================================================
// Layer 5 — Stacked Recurrent Layers
// ============================================================
// An ordered list of deep-transition layers. Layer l+1 reads
// layer l's output. Two ways to run it:
//
//   forward(sequence, lengths)   whole-sequence transduction,
//                                used by the encoder
//   step(input, state, attn)     one time step through every
//                                layer, used by the decoder
//
// Direction policy (forward only):
//   forward               every layer reads left → right
//   backward              every layer reads right → left
//   alternating_forward   even layers forward, odd backward
//   alternating_backward  even layers backward, odd forward
//
// A backward layer reverses the valid prefix of each sequence,
// transduces, and reverses its output back, so padding is never
// fed to the recurrence first.
//
// With skip connections every layer above the first adds its
// input to its output before passing it up.
//
// The decoder prepends one conditional (attention) layer with
// insert_conditional_cell(). A conditional layer can only be
// stepped, and only with an AttentionContext.

use std::{fmt, str::FromStr};

use burn::{module::Ignored, prelude::*};
use serde::{Deserialize, Serialize};

use crate::domain::error::{NmtError, Result};
use crate::ml::{
    attention::AttentionContext,
    cell::{
        ConditionalCellConfig, ConditionalDeepTransitionCell, DeepTransitionCell,
        DeepTransitionCellConfig,
    },
    masked::reverse_padded_sequence,
};

// ─── Direction ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
    AlternatingForward,
    AlternatingBackward,
}

impl Direction {
    /// Whether layer `layer` (0-based) reads its input right to left.
    pub fn is_backward(self, layer: usize) -> bool {
        match self {
            Self::Forward             => false,
            Self::Backward            => true,
            Self::AlternatingForward  => layer % 2 == 1,
            Self::AlternatingBackward => layer % 2 == 0,
        }
    }
}

impl FromStr for Direction {
    type Err = NmtError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "forward"              => Ok(Self::Forward),
            "backward"             => Ok(Self::Backward),
            "alternating_forward"  => Ok(Self::AlternatingForward),
            "alternating_backward" => Ok(Self::AlternatingBackward),
            other => Err(NmtError::config(format!("unknown stack direction '{other}'"))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Forward             => "forward",
            Self::Backward            => "backward",
            Self::AlternatingForward  => "alternating_forward",
            Self::AlternatingBackward => "alternating_backward",
        };
        f.write_str(name)
    }
}

// ─── StackLayer ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub enum StackLayer<B: Backend> {
    Plain(DeepTransitionCell<B>),
    Conditional(ConditionalDeepTransitionCell<B>),
}

/// Result of advancing the whole stack by one time step.
#[derive(Debug, Clone)]
pub struct StackStep<B: Backend> {
    /// New per-layer states, [layers, batch, hidden]
    pub state:   Tensor<B, 3>,
    /// What the top layer passes upward (its state, plus its input under skip)
    pub output:  Tensor<B, 2>,
    /// Attention context from a conditional base layer
    pub context: Option<Tensor<B, 2>>,
}

// ─── StackedRnn ───────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct StackedRnnConfig {
    pub input_dim:  usize,
    pub hidden_dim: usize,
    #[config(default = 1)]
    pub depth: usize,
    #[config(default = 1)]
    pub transition_depth: usize,
    #[config(default = "Direction::Forward")]
    pub direction: Direction,
    #[config(default = false)]
    pub skip: bool,
}

impl StackedRnnConfig {
    /// `depth` may be 0: the decoder builds an empty stack and then
    /// prepends its conditional layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> StackedRnn<B> {
        let layers = (0..self.depth)
            .map(|l| {
                let input_dim = if l == 0 { self.input_dim } else { self.hidden_dim };
                let cell = DeepTransitionCellConfig::new(input_dim, self.hidden_dim)
                    .with_transition_depth(self.transition_depth)
                    .init(device);
                StackLayer::Plain(cell)
            })
            .collect();
        StackedRnn {
            layers,
            direction:  Ignored(self.direction),
            skip:       self.skip,
            hidden_dim: self.hidden_dim,
        }
    }
}

#[derive(Module, Debug)]
pub struct StackedRnn<B: Backend> {
    pub layers:     Vec<StackLayer<B>>,
    pub direction:  Ignored<Direction>,
    pub skip:       bool,
    pub hidden_dim: usize,
}

impl<B: Backend> StackedRnn<B> {
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Put a conditional deep-transition layer at the bottom of the stack.
    pub fn insert_conditional_cell(mut self, config: &ConditionalCellConfig, device: &B::Device) -> Self {
        self.layers.insert(0, StackLayer::Conditional(config.init(device)));
        self
    }

    /// Bind encoder states to the conditional base layer.
    pub fn set_attention_context(
        &self,
        encoder_states: Tensor<B, 3>,
        source_mask:    Tensor<B, 2, Bool>,
    ) -> Result<AttentionContext<B>> {
        match self.layers.first() {
            Some(StackLayer::Conditional(cell)) => {
                Ok(cell.set_attention_context(encoder_states, source_mask))
            }
            _ => Err(NmtError::shape("stack has no conditional base layer to attend with")),
        }
    }

    /// Transduce `input` ([seq_len, batch, input_dim]) through every layer.
    /// `lengths` are the valid prefix lengths of each column.
    pub fn forward(&self, input: Tensor<B, 3>, lengths: &[usize]) -> Result<Tensor<B, 3>> {
        let mut layer_input = input;
        for (l, layer) in self.layers.iter().enumerate() {
            let StackLayer::Plain(cell) = layer else {
                return Err(NmtError::shape(format!(
                    "layer {l} is conditional and can only be stepped"
                )));
            };

            let backward = self.direction.0.is_backward(l);
            let mut out = if backward {
                let reversed = reverse_padded_sequence(layer_input.clone(), lengths);
                reverse_padded_sequence(cell.forward(reversed), lengths)
            } else {
                cell.forward(layer_input.clone())
            };
            if self.skip && l > 0 {
                out = out + layer_input;
            }
            layer_input = out;
        }
        Ok(layer_input)
    }

    /// Advance every layer by one time step.
    ///
    /// `input`: [batch, input_dim], `state`: [layers, batch, hidden].
    pub fn step(
        &self,
        input:     Tensor<B, 2>,
        state:     Tensor<B, 3>,
        attention: Option<&AttentionContext<B>>,
    ) -> Result<StackStep<B>> {
        let [layers, batch, hidden] = state.dims();
        if layers != self.layers.len() {
            return Err(NmtError::shape(format!(
                "stack has {} layers but the state holds {layers}",
                self.layers.len()
            )));
        }

        let mut layer_input = input;
        let mut states = Vec::with_capacity(layers);
        let mut context = None;
        for (l, layer) in self.layers.iter().enumerate() {
            let layer_state = state.clone().narrow(0, l, 1).reshape([batch, hidden]);
            let new_state = match layer {
                StackLayer::Plain(cell) => cell.step(layer_input.clone(), layer_state),
                StackLayer::Conditional(cell) => {
                    let ctx = attention.ok_or_else(|| {
                        NmtError::shape(format!("conditional layer {l} stepped without attention"))
                    })?;
                    let (new_state, c) = cell.step(layer_input.clone(), layer_state, ctx);
                    context = Some(c);
                    new_state
                }
            };
            states.push(new_state.clone().unsqueeze_dim::<3>(0));
            layer_input = if self.skip && l > 0 { new_state + layer_input } else { new_state };
        }

        Ok(StackStep { state: Tensor::cat(states, 0), output: layer_input, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type B = NdArray;

    fn to_vec(t: Tensor<B, 3>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_direction_parity() {
        assert!(!Direction::AlternatingForward.is_backward(0));
        assert!(Direction::AlternatingForward.is_backward(1));
        assert!(Direction::AlternatingBackward.is_backward(0));
        assert!(!Direction::AlternatingBackward.is_backward(3));
        assert_eq!("alternating-backward".parse::<Direction>().unwrap(), Direction::AlternatingBackward);
    }

    #[test]
    fn test_backward_layer_ignores_trailing_padding() {
        let device = Default::default();
        let stack = StackedRnnConfig::new(3, 4)
            .with_direction(Direction::Backward)
            .init::<B>(&device);

        // Column 1 has length 2; changing its padding must not move its real outputs
        let x = Tensor::<B, 3>::random([3, 2, 3], Distribution::Default, &device);
        let noise = Tensor::<B, 3>::random([1, 1, 3], Distribution::Default, &device);
        let padded_change = x.clone().slice_assign([2..3, 1..2, 0..3], noise);

        let a = stack.forward(x, &[3, 2]).unwrap();
        let b = stack.forward(padded_change, &[3, 2]).unwrap();
        let a = to_vec(a.narrow(0, 0, 2).narrow(1, 1, 1));
        let b = to_vec(b.narrow(0, 0, 2).narrow(1, 1, 1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_skip_adds_layer_input_above_first_layer() {
        let device = Default::default();
        let config = StackedRnnConfig::new(3, 4).with_depth(2);
        let plain = config.init::<B>(&device);
        let skip = StackedRnn { skip: true, ..config.init::<B>(&device) }
            .load_record(plain.clone().into_record());

        let x = Tensor::<B, 3>::random([4, 2, 3], Distribution::Default, &device);
        let StackLayer::Plain(first) = &plain.layers[0] else { unreachable!() };
        let below = first.forward(x.clone());

        let expected = to_vec(plain.forward(x.clone(), &[4, 4]).unwrap() + below);
        let got = to_vec(skip.forward(x, &[4, 4]).unwrap());
        for (e, g) in expected.iter().zip(&got) {
            assert!((e - g).abs() < 1e-6);
        }
    }

    #[test]
    fn test_conditional_layer_requires_attention() {
        let device = Default::default();
        let stack = StackedRnnConfig::new(4, 4)
            .with_depth(1)
            .init::<B>(&device)
            .insert_conditional_cell(&ConditionalCellConfig::new(3, 4), &device);
        assert_eq!(stack.num_layers(), 2);

        let input = Tensor::<B, 2>::zeros([2, 3], &device);
        let state = Tensor::<B, 3>::zeros([2, 2, 4], &device);
        assert!(matches!(stack.step(input.clone(), state.clone(), None), Err(NmtError::Shape(_))));
        assert!(stack.forward(Tensor::zeros([3, 2, 3], &device), &[3, 3]).is_err());

        let encoder_states = Tensor::<B, 3>::random([5, 2, 8], Distribution::Default, &device);
        let mask = Tensor::<B, 2, Int>::ones([5, 2], &device).bool();
        let ctx = stack.set_attention_context(encoder_states, mask).unwrap();
        let out = stack.step(input, state, Some(&ctx)).unwrap();
        assert_eq!(out.state.dims(), [2, 2, 4]);
        assert_eq!(out.output.dims(), [2, 4]);
        assert_eq!(out.context.map(|c| c.dims()), Some([2, 8]));
    }

    fn assert_close(a: Vec<f32>, b: Vec<f32>) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6, "{x} != {y}");
        }
    }

    #[test]
    fn test_step_feeds_each_layer_into_the_next_with_skips() {
        let device = Default::default();
        let stack = StackedRnnConfig::new(4, 4)
            .with_depth(2)
            .with_skip(true)
            .init::<B>(&device)
            .insert_conditional_cell(&ConditionalCellConfig::new(3, 4), &device);

        let encoder_states = Tensor::<B, 3>::random([5, 2, 8], Distribution::Default, &device);
        let mask = Tensor::<B, 2, Int>::ones([5, 2], &device).bool();
        let ctx = stack.set_attention_context(encoder_states, mask).unwrap();
        let input = Tensor::<B, 2>::random([2, 3], Distribution::Default, &device);
        let state = Tensor::<B, 3>::random([3, 2, 4], Distribution::Default, &device);
        let layer_state = |l: usize| state.clone().narrow(0, l, 1).reshape([2, 4]);

        let (StackLayer::Conditional(base), StackLayer::Plain(mid), StackLayer::Plain(top)) =
            (&stack.layers[0], &stack.layers[1], &stack.layers[2])
        else {
            unreachable!()
        };
        // Layer 0 passes its state up unchanged; layers 1 and 2 add their input
        let (s0, c0) = base.step(input.clone(), layer_state(0), &ctx);
        let s1 = mid.step(s0.clone(), layer_state(1));
        let up1 = s1.clone() + s0.clone();
        let s2 = top.step(up1.clone(), layer_state(2));
        let up2 = s2.clone() + up1;

        let got = stack.step(input, state.clone(), Some(&ctx)).unwrap();
        let expected_state = Tensor::stack::<3>(vec![s0, s1, s2], 0);
        assert_close(to_vec(got.state), to_vec(expected_state));
        assert_close(got.output.into_data().to_vec().unwrap(), up2.into_data().to_vec().unwrap());
        assert_close(
            got.context.unwrap().into_data().to_vec().unwrap(),
            c0.into_data().to_vec().unwrap(),
        );
    }

    #[test]
    fn test_plain_stack_has_no_attention_binding() {
        let device = Default::default();
        let stack = StackedRnnConfig::new(3, 4).init::<B>(&device);
        let mask = Tensor::<B, 2, Int>::ones([2, 1], &device).bool();
        assert!(stack.set_attention_context(Tensor::zeros([2, 1, 8], &device), mask).is_err());
    }
}
