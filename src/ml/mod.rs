// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The network and its training loop. Everything here is generic
// over the Burn backend; tensors are time-major throughout:
// [seq_len, batch, dim].
//
// What's in this layer, bottom-up:
//
//   masked.rs     — MaskedData: ids + mask + lengths, and
//                   per-sequence time reversal
//   attention.rs  — additive (Bahdanau) attention with a
//                   precomputed encoder-side projection
//   cell.rs       — GRU cell, deep-transition cell and the
//                   conditional cell with attention
//   stack.rs      — layers of deep-transition cells with
//                   per-layer direction and optional skips
//   encoder.rs    — the BiDeep encoder (three layouts)
//   decoder.rs    — Decoder trait, BiDeep decoder, deep output
//   sutskever.rs  — the attention-free decoder
//   model.rs      — encoder + decoder + masked cross-entropy
//   trainer.rs    — Adam loop over prefetched minibatches
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Miceli Barone et al. (2017) Deep Architectures for NMT

/// Padded token ids with mask and lengths
pub mod masked;

/// Additive attention over encoder states
pub mod attention;

/// GRU, deep-transition and conditional cells
pub mod cell;

/// Multi-layer recurrent stack
pub mod stack;

/// BiDeep encoder
pub mod encoder;

/// Decoder trait and the BiDeep decoder
pub mod decoder;

/// Sutskever decoder without attention
pub mod sutskever;

/// Full encoder-decoder model and loss
pub mod model;

/// Training loop
pub mod trainer;
