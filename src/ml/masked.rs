// ============================================================
// Layer 5 — Masked Sequence Batches
// ============================================================
// Every batch the model sees is time-major:
//
//   data    [seq_len, batch]   token ids, 0 = padding
//   mask    [seq_len, batch]   true where data holds a real token
//   lengths [batch]            number of real tokens per column
//
// Padding always sits at the end of a column, so the real tokens
// of example i are data[0..lengths[i], i].
//
// reverse_padded_sequence flips only that valid prefix, which is
// what a backward-running recurrent layer needs: it must see the
// last real token first, and never start from padding.

use burn::{nn::Embedding, prelude::*};

// ─── MaskedData ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct MaskedData<B: Backend> {
    pub data:    Tensor<B, 2, Int>,
    pub mask:    Tensor<B, 2, Bool>,
    pub lengths: Tensor<B, 1, Int>,
    /// Host copy of `lengths`, used to build index tensors without a readback
    pub host_lengths: Vec<usize>,
}

impl<B: Backend> MaskedData<B> {
    /// Build a batch from time-major padded ids.
    ///
    /// `ids` is laid out row by row: `ids[t * batch + i]`.
    pub fn from_padded(ids: &[i32], lengths: Vec<usize>, device: &B::Device) -> Self {
        let batch   = lengths.len();
        let seq_len = if batch == 0 { 0 } else { ids.len() / batch };

        let data = Tensor::<B, 1, Int>::from_ints(ids, device).reshape([seq_len, batch]);
        let mask = Tensor::<B, 2, Bool>::from_data(
            TensorData::new(prefix_flags(&lengths, seq_len), [seq_len, batch]),
            device,
        );
        let host: Vec<i32> = lengths.iter().map(|&l| l as i32).collect();
        let lengths_tensor = Tensor::<B, 1, Int>::from_ints(host.as_slice(), device);

        Self { data, mask, lengths: lengths_tensor, host_lengths: lengths }
    }

    pub fn seq_len(&self) -> usize {
        self.data.dims()[0]
    }

    pub fn batch_size(&self) -> usize {
        self.data.dims()[1]
    }

    /// Mask as 0.0 / 1.0 floats, [seq_len, batch].
    pub fn float_mask(&self) -> Tensor<B, 2> {
        self.mask.clone().float()
    }

    /// Look up embeddings for `data`; padding positions come out as zero
    /// vectors and pass no gradient back to the embedding table.
    pub fn embed(&self, embedding: &Embedding<B>) -> Tensor<B, 3> {
        let mask = self.float_mask().unsqueeze_dim::<3>(2);
        embedding.forward(self.data.clone()) * mask
    }

    /// Move all three tensors to `device`.
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            data:         self.data.to_device(device),
            mask:         self.mask.to_device(device),
            lengths:      self.lengths.to_device(device),
            host_lengths: self.host_lengths,
        }
    }
}

/// Row-major `[seq_len, batch]` flags, true for `t < lengths[i]`.
pub fn prefix_flags(lengths: &[usize], seq_len: usize) -> Vec<bool> {
    (0..seq_len)
        .flat_map(|t| lengths.iter().map(move |&len| t < len))
        .collect()
}

// ─── Reversal ─────────────────────────────────────────────────────────────────
/// Time indices that reverse the valid prefix of every column and leave
/// padding positions where they are. Row-major `[seq_len, batch]`.
pub fn reversed_time_indices(lengths: &[usize], seq_len: usize) -> Vec<i32> {
    let batch = lengths.len();
    let mut indices = Vec::with_capacity(seq_len * batch);
    for t in 0..seq_len {
        for &len in lengths {
            let len = len.min(seq_len);
            let source_t = if t < len { len - 1 - t } else { t };
            indices.push(source_t as i32);
        }
    }
    indices
}

/// Reverse the first `lengths[i]` time steps of column `i` of `x`
/// (`[seq_len, batch, dim]`). Applying it twice gives back `x`.
pub fn reverse_padded_sequence<B: Backend>(x: Tensor<B, 3>, lengths: &[usize]) -> Tensor<B, 3> {
    let [seq_len, batch, dim] = x.dims();
    let indices = reversed_time_indices(lengths, seq_len);
    let indices = Tensor::<B, 1, Int>::from_ints(indices.as_slice(), &x.device())
        .reshape([seq_len, batch, 1])
        .expand([seq_len, batch, dim]);
    x.gather(0, indices)
}
