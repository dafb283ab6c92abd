// ============================================================
// Layer 4 — Minibatch Pad & Stack
// ============================================================
// Converts a Vec<TokenPair> pulled from the dataset into two
// time-major MaskedData batches (source and target).
//
// How padding works here:
//   Input:  N sequences of different lengths L_1 .. L_N
//   Output: a [max(L_i), N] id tensor, each column padded with 0
//
//   The longest sequence of *this* batch sets the width, not the
//   longest sentence of the corpus, so sorted maxibatches waste
//   little padding.
//
//   ids are written row by row (time first):
//   [s1_t1, s2_t1, ..., sN_t1, s1_t2, ...] → [T, N]
//
// Reference: Burn Book §4 (Batcher)
//            Rust Book §8 (Vectors)

use burn::prelude::*;

use crate::domain::token_pair::{TokenPair, PAD_ID};
use crate::ml::masked::MaskedData;

// ─── TranslationBatch ─────────────────────────────────────────────────────────
/// One minibatch ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct TranslationBatch<B: Backend> {
    pub source: MaskedData<B>,
    pub target: MaskedData<B>,
}

impl<B: Backend> TranslationBatch<B> {
    pub fn size(&self) -> usize {
        self.source.batch_size()
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            source: self.source.to_device(device),
            target: self.target.to_device(device),
        }
    }
}

// ─── PadAndStack ──────────────────────────────────────────────────────────────
/// Holds the device the batch tensors are created on.
#[derive(Clone, Debug)]
pub struct PadAndStack<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> PadAndStack<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, items: Vec<TokenPair>) -> TranslationBatch<B> {
        let (sources, targets): (Vec<_>, Vec<_>) =
            items.into_iter().map(|p| (p.source, p.target)).unzip();
        TranslationBatch {
            source: self.stack(&sources),
            target: self.stack(&targets),
        }
    }

    fn stack(&self, sequences: &[Vec<u32>]) -> MaskedData<B> {
        let (ids, lengths) = pad_sequences(sequences);
        MaskedData::from_padded(&ids, lengths, &self.device)
    }
}

/// Pad to the longest sequence, time-major, returning ids and lengths.
pub fn pad_sequences(sequences: &[Vec<u32>]) -> (Vec<i32>, Vec<usize>) {
    let lengths: Vec<usize> = sequences.iter().map(Vec::len).collect();
    let max_len = lengths.iter().copied().max().unwrap_or(0);

    let mut ids = Vec::with_capacity(max_len * sequences.len());
    for t in 0..max_len {
        for seq in sequences {
            ids.push(seq.get(t).copied().unwrap_or(PAD_ID) as i32);
        }
    }
    (ids, lengths)
}

/// Inverse of pad_sequences: recover each column's prefix.
pub fn strip_padding(ids: &[i32], lengths: &[usize]) -> Vec<Vec<u32>> {
    let batch = lengths.len();
    lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| (0..len).map(|t| ids[t * batch + i] as u32).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token_pair::EOS_ID;
    use burn::backend::NdArray;
    use proptest::prelude::*;

    type B = NdArray;

    fn sequences() -> impl Strategy<Value = Vec<Vec<u32>>> {
        proptest::collection::vec(
            proptest::collection::vec(3u32..60, 0..9).prop_map(|mut v| {
                v.push(EOS_ID);
                v
            }),
            1..7,
        )
    }

    #[test]
    fn test_batch_shapes_follow_longest_sequence() {
        let batcher = PadAndStack::<B>::new(Default::default());
        let batch = batcher.batch(vec![
            TokenPair::new(vec![5, 6, EOS_ID], vec![7, EOS_ID]),
            TokenPair::new(vec![8, EOS_ID], vec![9, 10, 11, 12, EOS_ID]),
        ]);
        assert_eq!(batch.size(), 2);
        assert_eq!(batch.source.data.dims(), [3, 2]);
        assert_eq!(batch.target.data.dims(), [5, 2]);
        assert_eq!(batch.source.host_lengths, vec![3, 2]);

        let src: Vec<i64> = batch.source.data.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(src, vec![5, 8, 6, EOS_ID as i64, EOS_ID as i64, 0]);
    }

    proptest! {
        #[test]
        fn prop_mask_sum_equals_lengths(seqs in sequences()) {
            let batch = PadAndStack::<B>::new(Default::default())
                .stack(&seqs);
            let counts: Vec<i64> = batch.mask.int().sum_dim(0)
                .into_data().convert::<i64>().to_vec().unwrap();
            let lengths: Vec<i64> = batch.lengths.into_data().convert::<i64>().to_vec().unwrap();
            prop_assert_eq!(&counts, &lengths);
            let expected: Vec<i64> = seqs.iter().map(|s| s.len() as i64).collect();
            prop_assert_eq!(lengths, expected);
        }

        #[test]
        fn prop_strip_padding_recovers_sequences(seqs in sequences()) {
            let (ids, lengths) = pad_sequences(&seqs);
            prop_assert_eq!(strip_padding(&ids, &lengths), seqs);
        }
    }
}
