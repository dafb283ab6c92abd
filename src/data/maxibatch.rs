// ============================================================
// Layer 4 — MaxiBatch Read-Ahead Buffer
// ============================================================
// Holds several minibatches' worth of encoded line pairs so
// that they can be ordered by length before being cut into
// minibatches. Sorting inside a bounded window keeps memory
// bounded on corpora of any size while still grouping
// similar lengths together (less padding per minibatch).
//
// Life cycle of one buffer load:
//
//   filling   → read + encode line pairs until the buffer holds
//               maxibatch_size × minibatch_size entries or the
//               corpus is exhausted
//   sorted    → one stable sort by source/target length
//               (skipped for SortKey::None)
//   draining  → pop() hands entries out front to back
//
// The buffer is only ever refilled once it is completely empty.

use std::collections::VecDeque;

use crate::data::corpus::ParallelCorpus;
use crate::domain::{
    error::Result,
    token_pair::{SortKey, TokenPair},
};

pub struct MaxiBatch {
    buffer:         VecDeque<TokenPair>,
    maxibatch_size: usize,
    sort:           SortKey,
    /// Number of completed fill() calls, for diagnostics and tests
    fills:          usize,
}

impl MaxiBatch {
    /// `maxibatch_size` is the number of minibatches read ahead.
    pub fn new(maxibatch_size: usize, sort: SortKey) -> Self {
        Self {
            buffer: VecDeque::new(),
            maxibatch_size: maxibatch_size.max(1),
            sort,
            fills: 0,
        }
    }

    /// Maximum number of entries one fill may buffer.
    pub fn capacity(&self, minibatch_size: usize) -> usize {
        self.maxibatch_size * minibatch_size.max(1)
    }

    /// Read and encode line pairs from `corpus` until the buffer is full
    /// or the corpus is exhausted, then sort the window.
    ///
    /// `encode_pair` turns a raw (source, target) line pair into ids.
    pub fn fill<F>(
        &mut self,
        corpus:         &mut ParallelCorpus,
        minibatch_size: usize,
        mut encode_pair: F,
    ) -> Result<()>
    where
        F: FnMut(&str, &str) -> Result<TokenPair>,
    {
        let capacity = self.capacity(minibatch_size);
        while self.buffer.len() < capacity {
            match corpus.next_pair()? {
                Some((src, trg)) => self.buffer.push_back(encode_pair(&src, &trg)?),
                None => break,
            }
        }
        self.sort();
        self.fills += 1;

        tracing::debug!(
            "Maxibatch fill #{}: {} pairs buffered (capacity {}, sort={})",
            self.fills,
            self.buffer.len(),
            capacity,
            self.sort
        );
        Ok(())
    }

    /// Take the next entry, front first.
    pub fn pop(&mut self) -> Option<TokenPair> {
        self.buffer.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn fills(&self) -> usize {
        self.fills
    }

    /// Drop anything still buffered (used when an epoch is reset).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    // sort_by_key on a slice is stable: equal lengths keep corpus order.
    fn sort(&mut self) {
        let key = self.sort;
        if key == SortKey::None {
            return;
        }
        self.buffer
            .make_contiguous()
            .sort_by_key(|pair| pair.sort_len(key).unwrap_or(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::corpus::tests::write_lines;
    use crate::domain::token_pair::EOS_ID;

    /// One id per whitespace-separated word, plus EOS
    fn encode_words(src: &str, trg: &str) -> Result<TokenPair> {
        let ids = |s: &str| {
            let mut v: Vec<u32> = s.split_whitespace().map(|w| w.len() as u32 + 10).collect();
            v.push(EOS_ID);
            v
        };
        Ok(TokenPair::new(ids(src), ids(trg)))
    }

    #[test]
    fn test_fill_stops_at_capacity() {
        let lines: Vec<String> = (0..10).map(|i| format!("w{i}")).collect();
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let src = write_lines(&refs);
        let trg = write_lines(&refs);
        let mut corpus = ParallelCorpus::open(src.path(), trg.path()).unwrap();

        let mut maxi = MaxiBatch::new(2, SortKey::None);
        maxi.fill(&mut corpus, 3, encode_words).unwrap();
        assert_eq!(maxi.len(), 6);
        assert_eq!(maxi.capacity(3), 6);
        assert!(!corpus.is_exhausted());
    }

    #[test]
    fn test_fill_stops_at_end_of_corpus() {
        let src = write_lines(&["a", "b"]);
        let trg = write_lines(&["x", "y"]);
        let mut corpus = ParallelCorpus::open(src.path(), trg.path()).unwrap();

        let mut maxi = MaxiBatch::new(10, SortKey::None);
        maxi.fill(&mut corpus, 4, encode_words).unwrap();
        assert_eq!(maxi.len(), 2);
        assert!(corpus.is_exhausted());
        assert_eq!(maxi.fills(), 1);
    }

    #[test]
    fn test_source_sort_is_ascending_and_stable() {
        let src = write_lines(&["a b c", "d", "e f", "g"]);
        let trg = write_lines(&["1", "2", "3", "4"]);
        let mut corpus = ParallelCorpus::open(src.path(), trg.path()).unwrap();

        let mut maxi = MaxiBatch::new(1, SortKey::Source);
        maxi.fill(&mut corpus, 4, |s, t| {
            let mut pair = encode_words(s, t)?;
            // Tag the target with the corpus line so order can be checked
            pair.target = vec![t.parse::<u32>().unwrap()];
            Ok(pair)
        })
        .unwrap();

        let order: Vec<u32> = std::iter::from_fn(|| maxi.pop()).map(|p| p.target[0]).collect();
        // "d" (line 2) and "g" (line 4) tie on length and keep corpus order
        assert_eq!(order, vec![2, 4, 3, 1]);
    }

    #[test]
    fn test_unsorted_buffer_is_fifo() {
        let src = write_lines(&["a b c", "d"]);
        let trg = write_lines(&["x", "y"]);
        let mut corpus = ParallelCorpus::open(src.path(), trg.path()).unwrap();

        let mut maxi = MaxiBatch::new(1, SortKey::None);
        maxi.fill(&mut corpus, 2, encode_words).unwrap();
        assert_eq!(maxi.pop().unwrap().source.len(), 4);
        assert_eq!(maxi.pop().unwrap().source.len(), 2);
        assert!(maxi.pop().is_none());
    }

    #[test]
    fn test_encode_error_propagates() {
        let src = write_lines(&["a"]);
        let trg = write_lines(&["x"]);
        let mut corpus = ParallelCorpus::open(src.path(), trg.path()).unwrap();
        let mut maxi = MaxiBatch::new(1, SortKey::None);
        let result = maxi.fill(&mut corpus, 1, |_, _| {
            Err(crate::domain::error::NmtError::Encode { line: 1, message: "bad".into() })
        });
        assert!(result.is_err());
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(24))]

        #[test]
        fn prop_fills_never_exceed_capacity_and_cover_corpus(
            lines in 1usize..30,
            maxibatch_size in 1usize..4,
            minibatch_size in 1usize..5,
        ) {
            let text: Vec<String> = (0..lines).map(|i| format!("w{i}")).collect();
            let refs: Vec<&str> = text.iter().map(|s| s.as_str()).collect();
            let src = write_lines(&refs);
            let trg = write_lines(&refs);
            let mut corpus = ParallelCorpus::open(src.path(), trg.path()).unwrap();

            let mut maxi = MaxiBatch::new(maxibatch_size, SortKey::Source);
            let capacity = maxi.capacity(minibatch_size);
            let mut seen = 0;
            while !corpus.is_exhausted() {
                maxi.fill(&mut corpus, minibatch_size, encode_words).unwrap();
                proptest::prop_assert!(maxi.len() <= capacity);
                while maxi.pop().is_some() {
                    seen += 1;
                }
            }
            proptest::prop_assert_eq!(seen, lines);
            // The last fill is the one that observes end of file
            proptest::prop_assert_eq!(maxi.fills(), lines / capacity + 1);
        }
    }
}
