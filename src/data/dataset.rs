// ============================================================
// Layer 4 — Translation Dataset (minibatch driver)
// ============================================================
// Streams minibatches of encoded (source, target) pairs out of
// a ParallelCorpus through a MaxiBatch read-ahead buffer.
//
//   get_batch(n)
//       │   buffer empty and corpus not exhausted?
//       ├──────────────► MaxiBatch::fill  (exactly one refill)
//       ▼
//   MaxiBatch::pop × n  → Vec<TokenPair>
//
// get_batch returns Ok(None) once the buffer is empty and the
// corpus is exhausted: that is the end of the epoch. reset()
// rewinds the corpus for the next one. Pairs come out in the
// same order every epoch (no shuffling).
//
// The dataset deals in raw token ids only. Padding and tensor
// construction happen in the batcher, on the training thread.

use std::path::Path;

use crate::data::{corpus::ParallelCorpus, maxibatch::MaxiBatch};
use crate::domain::{
    error::{NmtError, Result},
    token_pair::{SortKey, TokenPair},
    traits::SentenceEncoder,
};

/// Knobs of the two-level batching pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DatasetOptions {
    /// Minibatches buffered per maxibatch
    pub maxibatch_size: usize,
    /// Length key used to sort each maxibatch
    pub sort:           SortKey,
    /// Sequences longer than this are cropped
    pub max_length:     usize,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self { maxibatch_size: 1, sort: SortKey::None, max_length: 100 }
    }
}

pub struct TranslationDataset<E: SentenceEncoder> {
    corpus:         ParallelCorpus,
    source_encoder: E,
    target_encoder: E,
    maxi_batch:     MaxiBatch,
    max_length:     usize,
}

impl<E: SentenceEncoder> TranslationDataset<E> {
    pub fn open(
        source_path:    impl AsRef<Path>,
        target_path:    impl AsRef<Path>,
        source_encoder: E,
        target_encoder: E,
        options:        DatasetOptions,
    ) -> Result<Self> {
        if options.max_length == 0 {
            return Err(NmtError::config("max_length must be at least 1"));
        }
        let corpus = ParallelCorpus::open(source_path, target_path)?;
        Ok(Self {
            corpus,
            source_encoder,
            target_encoder,
            maxi_batch: MaxiBatch::new(options.maxibatch_size, options.sort),
            max_length: options.max_length,
        })
    }

    /// Up to `batch_size` pairs, or None at the end of the epoch.
    pub fn get_batch(&mut self, batch_size: usize) -> Result<Option<Vec<TokenPair>>> {
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match self.next_pair(batch_size)? {
                Some(pair) => batch.push(pair),
                None => break,
            }
        }
        if batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(batch))
    }

    /// Rewind the corpus and drop anything still buffered.
    pub fn reset(&mut self) -> Result<()> {
        self.maxi_batch.clear();
        self.corpus.reset()
    }

    /// Number of aligned sentence pairs in the corpus.
    pub fn sentence_count(&self) -> usize {
        self.corpus.line_count()
    }

    pub fn source_vocab_size(&self) -> usize {
        self.source_encoder.vocab_size()
    }

    pub fn target_vocab_size(&self) -> usize {
        self.target_encoder.vocab_size()
    }

    pub(crate) fn maxi_batch(&self) -> &MaxiBatch {
        &self.maxi_batch
    }

    // Pop one pair, refilling the maxibatch first if it ran dry.
    fn next_pair(&mut self, minibatch_size: usize) -> Result<Option<TokenPair>> {
        if self.maxi_batch.is_empty() && !self.corpus.is_exhausted() {
            let Self { corpus, source_encoder, target_encoder, maxi_batch, max_length } = self;
            let mut line = corpus.position();
            let max_length = *max_length;
            maxi_batch.fill(corpus, minibatch_size, |src, trg| {
                line += 1;
                let source = encode_cropped(&*source_encoder, src, max_length, line)?;
                let target = encode_cropped(&*target_encoder, trg, max_length, line)?;
                Ok(TokenPair::new(source, target))
            })?;
        }
        Ok(self.maxi_batch.pop())
    }
}

fn encode_cropped<E: SentenceEncoder>(
    encoder:    &E,
    line_text:  &str,
    max_length: usize,
    line:       usize,
) -> Result<Vec<u32>> {
    let mut ids = encoder.encode(line_text).map_err(|e| match e {
        NmtError::Encode { message, .. } => NmtError::Encode { line, message },
        other => other,
    })?;
    ids.truncate(max_length);
    Ok(ids)
}
