// ============================================================
// Layer 4 — Epoch Prefetcher
// ============================================================
// Reads and encodes the next minibatch on a worker thread while
// the training thread runs the current step.
//
//   worker thread                      training thread
//   ─────────────                      ───────────────
//   dataset.get_batch(n) ──► channel(1) ──► next()
//           ...                              PadAndStack + to_device
//   None → drop sender, return dataset       finish() → dataset
//
// The channel holds one finished batch and the worker may hold a
// second while it blocks on send, so it is never more than two
// minibatches ahead. Batches arrive in exactly
// the order get_batch produces them. Tensors are built on the
// training thread only; the worker hands over plain token ids.
//
// Reference: Rust Book §16 (Fearless Concurrency: channels)

use std::{
    sync::mpsc::{sync_channel, Receiver},
    thread::JoinHandle,
};

use crate::data::dataset::TranslationDataset;
use crate::domain::{
    error::{NmtError, Result},
    token_pair::TokenPair,
    traits::SentenceEncoder,
};

pub struct EpochPrefetcher<E: SentenceEncoder + 'static> {
    receiver: Receiver<Result<Vec<TokenPair>>>,
    worker:   JoinHandle<TranslationDataset<E>>,
}

impl<E: SentenceEncoder + 'static> EpochPrefetcher<E> {
    /// Start streaming one epoch of `dataset` in minibatches of `batch_size`.
    pub fn spawn(mut dataset: TranslationDataset<E>, batch_size: usize) -> Self {
        let (sender, receiver) = sync_channel(1);
        let worker = std::thread::spawn(move || {
            loop {
                match dataset.get_batch(batch_size) {
                    Ok(Some(batch)) => {
                        if sender.send(Ok(batch)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = sender.send(Err(e));
                        break;
                    }
                }
            }
            dataset
        });
        Self { receiver, worker }
    }

    /// Wait for the worker and take the dataset back, ready for reset().
    pub fn finish(self) -> Result<TranslationDataset<E>> {
        // Dropping the receiver unblocks a worker stuck on send
        drop(self.receiver);
        self.worker.join().map_err(|_| NmtError::Worker)
    }
}

impl<E: SentenceEncoder + 'static> Iterator for EpochPrefetcher<E> {
    type Item = Result<Vec<TokenPair>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{
        tests::{corpus_files, open_dataset},
        DatasetOptions,
    };
    use crate::domain::token_pair::SortKey;

    #[test]
    fn test_prefetched_batches_match_direct_reads() {
        let files = corpus_files(
            &["a b", "c", "d e f", "g", "h i", "j k l m", "n"],
            &["1", "2 2", "3", "4 4 4", "5", "6", "7 7"],
        );
        let options = DatasetOptions { maxibatch_size: 2, sort: SortKey::Source, max_length: 50 };

        let mut direct = open_dataset(&files, options);
        let expected: Vec<Vec<TokenPair>> =
            std::iter::from_fn(|| direct.get_batch(2).unwrap()).collect();

        let mut prefetcher = EpochPrefetcher::spawn(open_dataset(&files, options), 2);
        let got: Vec<Vec<TokenPair>> = prefetcher.by_ref().map(|b| b.unwrap()).collect();
        assert_eq!(got, expected);

        // The returned dataset can run a second, identical epoch
        let mut dataset = prefetcher.finish().unwrap();
        dataset.reset().unwrap();
        let again: Vec<Vec<TokenPair>> = EpochPrefetcher::spawn(dataset, 2)
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(again, expected);
    }

    #[test]
    fn test_finish_before_draining_does_not_hang() {
        let lines: Vec<String> = (0..40).map(|i| format!("w{i}")).collect();
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let files = corpus_files(&refs, &refs);
        let mut prefetcher = EpochPrefetcher::spawn(open_dataset(&files, Default::default()), 1);
        assert!(prefetcher.next().is_some());
        assert!(prefetcher.finish().is_ok());
    }

    /// Counts encoded lines so the test can see how far the worker ran.
    struct CountingEncoder {
        lines: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl SentenceEncoder for CountingEncoder {
        fn encode(&self, line: &str) -> Result<Vec<u32>> {
            self.lines.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![line.len() as u32 + 3, crate::domain::token_pair::EOS_ID])
        }

        fn vocab_size(&self) -> usize {
            64
        }
    }

    #[test]
    fn test_worker_runs_at_most_two_batches_ahead() {
        use std::{sync::atomic::Ordering, time::Duration};

        let lines: Vec<String> = (0..20).map(|i| format!("w{i}")).collect();
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let files = corpus_files(&refs, &refs);
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let encoder = || CountingEncoder { lines: counter.clone() };
        let options = DatasetOptions { maxibatch_size: 1, sort: SortKey::None, max_length: 50 };
        let dataset =
            TranslationDataset::open(files.0.path(), files.1.path(), encoder(), encoder(), options)
                .unwrap();

        // Each pair encodes two lines; batch size 1 means one pair per batch
        let pairs_read = || counter.load(Ordering::SeqCst) / 2;
        let mut prefetcher = EpochPrefetcher::spawn(dataset, 1);
        std::thread::sleep(Duration::from_millis(100));
        assert!(pairs_read() <= 2, "worker read {} batches ahead", pairs_read());

        assert!(prefetcher.next().is_some());
        std::thread::sleep(Duration::from_millis(100));
        assert!(pairs_read() <= 3);
        assert!(prefetcher.finish().is_ok());
    }
}
