// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from two aligned plain-text
// corpora all the way to padded, masked tensor batches.
//
// The pipeline flows in this order:
//
//   source.txt / target.txt
//       │
//       ▼
//   ParallelCorpus      → reads both files line by line, in lock step
//       │
//       ▼
//   MaxiBatch           → encodes a window of pairs, sorts by length
//       │
//       ▼
//   TranslationDataset  → cuts minibatches, signals end of epoch
//       │
//       ▼
//   EpochPrefetcher     → runs the above one batch ahead on a worker
//       │
//       ▼
//   PadAndStack         → pads and stacks into MaskedData tensors
//
// Everything up to the prefetcher works on plain token ids and
// is testable without a tensor backend.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Two line-aligned corpus files read in lock step
pub mod corpus;

/// Bounded read-ahead buffer with optional length sort
pub mod maxibatch;

/// Minibatch driver over a corpus pair
pub mod dataset;

/// Background worker that reads one minibatch ahead
pub mod prefetch;

/// Pads token-id sequences into time-major tensor batches
pub mod batcher;
