// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The data pipeline only ever talks to a vocabulary through
// SentenceEncoder, so the dataset driver can be exercised with
// any encoder (the tokenizers-backed Vocabulary in production,
// small hand-written encoders in tests).
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use crate::domain::error::Result;

// ─── SentenceEncoder ──────────────────────────────────────────────────────────
/// Turns one raw corpus line into token ids.
///
/// Implementations:
///   - Vocabulary → tokenizers WordLevel model loaded from JSON
///
/// Contract:
///   - the returned sequence ends with EOS_ID
///   - PAD_ID (0) is never returned
///   - every id is < vocab_size()
pub trait SentenceEncoder: Send {
    /// Encode a single line (without its trailing newline).
    fn encode(&self, line: &str) -> Result<Vec<u32>>;

    /// Number of ids this encoder can produce, special tokens included.
    fn vocab_size(&self) -> usize;
}
