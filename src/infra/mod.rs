// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Concerns that touch the filesystem on behalf of other layers:
//
//   tokenizer_store.rs — Vocabulary persistence
//                        Builds a word-level vocabulary from one
//                        side of the corpus if none exists, or
//                        loads a previously saved one, so every
//                        run of an experiment shares the same ids.
//
//   metrics.rs         — Progress logging
//                        Appends the periodic progress rows
//                        (updates, sentences, throughput, loss)
//                        to a CSV file for later plotting.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling)

/// Vocabulary building, saving, and loading
pub mod tokenizer_store;

/// Training progress CSV logger
pub mod metrics;
