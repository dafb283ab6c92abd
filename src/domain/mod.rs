// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits shared by every other
// layer of the trainer.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, traits and the error type
//
// Reference: Rust Book §5 (Structs), §9 (Error Handling), §10 (Traits)

// The error taxonomy used by the data, ml and infra layers
pub mod error;

// A (source, target) pair of token-id sequences and the sort key
pub mod token_pair;

// Core abstractions (traits) that other layers implement
pub mod traits;
