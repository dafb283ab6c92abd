// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure the core can report. The application and CLI
// layers wrap these in anyhow::Error with extra context; the
// lower layers return them directly.
//
// Categories:
//   Config         — invalid dimension or option combinations,
//                    detected before any training step runs
//   Vocabulary     — a vocabulary model cannot be built or loaded
//   Io / Corpus*   — unreadable or misaligned training corpora
//   Encode         — the tokenizer rejected a line
//   Shape          — a precondition of the recurrent stack was
//                    violated while stepping
//   NonFiniteLoss  — the loss became NaN or infinite
//   Worker         — the prefetch thread died
//
// None of these are retried: a run either completes or aborts.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NmtError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Vocabulary model '{path}': {message}")]
    Vocabulary { path: PathBuf, message: String },

    #[error("Cannot read '{path}': {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Corpora are not line-aligned: '{source_path}' has {source_lines} lines, \
         '{target_path}' has {target_lines}"
    )]
    CorpusMismatch {
        source_path:  PathBuf,
        target_path:  PathBuf,
        source_lines: usize,
        target_lines: usize,
    },

    #[error("Corpora diverged at line {line}: one file ended before the other")]
    CorpusDiverged { line: usize },

    #[error("Cannot encode line {line}: {message}")]
    Encode { line: usize, message: String },

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Non-finite loss {loss} at update {update}")]
    NonFiniteLoss { update: usize, loss: f64 },

    #[error("Prefetch worker terminated unexpectedly")]
    Worker,
}

impl NmtError {
    /// Shorthand used by config validation.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Shorthand used by the recurrent stack.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }
}

/// Result type for the core layers
pub type Result<T, E = NmtError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_message_names_both_files() {
        let err = NmtError::CorpusMismatch {
            source_path:  "train.de".into(),
            target_path:  "train.en".into(),
            source_lines: 3,
            target_lines: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("train.de"));
        assert!(msg.contains("train.en"));
        assert!(msg.contains("3 lines"));
    }

    #[test]
    fn test_io_error_exposes_source() {
        use std::error::Error;
        let err = NmtError::Io {
            path:   "missing.txt".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn test_result_alias_accepts_an_explicit_error_type() {
        fn depth(text: &str) -> Result<usize, std::num::ParseIntError> {
            text.parse()
        }
        fn checked(text: &str) -> Result<usize> {
            depth(text).map_err(|e| NmtError::config(e.to_string()))
        }
        assert_eq!(depth("3"), Ok(3));
        assert!(matches!(checked("x"), Err(NmtError::Config(_))));
    }
}
