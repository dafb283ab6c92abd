// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row every time the trainer displays progress
// (every `disp_freq` updates).
//
// Output file: <output_dir>/metrics.csv
//
// Example CSV output:
//   epoch,updates,sentences,sentences_per_sec,loss
//   1,100,3200,812.40,6.912345
//   1,200,6400,830.15,6.455012
//   ...
//
// How to read the metrics:
//   - loss is the mean cross-entropy per real target token of
//     the last minibatch before the row was written
//   - sentences is cumulative over the whole run, not per epoch
//   - sentences_per_sec covers only the interval since the
//     previous row
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::{NmtError, Result};

const HEADER: &str = "epoch,updates,sentences,sentences_per_sec,loss";

/// One progress row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressMetrics {
    pub epoch:             usize,
    /// Optimizer steps taken since the start of the run
    pub updates:           usize,
    /// Sentence pairs trained on since the start of the run
    pub sentences:         usize,
    pub sentences_per_sec: f64,
    pub loss:              f64,
}

/// Appends progress rows to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create `dir` if needed and write the CSV header if the file is new,
    /// so repeated runs append to the same log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path).map_err(|e| io_error(&csv_path, e))?;
            writeln!(f, "{HEADER}").map_err(|e| io_error(&csv_path, e))?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &ProgressMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .map_err(|e| io_error(&self.csv_path, e))?;

        writeln!(
            f,
            "{},{},{},{:.2},{:.6}",
            m.epoch, m.updates, m.sentences, m.sentences_per_sec, m.loss,
        )
        .map_err(|e| io_error(&self.csv_path, e))?;

        tracing::debug!("Logged metrics at update {}: loss={:.4}", m.updates, m.loss);
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

fn io_error(path: &Path, source: std::io::Error) -> NmtError {
    NmtError::Io { path: path.to_path_buf(), source }
}
