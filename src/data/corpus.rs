// ============================================================
// Layer 4 — Parallel Corpus Reader
// ============================================================
// Streams two line-aligned plain-text files in lock step:
// line i of the source file is the translation of line i of
// the target file.
//
// Alignment is checked twice:
//   1. open()      — both files are counted once; differing line
//                    counts are a fatal configuration error
//   2. next_pair() — if one file still ends before the other
//                    (the file changed after open) reading fails
//
// reset() reopens both files so the next epoch starts at line 0.

use std::{
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::{Path, PathBuf},
};

use crate::domain::error::{NmtError, Result};

pub struct ParallelCorpus {
    source_path: PathBuf,
    target_path: PathBuf,
    source:      Lines<BufReader<File>>,
    target:      Lines<BufReader<File>>,
    /// Number of aligned lines in each file, counted at open()
    line_count:  usize,
    /// Number of line pairs handed out in the current epoch
    position:    usize,
    exhausted:   bool,
}

impl ParallelCorpus {
    /// Open both files and verify that they have the same number of lines.
    pub fn open(source_path: impl AsRef<Path>, target_path: impl AsRef<Path>) -> Result<Self> {
        let source_path = source_path.as_ref().to_path_buf();
        let target_path = target_path.as_ref().to_path_buf();

        let source_lines = count_lines(&source_path)?;
        let target_lines = count_lines(&target_path)?;
        if source_lines != target_lines {
            return Err(NmtError::CorpusMismatch {
                source_path,
                target_path,
                source_lines,
                target_lines,
            });
        }

        tracing::debug!(
            "Opened parallel corpus '{}' / '{}' ({} lines)",
            source_path.display(),
            target_path.display(),
            source_lines
        );

        Ok(Self {
            source:     open_lines(&source_path)?,
            target:     open_lines(&target_path)?,
            source_path,
            target_path,
            line_count: source_lines,
            position:   0,
            exhausted:  false,
        })
    }

    /// Read the next aligned line pair, or None once both files are done.
    pub fn next_pair(&mut self) -> Result<Option<(String, String)>> {
        if self.exhausted {
            return Ok(None);
        }
        let src = self.source.next().transpose().map_err(|e| self.io_error(true, e))?;
        let trg = self.target.next().transpose().map_err(|e| self.io_error(false, e))?;
        match (src, trg) {
            (Some(s), Some(t)) => {
                self.position += 1;
                Ok(Some((s, t)))
            }
            (None, None) => {
                self.exhausted = true;
                Ok(None)
            }
            _ => Err(NmtError::CorpusDiverged { line: self.position + 1 }),
        }
    }

    /// True once both files have been read to the end in this epoch.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Rewind both files to their first line.
    pub fn reset(&mut self) -> Result<()> {
        self.source    = open_lines(&self.source_path)?;
        self.target    = open_lines(&self.target_path)?;
        self.position  = 0;
        self.exhausted = false;
        Ok(())
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Line pairs read so far in the current epoch
    pub fn position(&self) -> usize {
        self.position
    }

    fn io_error(&self, source_side: bool, source: std::io::Error) -> NmtError {
        let path = if source_side { &self.source_path } else { &self.target_path };
        NmtError::Io { path: path.clone(), source }
    }
}

fn open_lines(path: &Path) -> Result<Lines<BufReader<File>>> {
    let file = File::open(path).map_err(|source| NmtError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file).lines())
}

fn count_lines(path: &Path) -> Result<usize> {
    let mut count = 0usize;
    for line in open_lines(path)? {
        line.map_err(|source| NmtError::Io { path: path.to_path_buf(), source })?;
        count += 1;
    }
    Ok(count)
}
