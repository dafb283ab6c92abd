// ============================================================
// Layer 3 — TokenPair Domain Type
// ============================================================
// One training example as it sits in the maxibatch buffer:
// the token ids of a source sentence and of its translation.
//
// Token id conventions shared by every vocabulary:
//   0 = <pad>  (never produced by encoding, only by padding)
//   1 = <unk>
//   2 = </s>   (appended to every encoded sentence)

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::NmtError;

pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;
pub const EOS_ID: u32 = 2;

/// A (source, target) pair of token-id sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub source: Vec<u32>,
    pub target: Vec<u32>,
}

impl TokenPair {
    pub fn new(source: Vec<u32>, target: Vec<u32>) -> Self {
        Self { source, target }
    }

    /// Length used to order this pair inside a maxibatch.
    /// `None` for SortKey::None, since no ordering is applied.
    pub fn sort_len(&self, key: SortKey) -> Option<usize> {
        match key {
            SortKey::None   => None,
            SortKey::Source => Some(self.source.len()),
            SortKey::Target => Some(self.target.len()),
        }
    }
}

// ─── SortKey ──────────────────────────────────────────────────────────────────
/// Which side's length orders the maxibatch before draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    None,
    Source,
    Target,
}

impl FromStr for SortKey {
    type Err = NmtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none"   => Ok(Self::None),
            "source" | "src" => Ok(Self::Source),
            "target" | "trg" => Ok(Self::Target),
            other => Err(NmtError::config(format!(
                "unknown maxibatch sort key '{other}' (expected none, source or target)"
            ))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None   => "none",
            Self::Source => "source",
            Self::Target => "target",
        };
        f.write_str(name)
    }
}
