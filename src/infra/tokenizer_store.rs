// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// One vocabulary model per language side, stored as a
// HuggingFace tokenizer JSON file. If the file exists it is
// loaded; otherwise a word-level vocabulary is built from that
// side's training corpus and written there first.
//
// In tokenizers 0.15, train_from_files requires Trainer::Model
// to equal ModelWrapper. The tokenizer JSON is therefore built
// by hand and loaded back with Tokenizer::from_file, which
// sidesteps the trainer type mismatch entirely.
//
// Fixed special ids, shared with the rest of the crate:
//   <pad> = 0, <unk> = 1, </s> = 2
//
// Reference: HuggingFace tokenizers (WordLevel model)

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use tokenizers::Tokenizer;

use crate::domain::{
    error::{NmtError, Result},
    token_pair::{EOS_ID, PAD_ID, UNK_ID},
    traits::SentenceEncoder,
};

const PAD_TOKEN: &str = "<pad>";
const UNK_TOKEN: &str = "<unk>";
const EOS_TOKEN: &str = "</s>";
const SPECIAL_TOKENS: usize = 3;

// ─── Vocabulary ───────────────────────────────────────────────────────────────
/// A loaded tokenizer plus the per-side encoding options.
pub struct Vocabulary {
    tokenizer: Tokenizer,
    /// Reverse the token order before appending </s>
    reverse:   bool,
}

impl Vocabulary {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer, reverse: false }
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

impl SentenceEncoder for Vocabulary {
    fn encode(&self, line: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(line, false)
            .map_err(|e| NmtError::Encode { line: 0, message: e.to_string() })?;

        // A literal "<pad>" in the text must not turn into padding
        let mut ids: Vec<u32> = encoding
            .get_ids()
            .iter()
            .map(|&id| if id == PAD_ID { UNK_ID } else { id })
            .collect();
        if self.reverse {
            ids.reverse();
        }
        ids.push(EOS_ID);
        Ok(ids)
    }

    fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

// ─── TokenizerStore ───────────────────────────────────────────────────────────
pub struct TokenizerStore {
    model_path: PathBuf,
}

impl TokenizerStore {
    pub fn new(model_path: impl AsRef<Path>) -> Self {
        Self { model_path: model_path.as_ref().to_path_buf() }
    }

    /// Load the vocabulary model, building it from `corpus_path` first if
    /// it does not exist yet. `vocab_size` counts the special tokens.
    pub fn train_or_load(&self, corpus_path: impl AsRef<Path>, vocab_size: usize) -> Result<Vocabulary> {
        if self.model_path.exists() {
            tracing::info!("Loading vocabulary from '{}'", self.model_path.display());
        } else {
            tracing::info!(
                "Vocabulary '{}' not found, building it from '{}' (vocab_size={})",
                self.model_path.display(),
                corpus_path.as_ref().display(),
                vocab_size
            );
            self.build_and_save(corpus_path.as_ref(), vocab_size)?;
        }
        self.load()
    }

    /// Load a previously saved tokenizer JSON.
    pub fn load(&self) -> Result<Vocabulary> {
        let tokenizer = Tokenizer::from_file(&self.model_path).map_err(|e| self.error(e))?;

        for (token, id) in [(PAD_TOKEN, PAD_ID), (UNK_TOKEN, UNK_ID), (EOS_TOKEN, EOS_ID)] {
            if tokenizer.token_to_id(token) != Some(id) {
                return Err(self.error(format!("special token {token} must have id {id}")));
            }
        }
        Ok(Vocabulary::new(tokenizer))
    }

    /// Count whitespace-separated words in the corpus, keep the most
    /// frequent ones and write a WordLevel tokenizer JSON.
    fn build_and_save(&self, corpus_path: &Path, vocab_size: usize) -> Result<()> {
        if vocab_size <= SPECIAL_TOKENS {
            return Err(self.error(format!(
                "vocab_size {vocab_size} leaves no room beyond the {SPECIAL_TOKENS} special tokens"
            )));
        }

        // ── Step 1: word frequencies ──────────────────────────────────────────
        let io = |source| NmtError::Io { path: corpus_path.to_path_buf(), source };
        let file = File::open(corpus_path).map_err(io)?;
        let mut freq: HashMap<String, usize> = HashMap::new();
        for line in BufReader::new(file).lines() {
            for word in line.map_err(io)?.split_whitespace() {
                *freq.entry(word.to_string()).or_insert(0) += 1;
            }
        }

        // Most frequent first; ties broken alphabetically so rebuilds match
        let mut words: Vec<(String, usize)> = freq
            .into_iter()
            .filter(|(w, _)| ![PAD_TOKEN, UNK_TOKEN, EOS_TOKEN].contains(&w.as_str()))
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size - SPECIAL_TOKENS);

        // ── Step 2: vocab JSON ────────────────────────────────────────────────
        let mut vocab = serde_json::Map::new();
        for (token, id) in [(PAD_TOKEN, PAD_ID), (UNK_TOKEN, UNK_ID), (EOS_TOKEN, EOS_ID)] {
            vocab.insert(token.to_string(), serde_json::json!(id));
        }
        for (id, (word, _)) in words.iter().enumerate() {
            vocab.insert(word.clone(), serde_json::json!(SPECIAL_TOKENS + id));
        }

        // ── Step 3: tokenizer JSON in HuggingFace format ──────────────────────
        let special = |id: u32, content: &str| {
            serde_json::json!({
                "id": id, "content": content, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            })
        };
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                special(PAD_ID, PAD_TOKEN),
                special(UNK_ID, UNK_TOKEN),
                special(EOS_ID, EOS_TOKEN),
            ],
            "normalizer": null,
            "pre_tokenizer": { "type": "WhitespaceSplit" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        if let Some(dir) = self.model_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|source| NmtError::Io { path: dir.to_path_buf(), source })?;
        }
        let text = serde_json::to_string_pretty(&tokenizer_json).map_err(|e| self.error(e))?;
        std::fs::write(&self.model_path, text)
            .map_err(|source| NmtError::Io { path: self.model_path.clone(), source })?;

        tracing::info!(
            "Vocabulary built with {} entries, saved to '{}'",
            words.len() + SPECIAL_TOKENS,
            self.model_path.display()
        );
        Ok(())
    }

    fn error(&self, message: impl ToString) -> NmtError {
        NmtError::Vocabulary { path: self.model_path.clone(), message: message.to_string() }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::corpus::tests::write_lines;

    #[test]
    fn test_builds_then_reloads_same_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_lines(&["the cat sat", "the dog sat", "the end"]);
        let store = TokenizerStore::new(dir.path().join("src.vocab.json"));

        let built = store.train_or_load(corpus.path(), 50).unwrap();
        // 3 specials + 5 distinct words
        assert_eq!(built.vocab_size(), 8);
        let first = built.encode("the cat").unwrap();

        // Second call loads the file instead of rebuilding
        let loaded = store.train_or_load("/no/such/corpus.txt", 50).unwrap();
        assert_eq!(loaded.encode("the cat").unwrap(), first);
        // "the" is the most frequent word
        assert_eq!(first[0], 3);
        assert_eq!(*first.last().unwrap(), EOS_ID);
    }

    #[test]
    fn test_vocab_size_caps_word_count_and_unknowns_map_to_unk() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_lines(&["a a a b b c"]);
        let store = TokenizerStore::new(dir.path().join("v.json"));
        let vocab = store.train_or_load(corpus.path(), 5).unwrap();
        assert_eq!(vocab.vocab_size(), 5);
        assert_eq!(vocab.encode("a b c zebra").unwrap(), vec![3, 4, UNK_ID, UNK_ID, EOS_ID]);
    }

    #[test]
    fn test_reverse_keeps_eos_last() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_lines(&["x y y z z z"]);
        let vocab = TokenizerStore::new(dir.path().join("v.json"))
            .train_or_load(corpus.path(), 10)
            .unwrap()
            .with_reverse(true);
        // z=3, y=4, x=5
        assert_eq!(vocab.encode("x y z").unwrap(), vec![3, 4, 5, EOS_ID]);
    }

    #[test]
    fn test_empty_line_encodes_to_eos_only() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = write_lines(&["hello"]);
        let vocab = TokenizerStore::new(dir.path().join("v.json"))
            .train_or_load(corpus.path(), 10)
            .unwrap();
        assert_eq!(vocab.encode("").unwrap(), vec![EOS_ID]);
        assert!(!vocab.encode("<pad>").unwrap().contains(&PAD_ID));
    }

    #[test]
    fn test_broken_model_file_is_vocabulary_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = TokenizerStore::new(&path).load().err().unwrap();
        assert!(matches!(err, NmtError::Vocabulary { .. }));
    }

    #[test]
    fn test_missing_corpus_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path().join("v.json"));
        let err = store.train_or_load("/no/such/corpus.txt", 10).err().unwrap();
        assert!(matches!(err, NmtError::Io { .. }));
    }
}
