//! Tokenizer seam used to measure and bound chunk sizes.

use std::sync::Arc;

use tiktoken_rs::{CoreBPE, cl100k_base};

use crate::types::RagstoreError;

/// Token encode/decode pair used for counting and truncation-point recovery.
///
/// Implementations must be exact inverses over the token sequences they
/// produce: chunkers rely on decode-then-reencode round trips to account for
/// consumed tokens. Tokenization only measures text, it never changes it.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    fn decode(&self, tokens: &[u32]) -> Result<String, RagstoreError>;

    /// Token count of `text`.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// `cl100k_base` BPE adapter, the encoding used by the OpenAI embedding
/// model family. The vocabulary ships with the crate, so construction needs
/// no network access.
#[derive(Clone)]
pub struct Cl100kTokenizer {
    bpe: Arc<CoreBPE>,
}

impl Cl100kTokenizer {
    pub fn new() -> Result<Self, RagstoreError> {
        let bpe = cl100k_base().map_err(|err| {
            RagstoreError::Chunking(format!("failed to load cl100k_base encoding: {err}"))
        })?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, RagstoreError> {
        self.bpe
            .decode(tokens.to_vec())
            .map_err(|err| RagstoreError::Chunking(format!("token decode failed: {err}")))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::Tokenizer;
    use crate::types::RagstoreError;

    /// Word-level tokenizer backed by an interning table. One token per
    /// whitespace-separated word keeps token budgets readable in tests.
    #[derive(Default)]
    pub(crate) struct WordTokenizer {
        words: Mutex<Vec<String>>,
    }

    impl WordTokenizer {
        pub(crate) fn new() -> Self {
            Self::default()
        }
    }

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Vec<u32> {
            let mut table = self.words.lock();
            text.split_whitespace()
                .map(|word| {
                    if let Some(position) = table.iter().position(|known| known == word) {
                        position as u32
                    } else {
                        table.push(word.to_string());
                        (table.len() - 1) as u32
                    }
                })
                .collect()
        }

        fn decode(&self, tokens: &[u32]) -> Result<String, RagstoreError> {
            let table = self.words.lock();
            let words = tokens
                .iter()
                .map(|&token| {
                    table
                        .get(token as usize)
                        .cloned()
                        .ok_or_else(|| RagstoreError::Chunking(format!("unknown token {token}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(words.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cl100k_round_trips_plain_text() {
        let tokenizer = Cl100kTokenizer::new().unwrap();
        let text = "The quick brown fox jumps over the lazy dog.";
        let tokens = tokenizer.encode(text);
        assert!(!tokens.is_empty());
        assert_eq!(tokenizer.decode(&tokens).unwrap(), text);
        assert_eq!(tokenizer.count(text), tokens.len());
    }

    #[test]
    fn word_tokenizer_counts_words() {
        let tokenizer = testing::WordTokenizer::new();
        let tokens = tokenizer.encode("alpha beta gamma");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "alpha beta gamma");
    }
}
