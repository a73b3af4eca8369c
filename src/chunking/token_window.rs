//! Punctuation-aware token-window chunking, the strategy of last resort.
//!
//! Knows nothing about sentence structure: it slices the token stream into
//! windows of roughly `chunk_size` tokens and prefers to cut at the last
//! sentence-ending punctuation mark inside each window. The sentence chunker
//! delegates non-prose segments here and uses it as a whole-text fallback
//! when segmentation fails.

use std::sync::Arc;

use crate::config::ChunkConfig;
use crate::types::RagstoreError;

use super::tokenizer::Tokenizer;

/// A chunk of text with its measured token count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPiece {
    pub text: String,
    pub token_count: usize,
}

pub struct TokenWindowChunker {
    tokenizer: Arc<dyn Tokenizer>,
    config: ChunkConfig,
}

impl TokenWindowChunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, config: ChunkConfig) -> Self {
        Self { tokenizer, config }
    }

    /// Splits `text` into ordered chunks of approximately `target_tokens`
    /// tokens (defaults to the configured `chunk_size`).
    ///
    /// Chunks whose cleaned text is at most `min_chunk_length_to_embed`
    /// characters are discarded rather than emitted. Once `max_num_chunks`
    /// chunks have been produced the loop stops; any leftover tokens are
    /// decoded and emitted as one final chunk if they pass the same minimum
    /// length test.
    pub fn chunk(
        &self,
        text: &str,
        target_tokens: Option<usize>,
    ) -> Result<Vec<ChunkPiece>, RagstoreError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let target = target_tokens.unwrap_or(self.config.chunk_size).max(1);
        let mut tokens = self.tokenizer.encode(text);
        let mut pieces = Vec::new();
        let mut num_chunks = 0usize;

        while !tokens.is_empty() && num_chunks < self.config.max_num_chunks {
            let window = tokens.len().min(target);
            let mut chunk_text = self.tokenizer.decode(&tokens[..window])?;

            if chunk_text.trim().is_empty() {
                tokens.drain(..window);
                continue;
            }

            if let Some(cut) = punctuation_cut(&chunk_text, self.config.min_chunk_size_chars) {
                chunk_text.truncate(cut);
            }

            let cleaned = clean(&chunk_text);
            if cleaned.chars().count() > self.config.min_chunk_length_to_embed {
                let token_count = self.tokenizer.count(&cleaned);
                pieces.push(ChunkPiece {
                    text: cleaned,
                    token_count,
                });
            }

            // Account for what was actually consumed; at least one token so
            // the loop cannot stall when re-encoding disagrees with the
            // window boundary.
            let consumed = self.tokenizer.count(&chunk_text).clamp(1, tokens.len());
            tokens.drain(..consumed);
            num_chunks += 1;
        }

        if num_chunks == self.config.max_num_chunks {
            tracing::warn!(
                max_num_chunks = self.config.max_num_chunks,
                text_len = text.len(),
                "reached the maximum number of chunks; output truncated"
            );
        }

        if !tokens.is_empty() {
            let remaining = clean(&self.tokenizer.decode(&tokens)?);
            if remaining.chars().count() > self.config.min_chunk_length_to_embed {
                let token_count = self.tokenizer.count(&remaining);
                pieces.push(ChunkPiece {
                    text: remaining,
                    token_count,
                });
            }
        }

        Ok(pieces)
    }
}

fn clean(text: &str) -> String {
    text.replace('\n', " ").trim().to_string()
}

/// Byte offset just past the last sentence-ending mark, provided that mark
/// sits beyond `min_chars` characters into the text.
fn punctuation_cut(text: &str, min_chars: usize) -> Option<usize> {
    let mut cut = None;
    for (char_idx, (byte_idx, ch)) in text.char_indices().enumerate() {
        if matches!(ch, '.' | '?' | '!' | '\n') && char_idx > min_chars {
            cut = Some(byte_idx + ch.len_utf8());
        }
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::super::tokenizer::testing::WordTokenizer;
    use super::super::tokenizer::{Cl100kTokenizer, Tokenizer};
    use super::*;

    fn word_chunker(config: ChunkConfig) -> TokenWindowChunker {
        TokenWindowChunker::new(Arc::new(WordTokenizer::new()), config)
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        let chunker = word_chunker(ChunkConfig::default());
        assert!(chunker.chunk("", None).unwrap().is_empty());
        assert!(chunker.chunk("   \n\t", None).unwrap().is_empty());
    }

    #[test]
    fn windows_split_at_the_token_target() {
        let config = ChunkConfig {
            chunk_size: 4,
            min_chunk_size_chars: 1_000, // no punctuation cuts
            min_chunk_length_to_embed: 1,
            ..Default::default()
        };
        let chunker = word_chunker(config);
        let pieces = chunker
            .chunk("one two three four five six seven eight nine ten", None)
            .unwrap();
        assert_eq!(
            pieces.iter().map(|p| p.text.as_str()).collect::<Vec<_>>(),
            vec!["one two three four", "five six seven eight", "nine ten"]
        );
        assert_eq!(pieces[0].token_count, 4);
        assert_eq!(pieces[2].token_count, 2);
    }

    #[test]
    fn prefers_to_cut_at_sentence_punctuation() {
        let config = ChunkConfig {
            chunk_size: 6,
            min_chunk_size_chars: 5,
            min_chunk_length_to_embed: 1,
            ..Default::default()
        };
        let chunker = word_chunker(config);
        let pieces = chunker
            .chunk("alpha beta gamma. delta epsilon zeta eta theta", None)
            .unwrap();
        assert_eq!(pieces[0].text, "alpha beta gamma.");
        assert_eq!(pieces[1].text, "delta epsilon zeta eta theta");
    }

    #[test]
    fn short_fragments_are_discarded() {
        let config = ChunkConfig {
            chunk_size: 2,
            min_chunk_size_chars: 1_000,
            min_chunk_length_to_embed: 12,
            ..Default::default()
        };
        let chunker = word_chunker(config);
        // Every two-word window is under twelve characters of cleaned text.
        let pieces = chunker.chunk("aa bb cc dd ee ff", None).unwrap();
        assert!(pieces.is_empty());
    }

    #[test]
    fn leftover_tokens_become_a_final_chunk_after_the_cap() {
        let config = ChunkConfig {
            chunk_size: 2,
            min_chunk_size_chars: 1_000,
            min_chunk_length_to_embed: 1,
            max_num_chunks: 2,
            ..Default::default()
        };
        let chunker = word_chunker(config);
        let pieces = chunker
            .chunk("one two three four five six seven eight", None)
            .unwrap();
        assert_eq!(
            pieces.iter().map(|p| p.text.as_str()).collect::<Vec<_>>(),
            vec!["one two", "three four", "five six seven eight"]
        );
    }

    #[test]
    fn output_is_deterministic_with_the_real_tokenizer() {
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(Cl100kTokenizer::new().unwrap());
        let config = ChunkConfig {
            chunk_size: 24,
            min_chunk_size_chars: 20,
            min_chunk_length_to_embed: 5,
            ..Default::default()
        };
        let chunker = TokenWindowChunker::new(tokenizer, config);
        let text = "Rust is a systems programming language. It runs blazingly fast, \
                    prevents segfaults, and guarantees thread safety. Use it for CLIs, \
                    web servers, and embedded devices. The borrow checker takes some \
                    getting used to, but it pays for itself quickly.";
        let first = chunker.chunk(text, None).unwrap();
        let second = chunker.chunk(text, None).unwrap();
        assert_eq!(first, second);
        assert!(first.len() > 1);
    }

    #[test]
    fn emitted_chunks_respect_the_size_bound() {
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(Cl100kTokenizer::new().unwrap());
        let target = 20usize;
        let config = ChunkConfig {
            chunk_size: target,
            min_chunk_size_chars: 10,
            min_chunk_length_to_embed: 5,
            ..Default::default()
        };
        let chunker = TokenWindowChunker::new(tokenizer, config);
        let text = "A long stretch of prose follows. ".repeat(40);
        let pieces = chunker.chunk(&text, None).unwrap();
        for piece in &pieces[..pieces.len() - 1] {
            assert!(
                piece.token_count <= target + target / 2,
                "chunk of {} tokens exceeds bound",
                piece.token_count
            );
        }
    }
}
