//! Chunking policy configuration.
//!
//! All numeric knobs live in one [`ChunkConfig`] value that is passed into
//! each chunker and the ingestion pipeline at construction. Nothing here is
//! process-wide state, so several independent configurations (production,
//! tests, per-collection overrides) can coexist in one process.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the chunking pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Target size of each chunk in tokens.
    pub chunk_size: usize,
    /// Punctuation-aware truncation only applies past this many characters,
    /// which keeps the token-window chunker from emitting tiny fragments.
    pub min_chunk_size_chars: usize,
    /// Chunks whose cleaned text is this many characters or fewer are
    /// discarded instead of embedded.
    pub min_chunk_length_to_embed: usize,
    /// Number of chunk texts sent per embedding request.
    pub embeddings_batch_size: usize,
    /// Hard cap on the number of chunks generated from a single text.
    pub max_num_chunks: usize,
    /// Sentences longer than this are handed to the token-window chunker
    /// instead of being accumulated whole (tables, code, malformed text).
    pub max_tokens_per_segment: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            min_chunk_size_chars: 350,
            min_chunk_length_to_embed: 5,
            embeddings_batch_size: 128,
            max_num_chunks: 10_000,
            max_tokens_per_segment: 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let config = ChunkConfig::default();
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.min_chunk_size_chars, 350);
        assert_eq!(config.min_chunk_length_to_embed, 5);
        assert_eq!(config.embeddings_batch_size, 128);
        assert_eq!(config.max_num_chunks, 10_000);
    }

    #[test]
    fn partial_overrides_fall_back_to_defaults() {
        let config: ChunkConfig = serde_json::from_str(r#"{"chunk_size": 64}"#).unwrap();
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.embeddings_batch_size, 128);
    }
}
