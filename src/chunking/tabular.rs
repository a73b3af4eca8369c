//! Record-oriented chunking for CSV and spreadsheet exports.

use std::sync::Arc;

use crate::config::ChunkConfig;

use super::token_window::ChunkPiece;
use super::tokenizer::Tokenizer;

/// Emits one chunk per record so rows never straddle a chunk boundary.
///
/// A record that is itself too large is split by character count, sized from
/// the record's own token density, so each slice lands near `max_tokens`
/// without re-tokenizing every candidate cut.
pub struct TabularChunker {
    tokenizer: Arc<dyn Tokenizer>,
    config: ChunkConfig,
}

impl TabularChunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, config: ChunkConfig) -> Self {
        Self { tokenizer, config }
    }

    pub fn chunk(&self, records: &[&str], max_tokens: usize) -> Vec<ChunkPiece> {
        let max_tokens = max_tokens.max(1);
        let mut pieces = Vec::with_capacity(records.len());
        for record in records {
            let record = record.trim();
            if record.is_empty() {
                continue;
            }
            let token_count = self.tokenizer.count(record);
            if token_count <= self.config.chunk_size {
                pieces.push(ChunkPiece {
                    text: record.to_string(),
                    token_count,
                });
                continue;
            }

            let chars: Vec<char> = record.chars().collect();
            let tokens_per_char = token_count as f64 / chars.len() as f64;
            let max_chars = ((max_tokens as f64 / tokens_per_char) as usize).max(1);
            for slice in chars.chunks(max_chars) {
                let text: String = slice.iter().collect();
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                pieces.push(ChunkPiece {
                    token_count: self.tokenizer.count(text),
                    text: text.to_string(),
                });
            }
        }
        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::super::tokenizer::testing::WordTokenizer;
    use super::*;

    fn chunker(chunk_size: usize) -> TabularChunker {
        let config = ChunkConfig {
            chunk_size,
            ..Default::default()
        };
        TabularChunker::new(Arc::new(WordTokenizer::new()), config)
    }

    #[test]
    fn one_piece_per_record() {
        let chunker = chunker(200);
        let records = vec!["id,name,score", "1,ada,97", "", "2,grace,99"];
        let pieces = chunker.chunk(&records, 2_000);
        let texts: Vec<&str> = pieces.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["id,name,score", "1,ada,97", "2,grace,99"]);
    }

    #[test]
    fn oversized_record_splits_by_proportional_char_count() {
        let chunker = chunker(4);
        // 16 single-word cells of 2 chars + separator: 16 tokens, 47 chars,
        // so a 4-token budget allows floor(4 / (16/47)) = 11 chars per slice.
        let record = (0..16).map(|i| format!("c{i:x}")).collect::<Vec<_>>().join(" ");
        assert_eq!(record.chars().count(), 47);
        let pieces = chunker.chunk(&[record.as_str()], 4);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.text.chars().count() <= 11));
        // Nothing but slice-boundary whitespace is lost.
        let rejoined: String = pieces
            .iter()
            .map(|p| p.text.replace(' ', ""))
            .collect();
        assert_eq!(rejoined, record.replace(' ', ""));
    }

    #[test]
    fn whitespace_only_input_yields_nothing() {
        let chunker = chunker(200);
        assert!(chunker.chunk(&["   ", "\t"], 2_000).is_empty());
    }
}
