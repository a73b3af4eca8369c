//! Sentence-accumulating chunker with cross-chunk overlap.

use std::sync::Arc;

use crate::config::ChunkConfig;
use crate::types::RagstoreError;

use super::segmenter::{SegmentMode, SentenceSegmenter};
use super::token_window::{ChunkPiece, TokenWindowChunker};
use super::tokenizer::Tokenizer;

/// Accumulates sentences into target-sized chunks, repeating the trailing
/// sentences of each closed chunk at the start of the next one so context
/// survives the boundary.
pub struct SentenceChunker {
    tokenizer: Arc<dyn Tokenizer>,
    segmenter: Arc<dyn SentenceSegmenter>,
    fallback: TokenWindowChunker,
    config: ChunkConfig,
}

impl SentenceChunker {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        segmenter: Arc<dyn SentenceSegmenter>,
        config: ChunkConfig,
    ) -> Self {
        let fallback = TokenWindowChunker::new(Arc::clone(&tokenizer), config.clone());
        Self {
            tokenizer,
            segmenter,
            fallback,
            config,
        }
    }

    /// Number of trailing segments carried into the next chunk.
    fn overlap_len(segment_count: usize) -> usize {
        if segment_count > 10 { 2 } else { 1 }
    }

    /// Splits `text` into sentence-bounded chunks of roughly `target_tokens`
    /// tokens.
    ///
    /// `language` defaults to `"en"`. `is_pdf` selects the segmenter's PDF
    /// handling for hyphenation and line-wrap artifacts. When segmentation
    /// fails, the whole text is chunked by token windows instead. Any single
    /// segment over `max_tokens_per_segment` tokens is itself split by token
    /// windows and its pieces substituted in sequence.
    pub fn chunk(
        &self,
        text: &str,
        target_tokens: Option<usize>,
        language: Option<&str>,
        is_pdf: bool,
    ) -> Result<Vec<ChunkPiece>, RagstoreError> {
        let target = target_tokens.unwrap_or(self.config.chunk_size).max(1);
        let language = match language {
            Some(code) if !code.is_empty() => code,
            _ => "en",
        };
        let mode = if is_pdf {
            SegmentMode::Pdf
        } else {
            SegmentMode::Plain
        };

        let segments = match self.segmenter.segment(text, language, mode) {
            Ok(segments) => segments,
            Err(err) => {
                tracing::warn!(
                    %err,
                    language,
                    "sentence segmentation failed; falling back to token windows"
                );
                return self.fallback.chunk(text, Some(target));
            }
        };

        // Tables, code blocks, and malformed text show up as one huge
        // "sentence"; hand those to the token-window chunker and splice the
        // pieces back in order.
        let mut units: Vec<(String, usize)> = Vec::with_capacity(segments.len());
        for segment in segments {
            let tokens = self.tokenizer.count(&segment);
            if tokens > self.config.max_tokens_per_segment {
                tracing::debug!(
                    tokens,
                    max_tokens_per_segment = self.config.max_tokens_per_segment,
                    "oversized segment split into token windows"
                );
                for piece in self.fallback.chunk(&segment, Some(target))? {
                    units.push((piece.text, piece.token_count));
                }
            } else {
                units.push((segment, tokens));
            }
        }

        let mut pieces: Vec<ChunkPiece> = Vec::new();
        let mut current: Vec<(String, usize)> = Vec::new();
        let mut running = 0usize;
        let mut capped = false;

        for (segment, tokens) in units {
            // Half-weighted look-ahead: close the chunk when adding half of
            // the next segment would overshoot the target.
            if running + tokens / 2 > target && !current.is_empty() {
                pieces.push(close_chunk(&current));
                if pieces.len() >= self.config.max_num_chunks {
                    tracing::warn!(
                        max_num_chunks = self.config.max_num_chunks,
                        text_len = text.len(),
                        "reached the maximum number of chunks; output truncated"
                    );
                    current.clear();
                    capped = true;
                    break;
                }
                let overlap = Self::overlap_len(current.len());
                current.drain(..current.len() - overlap);
                running = current.iter().map(|(_, tokens)| *tokens).sum();
            }
            running += tokens;
            current.push((segment, tokens));
        }

        if !capped && !current.is_empty() {
            pieces.push(close_chunk(&current));
        }

        Ok(pieces)
    }
}

fn close_chunk(segments: &[(String, usize)]) -> ChunkPiece {
    let text = segments
        .iter()
        .map(|(segment, _)| segment.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let token_count = segments.iter().map(|(_, tokens)| *tokens).sum();
    ChunkPiece { text, token_count }
}
