//! Chunking strategies: token windows, sentence boundaries, tabular records.
//!
//! All three strategies produce [`ChunkPiece`]s and measure size with the same
//! [`Tokenizer`], so a target of N tokens means the same thing everywhere.

pub mod segmenter;
pub mod sentence;
pub mod tabular;
pub mod token_window;
pub mod tokenizer;

pub use segmenter::{SegmentMode, SentenceSegmenter, UnicodeSegmenter};
pub use sentence::SentenceChunker;
pub use tabular::TabularChunker;
pub use token_window::{ChunkPiece, TokenWindowChunker};
pub use tokenizer::{Cl100kTokenizer, Tokenizer};
