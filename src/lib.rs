//! ```text
//! Documents ──► ingestion::IngestionPipeline ─┬─► chunking::SentenceChunker
//!                                             ├─► chunking::TabularChunker
//!                                             └─► chunking::TokenWindowChunker (fallback)
//!
//! Chunks ──► embeddings::EmbeddingProvider ──► stores::DataStore
//!                                                   │
//!                                                   └─► stores::VectorStore
//!                                                        └─► stores::SqliteVectorStore
//!
//! Queries ──► DataStore::query ──► ranked DocumentChunkWithScore
//! ```
//!
pub mod chunking;
pub mod config;
pub mod dates;
pub mod embeddings;
pub mod ingestion;
pub mod models;
pub mod stores;
pub mod types;

pub use chunking::{Cl100kTokenizer, Tokenizer};
pub use config::ChunkConfig;
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, OpenAiEmbeddingProvider};
pub use ingestion::IngestionPipeline;
pub use models::{
    Document, DocumentChunk, DocumentChunkMetadata, DocumentChunkWithScore, DocumentMetadata,
    DocumentMetadataFilter, Query, QueryResult, Source,
};
pub use stores::{DataStore, DeleteRequest, SqliteVectorStore, VectorStore};
pub use types::RagstoreError;
