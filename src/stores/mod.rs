//! Vector storage: the backend trait and the default-behavior wrapper.
//!
//! ```text
//!                 ┌────────────────────┐
//!                 │     DataStore      │  delete-before-upsert,
//!                 │ (default behavior) │  batch query embedding
//!                 └─────────┬──────────┘
//!                           │
//!                 ┌─────────▼──────────┐
//!                 │  VectorStore trait │  add / search / delete /
//!                 │   (async, boxed)   │  chunks / doc / count
//!                 └─────────┬──────────┘
//!                           │
//!                 ┌─────────▼──────────┐
//!                 │ SqliteVectorStore  │  sqlite-vec cosine scan
//!                 └────────────────────┘
//! ```

pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::chunking::Tokenizer;
use crate::config::ChunkConfig;
use crate::embeddings::EmbeddingProvider;
use crate::ingestion::IngestionPipeline;
use crate::models::{
    Document, DocumentChunk, DocumentChunkWithScore, DocumentMetadataFilter, Query, QueryResult,
    QueryWithEmbedding,
};
use crate::types::RagstoreError;

pub use sqlite::SqliteVectorStore;

/// What to remove from a store.
///
/// The three criteria are independent and OR-combined: ids, a metadata
/// filter, and the everything switch can all be supplied in one request.
/// `ids` are document ids, not chunk ids. An entirely empty request deletes
/// nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteRequest {
    pub ids: Option<Vec<String>>,
    pub filter: Option<DocumentMetadataFilter>,
    pub delete_all: bool,
}

impl DeleteRequest {
    pub fn all() -> Self {
        Self {
            delete_all: true,
            ..Self::default()
        }
    }

    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn by_filter(filter: DocumentMetadataFilter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }
}

/// Storage backend for embedded chunks.
///
/// Implementations persist chunks with their vectors and answer similarity
/// searches. All default behavior (chunking, embedding, delete-before-upsert)
/// lives in [`DataStore`]; backends only store and retrieve.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persists `(document_id, chunks)` groups. Chunk ids already present in
    /// the store are replaced. Returns the document ids in input order.
    async fn add(
        &self,
        grouped: &[(String, Vec<DocumentChunk>)],
    ) -> Result<Vec<String>, RagstoreError>;

    /// Ranked nearest chunks for one embedded query, best first. An empty
    /// result is not an error.
    async fn search(
        &self,
        query: &QueryWithEmbedding,
    ) -> Result<Vec<DocumentChunkWithScore>, RagstoreError>;

    async fn delete(&self, request: &DeleteRequest) -> Result<(), RagstoreError>;

    /// Pages through stored chunks in insertion order (reverse flips it).
    /// Stable between calls while the store is not mutated.
    async fn chunks(
        &self,
        start: usize,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<DocumentChunk>, RagstoreError>;

    /// All chunks of one document in chunk-index order.
    async fn doc(&self, document_id: &str) -> Result<Vec<DocumentChunk>, RagstoreError>;

    async fn count(&self) -> Result<usize, RagstoreError>;

    /// Flushes state before process exit. Nothing may be called afterwards.
    async fn shutdown(&self) -> Result<(), RagstoreError>;
}

/// The front door: chunking, embedding, and upsert/query orchestration over
/// any [`VectorStore`] backend.
pub struct DataStore {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    pipeline: IngestionPipeline,
}

impl DataStore {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        tokenizer: Arc<dyn Tokenizer>,
        config: ChunkConfig,
    ) -> Self {
        let pipeline =
            IngestionPipeline::with_defaults(tokenizer, Arc::clone(&embedder), config);
        Self {
            store,
            embedder,
            pipeline,
        }
    }

    /// Replaces the stored chunks of each document and inserts the new ones.
    ///
    /// Existing chunks are deleted per document id first, concurrently; a
    /// failed delete is logged and does not abort the upsert. Fails with
    /// [`RagstoreError::InvalidInput`] when the batch contains no usable
    /// content, before anything is inserted.
    pub async fn upsert(
        &self,
        documents: &mut [Document],
        chunk_token_size: Option<usize>,
    ) -> Result<Vec<String>, RagstoreError> {
        let deletes = documents.iter().map(|document| {
            let request =
                DeleteRequest::by_filter(DocumentMetadataFilter::for_document(&document.id));
            let store = Arc::clone(&self.store);
            let document_id = document.id.clone();
            async move {
                if let Err(err) = store.delete(&request).await {
                    tracing::warn!(%document_id, %err, "pre-upsert delete failed");
                }
            }
        });
        join_all(deletes).await;

        let grouped = self.pipeline.ingest(documents, chunk_token_size).await?;
        self.store.add(&grouped).await
    }

    /// Embeds all query texts in one batch, then searches concurrently.
    pub async fn query(&self, queries: &[Query]) -> Result<Vec<QueryResult>, RagstoreError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        if queries.iter().any(|query| query.query.trim().is_empty()) {
            return Err(RagstoreError::InvalidInput(
                "query text must be non-empty".into(),
            ));
        }

        let texts: Vec<String> = queries.iter().map(|query| query.query.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != queries.len() {
            return Err(RagstoreError::Embedding(format!(
                "provider returned {} vectors for {} queries",
                embeddings.len(),
                queries.len()
            )));
        }

        let hydrated: Vec<QueryWithEmbedding> = queries
            .iter()
            .zip(embeddings)
            .map(|(query, embedding)| QueryWithEmbedding {
                query: query.clone(),
                embedding,
            })
            .collect();

        let searches = hydrated.iter().map(|query| {
            let store = Arc::clone(&self.store);
            async move {
                let results = store.search(query).await?;
                Ok(QueryResult {
                    query: query.query.query.clone(),
                    results,
                })
            }
        });
        join_all(searches).await.into_iter().collect()
    }

    pub async fn delete(&self, request: &DeleteRequest) -> Result<(), RagstoreError> {
        self.store.delete(request).await
    }

    pub async fn chunks(
        &self,
        start: usize,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<DocumentChunk>, RagstoreError> {
        self.store.chunks(start, limit, reverse).await
    }

    pub async fn doc(&self, document_id: &str) -> Result<Vec<DocumentChunk>, RagstoreError> {
        self.store.doc(document_id).await
    }

    pub async fn count(&self) -> Result<usize, RagstoreError> {
        self.store.count().await
    }

    pub async fn shutdown(&self) -> Result<(), RagstoreError> {
        self.store.shutdown().await
    }
}
