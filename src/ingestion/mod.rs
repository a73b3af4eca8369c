//! Ingestion orchestration: route documents to a chunking strategy, stamp
//! chunk ids and token counts, and attach embeddings in batches.

use std::sync::Arc;

use crate::chunking::{
    ChunkPiece, SentenceChunker, SentenceSegmenter, TabularChunker, Tokenizer, UnicodeSegmenter,
};
use crate::config::ChunkConfig;
use crate::embeddings::EmbeddingProvider;
use crate::models::{Document, DocumentChunk, DocumentChunkMetadata};
use crate::types::RagstoreError;

/// Mimetypes routed to the tabular chunker so spreadsheet rows never straddle
/// a chunk boundary. CSV plus the Excel family.
pub const TABULAR_MIMETYPES: &[&str] = &[
    "text/csv",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel.sheet.macroEnabled.12",
    "application/vnd.ms-excel.sheet.binary.macroEnabled.12",
    "application/vnd.ms-excel.template.macroEnabled.12",
    "application/vnd.ms-excel.addin.macroEnabled.12",
];

/// Split budget for a single oversized tabular record.
pub const TABULAR_SPLIT_TOKENS: usize = 2_000;

const PDF_MIMETYPE: &str = "application/pdf";

/// Chunks documents and embeds the results.
///
/// Prose goes through the sentence chunker, tabular mimetypes through the
/// record chunker; both measure with the same tokenizer. Embeddings are
/// fetched in `embeddings_batch_size` groups across the whole document batch.
pub struct IngestionPipeline {
    sentence: SentenceChunker,
    tabular: TabularChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    config: ChunkConfig,
}

impl IngestionPipeline {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        segmenter: Arc<dyn SentenceSegmenter>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: ChunkConfig,
    ) -> Self {
        Self {
            sentence: SentenceChunker::new(Arc::clone(&tokenizer), segmenter, config.clone()),
            tabular: TabularChunker::new(tokenizer, config.clone()),
            embedder,
            config,
        }
    }

    /// Default wiring: UAX#29 sentence segmentation over the given tokenizer.
    pub fn with_defaults(
        tokenizer: Arc<dyn Tokenizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: ChunkConfig,
    ) -> Self {
        Self::new(tokenizer, Arc::new(UnicodeSegmenter), embedder, config)
    }

    /// Splits one document into chunks, without embeddings.
    ///
    /// Stamps `document.token_count` with the sum of the per-chunk counts.
    /// Chunk ids are `"{document_id}_{index}"` with a dense index from 0 in
    /// chunker output order. Empty or whitespace text yields zero chunks.
    pub fn chunk_document(
        &self,
        document: &mut Document,
        chunk_token_size: Option<usize>,
    ) -> Result<Vec<DocumentChunk>, RagstoreError> {
        if document.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mimetype = document.mimetype.as_deref();
        let pieces: Vec<ChunkPiece> = if mimetype.is_some_and(|m| TABULAR_MIMETYPES.contains(&m)) {
            tracing::info!(
                document_id = %document.id,
                mimetype,
                "splitting tabular document on record boundaries"
            );
            let records: Vec<&str> = document.text.split('\n').collect();
            self.tabular.chunk(&records, TABULAR_SPLIT_TOKENS)
        } else {
            let target = chunk_token_size.unwrap_or(self.config.chunk_size);
            tracing::info!(
                document_id = %document.id,
                mimetype,
                language = document.metadata.language.as_deref(),
                target_tokens = target,
                "splitting document on sentence boundaries"
            );
            self.sentence.chunk(
                &document.text,
                Some(target),
                document.metadata.language.as_deref(),
                mimetype == Some(PDF_MIMETYPE),
            )?
        };

        document.token_count = Some(pieces.iter().map(|piece| piece.token_count).sum());
        tracing::debug!(
            document_id = %document.id,
            chunks = pieces.len(),
            total_tokens = document.token_count,
            "document chunked"
        );

        let metadata = DocumentChunkMetadata {
            document_id: document.id.clone(),
            document: document.metadata.clone(),
        };
        Ok(pieces
            .into_iter()
            .enumerate()
            .map(|(index, piece)| DocumentChunk {
                id: format!("{}_{index}", document.id),
                text: piece.text,
                metadata: metadata.clone(),
                embedding: None,
                token_count: Some(piece.token_count),
            })
            .collect())
    }

    /// Chunks a batch of documents and attaches embeddings to every chunk.
    ///
    /// Returns `(document_id, chunks)` pairs in input order. Fails with
    /// [`RagstoreError::InvalidInput`] when no document in the batch yields a
    /// single usable chunk.
    pub async fn ingest(
        &self,
        documents: &mut [Document],
        chunk_token_size: Option<usize>,
    ) -> Result<Vec<(String, Vec<DocumentChunk>)>, RagstoreError> {
        let mut per_document: Vec<(String, Vec<DocumentChunk>)> =
            Vec::with_capacity(documents.len());
        for document in documents.iter_mut() {
            let chunks = self.chunk_document(document, chunk_token_size)?;
            per_document.push((document.id.clone(), chunks));
        }

        let total: usize = per_document.iter().map(|(_, chunks)| chunks.len()).sum();
        if total == 0 {
            return Err(RagstoreError::InvalidInput(
                "no usable content in any document of the batch".into(),
            ));
        }

        let texts: Vec<String> = per_document
            .iter()
            .flat_map(|(_, chunks)| chunks.iter().map(headerize))
            .collect();

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.embeddings_batch_size.max(1)) {
            let mut batch_vectors = self.embedder.embed_batch(batch).await?;
            if batch_vectors.len() != batch.len() {
                return Err(RagstoreError::Embedding(format!(
                    "provider returned {} vectors for a batch of {}",
                    batch_vectors.len(),
                    batch.len()
                )));
            }
            vectors.append(&mut batch_vectors);
        }

        let mut vectors = vectors.into_iter();
        for (_, chunks) in per_document.iter_mut() {
            for chunk in chunks.iter_mut() {
                chunk.embedding = vectors.next();
            }
        }

        tracing::info!(
            documents = per_document.len(),
            chunks = total,
            "ingested document batch"
        );
        Ok(per_document)
    }
}

/// Prefixes chunk text with its identifying metadata before embedding, so
/// retrieval can match on titles and authors as well as the passage itself.
fn headerize(chunk: &DocumentChunk) -> String {
    let metadata = &chunk.metadata.document;
    let mut prefix = String::new();
    if let Some(source_id) = &metadata.source_id {
        prefix.push_str(source_id);
        prefix.push_str(": ");
    }
    if let Some(title) = &metadata.title {
        prefix.push_str(title);
        prefix.push_str(": ");
    }
    if let Some(author) = &metadata.author {
        prefix.push_str(&author.joined());
        prefix.push_str(": ");
    }
    prefix.push_str(&chunk.text);
    prefix
}
