//! Error taxonomy shared across the chunking and storage pipeline.

use thiserror::Error;

/// Errors surfaced by the ingestion and storage pipeline.
///
/// Variants fall into three classes. [`RagstoreError::InvalidInput`] is
/// recoverable by the caller and is never retried internally. `Segmentation`,
/// `Embedding`, and `Storage` wrap failures of external collaborators; where a
/// safe fallback exists (token-window chunking in place of sentence
/// segmentation) it is substituted transparently, otherwise the error is
/// propagated unchanged. `Chunking` covers tokenizer round-trip failures.
#[derive(Debug, Error)]
pub enum RagstoreError {
    /// Caller-supplied input cannot be processed: empty documents, malformed
    /// filters, missing identifiers.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Sentence boundary detection failed; callers substitute the
    /// token-window fallback where one exists.
    #[error("sentence segmentation failed: {0}")]
    Segmentation(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("storage backend error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagstoreError {
    /// `true` when the error is recoverable by fixing the request rather than
    /// a fault in the pipeline or a backing service.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, RagstoreError::InvalidInput(_))
    }
}
