//! Core data model: documents, chunks, metadata filters, and queries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a document originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Email,
    File,
    Chat,
    Web,
}

impl Source {
    /// The wire/storage label for this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Email => "email",
            Source::File => "file",
            Source::Chat => "chat",
            Source::Web => "web",
        }
    }
}

/// One author, or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Author {
    One(String),
    Many(Vec<String>),
}

impl Author {
    /// Joined display form, used when headerizing chunk text for embedding.
    pub fn joined(&self) -> String {
        match self {
            Author::One(name) => name.clone(),
            Author::Many(names) => names.join(", "),
        }
    }
}

/// Optional descriptive metadata attached to a document and inherited
/// verbatim by every chunk produced from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Date string; normalized to a unix timestamp at storage time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Two-character ISO 639-1 code of the primary content language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn generate_document_id() -> String {
    Uuid::new_v4().to_string()
}

/// A document as handed to the ingestion pipeline.
///
/// `token_count` is stamped with the sum of per-chunk token counts once the
/// document has been chunked; nothing else is mutated after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(default = "generate_document_id")]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,
}

impl Document {
    /// Creates a document with a generated id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: generate_document_id(),
            text: text.into(),
            metadata: DocumentMetadata::default(),
            mimetype: None,
            token_count: None,
        }
    }

    /// Overrides the generated id with a stable caller-supplied one.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }
}

/// Chunk metadata: the parent document's metadata plus its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunkMetadata {
    pub document_id: String,
    #[serde(flatten)]
    pub document: DocumentMetadata,
}

/// A token-bounded passage of one document, the unit of embedding and
/// retrieval. Chunk ids are `"{document_id}_{index}"` with a dense index
/// starting at 0 in reading order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub metadata: DocumentChunkMetadata,
    /// Attached after the batched embedding call; immutable afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,
}

/// A chunk plus the similarity score produced by a query.
///
/// Scores are normalized so higher means more similar (`1 - distance` for
/// distance-based backends). Produced only by queries, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunkWithScore {
    #[serde(flatten)]
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Sparse predicate over chunk metadata.
///
/// `start_date`/`end_date` are an inclusive range over `created_at`; every
/// other present field is an exact match. An empty filter matches every chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadataFilter {
    pub document_id: Option<String>,
    pub source: Option<Source>,
    pub source_id: Option<String>,
    pub author: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub start_date: Option<String>,
    /// Inclusive upper bound on `created_at`.
    pub end_date: Option<String>,
}

impl DocumentMetadataFilter {
    /// Filter that matches all chunks of one document.
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: Some(document_id.into()),
            ..Self::default()
        }
    }

    /// `true` when no field constrains anything.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Returns the document id when it is the only constraint, enabling the
    /// direct delete-by-document fast path in backends.
    pub fn as_document_id_only(&self) -> Option<&str> {
        let document_id = self.document_id.as_deref()?;
        let rest = Self {
            document_id: None,
            ..self.clone()
        };
        rest.is_empty().then_some(document_id)
    }
}

fn default_top_k() -> usize {
    7
}

/// A single retrieval query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Query text; must be non-empty.
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<DocumentMetadataFilter>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            query: text.into(),
            filter: None,
            top_k: default_top_k(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: DocumentMetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// A query hydrated with its embedding, ready for the backend search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryWithEmbedding {
    #[serde(flatten)]
    pub query: Query,
    pub embedding: Vec<f32>,
}

/// Ranked results for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub results: Vec<DocumentChunkWithScore>,
}
