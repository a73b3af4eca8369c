//! Embedding providers: the OpenAI-compatible HTTP client and a deterministic
//! mock for tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::RagstoreError;

/// Turns batches of texts into fixed-dimension embedding vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagstoreError>;

    /// Dimension of every vector this provider returns.
    fn dimension(&self) -> usize;
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for any `POST {base_url}/embeddings` endpoint that speaks the
/// OpenAI embeddings wire format.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingProvider {
    /// `base_url` is the API root (for example `https://api.openai.com/v1`);
    /// the `/embeddings` path is appended here, so a trailing slash on the
    /// base is optional.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, RagstoreError> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let endpoint = Url::parse(&base)
            .and_then(|base| base.join("embeddings"))
            .map_err(|err| RagstoreError::Embedding(format!("invalid base url: {err}")))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model: model.into(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagstoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };
        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| RagstoreError::Embedding(format!("embeddings request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagstoreError::Embedding(format!(
                "embeddings endpoint returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|err| RagstoreError::Embedding(format!("malformed embeddings body: {err}")))?;

        if parsed.data.len() != texts.len() {
            return Err(RagstoreError::Embedding(format!(
                "expected {} embeddings, endpoint returned {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // The wire format says results come back with an index; order by it
        // rather than trusting response order.
        let mut data = parsed.data;
        data.sort_by_key(|datum| datum.index);
        let mut vectors = Vec::with_capacity(data.len());
        for (position, datum) in data.into_iter().enumerate() {
            if datum.index != position {
                return Err(RagstoreError::Embedding(format!(
                    "embeddings response is missing index {position}"
                )));
            }
            if datum.embedding.len() != self.dimension {
                return Err(RagstoreError::Embedding(format!(
                    "embedding {} has dimension {}, expected {}",
                    datum.index,
                    datum.embedding.len(),
                    self.dimension
                )));
            }
            vectors.push(datum.embedding);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic offline provider for tests and examples.
///
/// Each text hashes to a unit vector, so identical texts always embed to the
/// same point and cosine similarity against itself is 1. Records the size of
/// every batch it receives so tests can assert batching behavior.
pub struct MockEmbeddingProvider {
    dimension: usize,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        // FNV-ish rolling hash seeds a small LCG per component.
        let mut seed = 0xcbf2_9ce4_8422_2325u64;
        for byte in text.bytes() {
            seed ^= u64::from(byte);
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let mut state = seed | 1;
        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            vector.push(((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0);
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for component in &mut vector {
                *component /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagstoreError> {
        self.batch_sizes.lock().push(texts.len());
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn provider_for(server: &MockServer, dimension: usize) -> OpenAiEmbeddingProvider {
        OpenAiEmbeddingProvider::new(
            reqwest::Client::new(),
            &server.base_url(),
            Some("test-key".into()),
            "text-embedding-3-small",
            dimension,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn embeds_a_batch_and_restores_request_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer test-key")
                    .json_body_partial(r#"{"model": "text-embedding-3-small"}"#);
                then.status(200).json_body(json!({
                    "data": [
                        {"index": 1, "embedding": [0.0, 1.0]},
                        {"index": 0, "embedding": [1.0, 0.0]}
                    ]
                }));
            })
            .await;

        let provider = provider_for(&server, 2);
        let vectors = provider
            .embed_batch(&["first".into(), "second".into()])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn rejects_a_short_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [{"index": 0, "embedding": [1.0, 0.0]}]
                }));
            })
            .await;

        let provider = provider_for(&server, 2);
        let err = provider
            .embed_batch(&["first".into(), "second".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagstoreError::Embedding(_)));
    }

    #[tokio::test]
    async fn rejects_a_wrong_dimension() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [{"index": 0, "embedding": [1.0, 0.0, 0.0]}]
                }));
            })
            .await;

        let provider = provider_for(&server, 2);
        let err = provider.embed_batch(&["first".into()]).await.unwrap_err();
        assert!(matches!(err, RagstoreError::Embedding(_)));
    }

    #[tokio::test]
    async fn surfaces_http_errors_with_the_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(429).body("rate limited");
            })
            .await;

        let provider = provider_for(&server, 2);
        let err = provider.embed_batch(&["first".into()]).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn trailing_slash_on_the_base_url_is_optional() {
        let with = OpenAiEmbeddingProvider::new(
            reqwest::Client::new(),
            "http://localhost:9999/v1/",
            None,
            "m",
            4,
        )
        .unwrap();
        let without = OpenAiEmbeddingProvider::new(
            reqwest::Client::new(),
            "http://localhost:9999/v1",
            None,
            "m",
            4,
        )
        .unwrap();
        assert_eq!(with.endpoint, without.endpoint);
        assert_eq!(with.endpoint.path(), "/v1/embeddings");
    }

    #[test]
    fn mock_provider_is_deterministic_and_normalized() {
        let provider = MockEmbeddingProvider::new(16);
        let a = provider.embed_text("same text");
        let b = provider.embed_text("same text");
        let c = provider.embed_text("different text");
        assert_eq!(a, b);
        assert_ne!(a, c);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
